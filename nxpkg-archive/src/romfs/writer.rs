//! RomFS image writer.
//!
//! The source tree is walked depth-first into an arena of directory and
//! file nodes; parent/sibling/child relations are arena indices. Sibling
//! lists sort lexicographically, and both tables are laid out in global
//! path order, so identical trees always serialize to identical images.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::ArchiveError;

use super::structs::{
    align32, align64, hash_table_entry_count, path_hash, RomFsHeader, DIR_ENTRY_BASE_SIZE,
    ENTRY_NONE, FILE_DATA_ALIGN, FILE_ENTRY_BASE_SIZE, FILE_PARTITION_OFFSET, IMAGE_ALIGN,
};

/// Chunk size for streaming file contents into the image.
const COPY_CHUNK: usize = 0x40_0000;

struct DirNode {
    source: PathBuf,
    rel_path: String,
    name: String,
    parent: usize,
    sibling: Option<usize>,
    child_dir: Option<usize>,
    child_file: Option<usize>,
    entry_offset: u32,
}

struct FileNode {
    source: PathBuf,
    rel_path: String,
    name: String,
    parent: usize,
    sibling: Option<usize>,
    size: u64,
    data_offset: u64,
    entry_offset: u32,
}

/// Serializes a directory tree into a RomFS image.
pub struct RomFsWriter {
    source: PathBuf,
}

impl RomFsWriter {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source_dir.into(),
        }
    }

    /// Build the image into `writer`.
    ///
    /// Returns the image size before tail padding; the output itself is
    /// padded to [`IMAGE_ALIGN`] so the integrity tree hashes whole blocks.
    pub fn write_into<W: Write + Seek>(&self, writer: &mut W) -> Result<u64, ArchiveError> {
        let mut tree = Tree::scan(&self.source)?;
        tree.assign_offsets();
        tree.write_image(writer)
    }

    /// Convenience variant returning the image bytes and unpadded size.
    pub fn write_to_vec(&self) -> Result<(Vec<u8>, u64), ArchiveError> {
        let mut cursor = Cursor::new(Vec::new());
        let size = self.write_into(&mut cursor)?;
        Ok((cursor.into_inner(), size))
    }
}

struct Tree {
    dirs: Vec<DirNode>,
    files: Vec<FileNode>,
    /// Directory indices in global path order; drives table layout.
    dir_order: Vec<usize>,
    /// File indices in global path order; drives table and data layout.
    file_order: Vec<usize>,
    dir_table_size: u32,
    file_table_size: u32,
    file_partition_size: u64,
}

impl Tree {
    fn scan(source: &Path) -> Result<Self, ArchiveError> {
        if !source.is_dir() {
            return Err(ArchiveError::InputNotFound(source.to_path_buf()));
        }

        let mut tree = Self {
            dirs: vec![DirNode {
                source: source.to_path_buf(),
                rel_path: String::new(),
                name: String::new(),
                parent: 0,
                sibling: None,
                child_dir: None,
                child_file: None,
                entry_offset: 0,
            }],
            files: Vec::new(),
            dir_order: Vec::new(),
            file_order: Vec::new(),
            dir_table_size: DIR_ENTRY_BASE_SIZE,
            file_table_size: 0,
            file_partition_size: 0,
        };
        tree.visit(0)?;

        let mut dir_order: Vec<usize> = (0..tree.dirs.len()).collect();
        dir_order.sort_by(|&a, &b| tree.dirs[a].rel_path.cmp(&tree.dirs[b].rel_path));
        tree.dir_order = dir_order;

        let mut file_order: Vec<usize> = (0..tree.files.len()).collect();
        file_order.sort_by(|&a, &b| tree.files[a].rel_path.cmp(&tree.files[b].rel_path));
        tree.file_order = file_order;

        Ok(tree)
    }

    fn visit(&mut self, dir_index: usize) -> Result<(), ArchiveError> {
        let parent_source = self.dirs[dir_index].source.clone();
        let parent_rel = self.dirs[dir_index].rel_path.clone();

        let mut dir_names = Vec::new();
        let mut file_names = Vec::new();
        for entry in std::fs::read_dir(&parent_source)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| ArchiveError::InvalidEntryName(path.clone()))?;
            let metadata = std::fs::metadata(&path)?;
            if metadata.is_dir() {
                dir_names.push(name);
            } else if metadata.is_file() {
                file_names.push((name, metadata.len()));
            } else {
                return Err(ArchiveError::InvalidEntryType(path));
            }
        }
        dir_names.sort();
        file_names.sort_by(|a, b| a.0.cmp(&b.0));

        let rel = |name: &str| {
            if parent_rel.is_empty() {
                name.to_string()
            } else {
                format!("{parent_rel}/{name}")
            }
        };

        let mut child_dirs = Vec::with_capacity(dir_names.len());
        let mut prev: Option<usize> = None;
        for name in dir_names {
            let index = self.dirs.len();
            self.dir_table_size += DIR_ENTRY_BASE_SIZE + align32(name.len() as u32, 4);
            self.dirs.push(DirNode {
                source: parent_source.join(&name),
                rel_path: rel(&name),
                name,
                parent: dir_index,
                sibling: None,
                child_dir: None,
                child_file: None,
                entry_offset: 0,
            });
            match prev {
                None => self.dirs[dir_index].child_dir = Some(index),
                Some(p) => self.dirs[p].sibling = Some(index),
            }
            prev = Some(index);
            child_dirs.push(index);
        }

        let mut prev: Option<usize> = None;
        for (name, size) in file_names {
            let index = self.files.len();
            self.file_table_size += FILE_ENTRY_BASE_SIZE + align32(name.len() as u32, 4);
            self.files.push(FileNode {
                source: parent_source.join(&name),
                rel_path: rel(&name),
                name,
                parent: dir_index,
                sibling: None,
                size,
                data_offset: 0,
                entry_offset: 0,
            });
            match prev {
                None => self.dirs[dir_index].child_file = Some(index),
                Some(p) => self.files[p].sibling = Some(index),
            }
            prev = Some(index);
        }

        for child in child_dirs {
            self.visit(child)?;
        }
        Ok(())
    }

    /// Two fixed passes once the walk is complete: data offsets, then table
    /// entry offsets, both in global path order.
    fn assign_offsets(&mut self) {
        let mut partition_size = 0u64;
        for &index in &self.file_order {
            partition_size = align64(partition_size, FILE_DATA_ALIGN);
            let file = &mut self.files[index];
            file.data_offset = partition_size;
            partition_size += file.size;
        }
        self.file_partition_size = partition_size;

        let mut entry_offset = 0u32;
        for &index in &self.file_order {
            let file = &mut self.files[index];
            file.entry_offset = entry_offset;
            entry_offset += FILE_ENTRY_BASE_SIZE + align32(file.name.len() as u32, 4);
        }

        let mut entry_offset = 0u32;
        for &index in &self.dir_order {
            let dir = &mut self.dirs[index];
            dir.entry_offset = entry_offset;
            entry_offset += DIR_ENTRY_BASE_SIZE + align32(dir.name.len() as u32, 4);
        }
    }

    fn write_image<W: Write + Seek>(&self, writer: &mut W) -> Result<u64, ArchiveError> {
        let dir_bucket_count = hash_table_entry_count(self.dirs.len() as u32);
        let file_bucket_count = hash_table_entry_count(self.files.len() as u32);
        let mut dir_buckets = vec![ENTRY_NONE; dir_bucket_count as usize];
        let mut file_buckets = vec![ENTRY_NONE; file_bucket_count as usize];

        // Populate tables; bucket heads chain backward through entry hash
        // fields, most recent insertion first.
        let mut dir_table = Vec::with_capacity(self.dir_table_size as usize);
        for &index in &self.dir_order {
            let dir = &self.dirs[index];
            let hash_parent = if index == 0 {
                0
            } else {
                self.dirs[dir.parent].entry_offset
            };
            let hash = path_hash(hash_parent, dir.name.as_bytes());
            let bucket = (hash % dir_bucket_count) as usize;

            dir_table.write_u32::<LittleEndian>(self.dirs[dir.parent].entry_offset)?;
            dir_table.write_u32::<LittleEndian>(offset_or_none(dir.sibling, &self.dirs))?;
            dir_table.write_u32::<LittleEndian>(offset_or_none(dir.child_dir, &self.dirs))?;
            dir_table.write_u32::<LittleEndian>(file_offset_or_none(dir.child_file, &self.files))?;
            dir_table.write_u32::<LittleEndian>(dir_buckets[bucket])?;
            dir_table.write_u32::<LittleEndian>(dir.name.len() as u32)?;
            write_padded_name(&mut dir_table, &dir.name)?;

            dir_buckets[bucket] = dir.entry_offset;
        }

        let mut file_table = Vec::with_capacity(self.file_table_size as usize);
        for &index in &self.file_order {
            let file = &self.files[index];
            let parent_offset = self.dirs[file.parent].entry_offset;
            let hash = path_hash(parent_offset, file.name.as_bytes());
            let bucket = (hash % file_bucket_count) as usize;

            file_table.write_u32::<LittleEndian>(parent_offset)?;
            file_table.write_u32::<LittleEndian>(file_offset_or_none(file.sibling, &self.files))?;
            file_table.write_u64::<LittleEndian>(file.data_offset)?;
            file_table.write_u64::<LittleEndian>(file.size)?;
            file_table.write_u32::<LittleEndian>(file_buckets[bucket])?;
            file_table.write_u32::<LittleEndian>(file.name.len() as u32)?;
            write_padded_name(&mut file_table, &file.name)?;

            file_buckets[bucket] = file.entry_offset;
        }

        let dir_hash_table_size = u64::from(dir_bucket_count) * 4;
        let file_hash_table_size = u64::from(file_bucket_count) * 4;
        let dir_hash_table_offset =
            align64(self.file_partition_size + FILE_PARTITION_OFFSET, 4);
        let header = RomFsHeader {
            dir_hash_table_offset,
            dir_hash_table_size,
            dir_table_offset: dir_hash_table_offset + dir_hash_table_size,
            dir_table_size: u64::from(self.dir_table_size),
            file_hash_table_offset: dir_hash_table_offset
                + dir_hash_table_size
                + u64::from(self.dir_table_size),
            file_hash_table_size,
            file_table_offset: dir_hash_table_offset
                + dir_hash_table_size
                + u64::from(self.dir_table_size)
                + file_hash_table_size,
            file_table_size: u64::from(self.file_table_size),
        };

        writer.seek(SeekFrom::Start(0))?;
        header.write_into(writer)?;

        // File data, streamed; alignment gaps stay zero.
        for &index in &self.file_order {
            let file = &self.files[index];
            writer.seek(SeekFrom::Start(FILE_PARTITION_OFFSET + file.data_offset))?;
            copy_exact(&file.source, file.size, writer)?;
        }

        writer.seek(SeekFrom::Start(dir_hash_table_offset))?;
        for head in &dir_buckets {
            writer.write_u32::<LittleEndian>(*head)?;
        }
        writer.write_all(&dir_table)?;
        for head in &file_buckets {
            writer.write_u32::<LittleEndian>(*head)?;
        }
        writer.write_all(&file_table)?;

        let image_size = writer.stream_position()?;
        let padded_size = align64(image_size, IMAGE_ALIGN);
        if padded_size > image_size {
            writer.write_all(&vec![0u8; (padded_size - image_size) as usize])?;
        }

        Ok(image_size)
    }
}

fn offset_or_none(index: Option<usize>, dirs: &[DirNode]) -> u32 {
    index.map_or(ENTRY_NONE, |i| dirs[i].entry_offset)
}

fn file_offset_or_none(index: Option<usize>, files: &[FileNode]) -> u32 {
    index.map_or(ENTRY_NONE, |i| files[i].entry_offset)
}

fn write_padded_name(table: &mut Vec<u8>, name: &str) -> io::Result<()> {
    table.write_all(name.as_bytes())?;
    let padding = (align32(name.len() as u32, 4) - name.len() as u32) as usize;
    table.write_all(&[0u8; 3][..padding])?;
    Ok(())
}

/// Stream exactly `size` bytes from `source` into the writer.
fn copy_exact<W: Write>(source: &Path, size: u64, writer: &mut W) -> Result<(), ArchiveError> {
    let mut input = File::open(source)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(COPY_CHUNK.min(size as usize))
        .map_err(|_| ArchiveError::AllocationFailed)?;
    buf.resize(COPY_CHUNK.min(size as usize), 0);

    let mut remaining = size;
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        input.read_exact(&mut buf[..want])?;
        writer.write_all(&buf[..want])?;
        remaining -= want as u64;
    }
    Ok(())
}
