//! PFS0 partition archive writer.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, WriteBytesExt};
use sha2::{Digest, Sha256};

use crate::error::ArchiveError;

use super::structs::{HashTable, ENTRY_SIZE, HEADER_SIZE, PFS0_MAGIC};

/// Chunk size for streaming file contents into the archive.
const COPY_CHUNK: usize = 0x40_0000;

/// Serializes the immediate files of a directory into a flat named-blob
/// archive. Subdirectories are rejected; entries sort by name so the same
/// inputs always produce the same archive.
pub struct Pfs0Writer {
    source: PathBuf,
}

impl Pfs0Writer {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source_dir.into(),
        }
    }

    /// Build the archive into `writer`, returning its total size.
    pub fn write_into<W: Write>(&self, writer: &mut W) -> Result<u64, ArchiveError> {
        if !self.source.is_dir() {
            return Err(ArchiveError::InputNotFound(self.source.clone()));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.source)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| ArchiveError::InvalidEntryName(path.clone()))?;
            let metadata = std::fs::metadata(&path)?;
            if !metadata.is_file() {
                return Err(ArchiveError::InvalidEntryType(path));
            }
            entries.push((name, path, metadata.len()));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let name_table_size: u64 = entries.iter().map(|(n, _, _)| n.len() as u64 + 1).sum();

        writer.write_all(&PFS0_MAGIC)?;
        writer.write_u32::<LittleEndian>(entries.len() as u32)?;
        writer.write_u32::<LittleEndian>(name_table_size as u32)?;
        writer.write_u32::<LittleEndian>(0)?;

        let mut name_offset = 0u32;
        let mut data_offset = 0u64;
        for (name, _, size) in &entries {
            writer.write_u64::<LittleEndian>(data_offset)?;
            writer.write_u64::<LittleEndian>(*size)?;
            writer.write_u32::<LittleEndian>(name_offset)?;
            writer.write_u32::<LittleEndian>(0)?;
            name_offset += name.len() as u32 + 1;
            data_offset += size;
        }

        for (name, _, _) in &entries {
            writer.write_all(name.as_bytes())?;
            writer.write_all(&[0])?;
        }

        for (_, path, size) in &entries {
            let mut input = File::open(path)?;
            copy_exact(&mut input, *size, writer)?;
        }

        Ok(HEADER_SIZE + ENTRY_SIZE * entries.len() as u64 + name_table_size + data_offset)
    }

    /// Convenience variant returning the archive bytes and size.
    pub fn write_to_vec(&self) -> Result<(Vec<u8>, u64), ArchiveError> {
        let mut cursor = Cursor::new(Vec::new());
        let size = self.write_into(&mut cursor)?;
        Ok((cursor.into_inner(), size))
    }
}

/// Hash a built archive in `block_size` chunks.
///
/// The last block may be short and is hashed as-is. The returned table is
/// padded to the block size so the archive can be written directly behind
/// it inside a container section.
pub fn create_hash_table<R: Read>(
    archive: &mut R,
    block_size: u32,
) -> Result<HashTable, ArchiveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(block_size as usize)
        .map_err(|_| ArchiveError::AllocationFailed)?;
    buf.resize(block_size as usize, 0);

    let mut bytes = Vec::new();
    loop {
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = archive.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        let mut hasher = Sha256::new();
        hasher.update(&buf[..filled]);
        bytes.extend_from_slice(&hasher.finalize());
        if filled < buf.len() {
            break;
        }
    }

    let table_size = bytes.len() as u64;
    let content_offset = table_size.div_ceil(u64::from(block_size)) * u64::from(block_size);
    bytes.resize(content_offset as usize, 0);

    Ok(HashTable {
        bytes,
        table_size,
        content_offset,
    })
}

fn copy_exact<R: Read, W: Write>(
    input: &mut R,
    size: u64,
    writer: &mut W,
) -> Result<(), ArchiveError> {
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
