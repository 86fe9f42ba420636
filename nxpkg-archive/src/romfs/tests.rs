use std::collections::HashMap;
use std::fs;

use byteorder::{ByteOrder, LittleEndian};

use super::structs::{
    hash_table_entry_count, path_hash, ENTRY_NONE, FILE_PARTITION_OFFSET, IMAGE_ALIGN,
};
use super::writer::RomFsWriter;

/// Minimal read-side view of a built image, for round-trip checks only.
struct ParsedImage<'a> {
    bytes: &'a [u8],
    dir_hash_ofs: u64,
    dir_hash_size: u64,
    dir_table_ofs: u64,
    dir_table_size: u64,
    file_hash_ofs: u64,
    file_table_ofs: u64,
    file_table_size: u64,
}

struct ParsedFile {
    path: String,
    data: Vec<u8>,
    entry_offset: u32,
    parent_offset: u32,
    name: String,
}

impl<'a> ParsedImage<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        let u64_at = |ofs: usize| LittleEndian::read_u64(&bytes[ofs..ofs + 8]);
        assert_eq!(u64_at(0x00), 0x50, "header size");
        assert_eq!(u64_at(0x48), FILE_PARTITION_OFFSET, "data region offset");
        Self {
            bytes,
            dir_hash_ofs: u64_at(0x08),
            dir_hash_size: u64_at(0x10),
            dir_table_ofs: u64_at(0x18),
            dir_table_size: u64_at(0x20),
            file_hash_ofs: u64_at(0x28),
            file_table_ofs: u64_at(0x38),
            file_table_size: u64_at(0x40),
        }
    }

    /// Directory table decoded as entry offset -> (parent offset, name).
    fn dirs(&self) -> HashMap<u32, (u32, String)> {
        let table = &self.bytes
            [self.dir_table_ofs as usize..(self.dir_table_ofs + self.dir_table_size) as usize];
        let mut dirs = HashMap::new();
        let mut ofs = 0usize;
        while ofs < table.len() {
            let parent = LittleEndian::read_u32(&table[ofs..]);
            let name_len = LittleEndian::read_u32(&table[ofs + 0x14..]) as usize;
            let name = String::from_utf8(table[ofs + 0x18..ofs + 0x18 + name_len].to_vec())
                .expect("utf-8 name");
            dirs.insert(ofs as u32, (parent, name));
            ofs += 0x18 + (name_len + 3) / 4 * 4;
        }
        dirs
    }

    fn files(&self) -> Vec<ParsedFile> {
        let dirs = self.dirs();
        let table = &self.bytes
            [self.file_table_ofs as usize..(self.file_table_ofs + self.file_table_size) as usize];
        let mut files = Vec::new();
        let mut ofs = 0usize;
        while ofs < table.len() {
            let parent = LittleEndian::read_u32(&table[ofs..]);
            let data_ofs = LittleEndian::read_u64(&table[ofs + 0x08..]);
            let size = LittleEndian::read_u64(&table[ofs + 0x10..]);
            let name_len = LittleEndian::read_u32(&table[ofs + 0x1C..]) as usize;
            let name = String::from_utf8(table[ofs + 0x20..ofs + 0x20 + name_len].to_vec())
                .expect("utf-8 name");

            let mut path = name.clone();
            let mut dir = parent;
            loop {
                let (up, dir_name) = &dirs[&dir];
                if dir_name.is_empty() {
                    break;
                }
                path = format!("{dir_name}/{path}");
                dir = *up;
            }

            let start = (FILE_PARTITION_OFFSET + data_ofs) as usize;
            files.push(ParsedFile {
                path,
                data: self.bytes[start..start + size as usize].to_vec(),
                entry_offset: ofs as u32,
                parent_offset: parent,
                name,
            });
            ofs += 0x20 + (name_len + 3) / 4 * 4;
        }
        files
    }

    /// Resolve a file entry through the hashed lookup table.
    fn lookup_file(&self, parent_offset: u32, name: &str) -> Option<u32> {
        let bucket_count = (self.file_hash_table_size() / 4) as u32;
        let hash = path_hash(parent_offset, name.as_bytes());
        let bucket_ofs = self.file_hash_ofs as usize + (hash % bucket_count) as usize * 4;
        let mut entry = LittleEndian::read_u32(&self.bytes[bucket_ofs..]);
        while entry != ENTRY_NONE {
            let ofs = self.file_table_ofs as usize + entry as usize;
            let parent = LittleEndian::read_u32(&self.bytes[ofs..]);
            let name_len = LittleEndian::read_u32(&self.bytes[ofs + 0x1C..]) as usize;
            let entry_name = &self.bytes[ofs + 0x20..ofs + 0x20 + name_len];
            if parent == parent_offset && entry_name == name.as_bytes() {
                return Some(entry);
            }
            entry = LittleEndian::read_u32(&self.bytes[ofs + 0x18..]);
        }
        None
    }

    fn file_hash_table_size(&self) -> u64 {
        self.file_table_ofs - self.file_hash_ofs
    }
}

fn build_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("data/textures")).unwrap();
    fs::create_dir_all(dir.path().join("audio")).unwrap();
    fs::write(dir.path().join("version.txt"), b"1.0.0").unwrap();
    fs::write(dir.path().join("data/table.bin"), vec![0x42u8; 0x2345]).unwrap();
    fs::write(dir.path().join("data/textures/icon.png"), b"fake png").unwrap();
    fs::write(dir.path().join("audio/bgm.bin"), vec![0x11u8; 0x31]).unwrap();
    dir
}

#[test]
fn roundtrip_paths_sizes_and_bytes() {
    let fixture = build_fixture();
    let (image, size) = RomFsWriter::new(fixture.path()).write_to_vec().unwrap();
    assert_eq!(image.len() as u64 % IMAGE_ALIGN, 0);
    assert!(size <= image.len() as u64);

    let parsed = ParsedImage::new(&image);
    let mut files: Vec<(String, Vec<u8>)> = parsed
        .files()
        .into_iter()
        .map(|f| (f.path, f.data))
        .collect();
    files.sort();

    assert_eq!(
        files,
        vec![
            ("audio/bgm.bin".to_string(), vec![0x11u8; 0x31]),
            ("data/table.bin".to_string(), vec![0x42u8; 0x2345]),
            (
                "data/textures/icon.png".to_string(),
                b"fake png".to_vec()
            ),
            ("version.txt".to_string(), b"1.0.0".to_vec()),
        ]
    );
}

#[test]
fn hashed_lookup_finds_every_file() {
    let fixture = build_fixture();
    let (image, _) = RomFsWriter::new(fixture.path()).write_to_vec().unwrap();
    let parsed = ParsedImage::new(&image);

    for file in parsed.files() {
        assert_eq!(
            parsed.lookup_file(file.parent_offset, &file.name),
            Some(file.entry_offset),
            "lookup failed for {}",
            file.path
        );
    }
}

#[test]
fn empty_directory_builds_root_only_image() {
    let fixture = tempfile::tempdir().unwrap();
    let (image, size) = RomFsWriter::new(fixture.path()).write_to_vec().unwrap();

    let parsed = ParsedImage::new(&image);
    assert_eq!(parsed.dir_hash_ofs, FILE_PARTITION_OFFSET);
    assert_eq!(parsed.dir_hash_size, 12);
    assert_eq!(parsed.dir_table_size, 0x18);
    assert_eq!(parsed.file_table_size, 0);
    // Three empty buckets for each table plus the root entry.
    assert_eq!(size, FILE_PARTITION_OFFSET + 12 + 0x18 + 12);
    assert_eq!(image.len() as u64, IMAGE_ALIGN);

    let (_, root_name) = parsed.dirs()[&0].clone();
    assert!(root_name.is_empty());
}

#[test]
fn missing_source_directory_is_an_error() {
    let fixture = tempfile::tempdir().unwrap();
    let missing = fixture.path().join("nope");
    assert!(matches!(
        RomFsWriter::new(&missing).write_to_vec(),
        Err(crate::ArchiveError::InputNotFound(_))
    ));
}

#[test]
fn builds_are_deterministic() {
    let fixture = build_fixture();
    let (a, _) = RomFsWriter::new(fixture.path()).write_to_vec().unwrap();
    let (b, _) = RomFsWriter::new(fixture.path()).write_to_vec().unwrap();
    assert_eq!(a, b);
}

#[test]
fn bucket_count_is_odd_for_small_tables() {
    for n in 3..19u32 {
        assert_eq!(hash_table_entry_count(n) % 2, 1, "n = {n}");
        assert!(hash_table_entry_count(n) >= n);
    }
    assert_eq!(hash_table_entry_count(0), 3);
    assert_eq!(hash_table_entry_count(2), 3);
}

#[test]
fn bucket_count_keeps_coprime_values() {
    // 19 and 23 share no factors with {2,3,5,7,11,13,17}.
    assert_eq!(hash_table_entry_count(19), 19);
    assert_eq!(hash_table_entry_count(23), 23);
    // 20 = 2*2*5 walks forward to 23.
    assert_eq!(hash_table_entry_count(20), 23);
}

#[test]
fn path_hash_matches_reference_shape() {
    // Seed alone for the root: parent 0, empty name.
    assert_eq!(path_hash(0, b""), 123_456_789);
    // One byte folds in after a rotate.
    let expected = 123_456_789u32.rotate_right(5) ^ u32::from(b'a');
    assert_eq!(path_hash(0, b"a"), expected);
}
