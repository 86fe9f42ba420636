//! RomFS on-disk layout constants and table arithmetic.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

/// Sentinel offset meaning "no entry".
pub const ENTRY_NONE: u32 = 0xFFFF_FFFF;

/// Fixed header size: ten little-endian u64 fields.
pub const HEADER_SIZE: u64 = 0x50;

/// Offset of the file-data region from the start of the image.
pub const FILE_PARTITION_OFFSET: u64 = 0x200;

/// Fixed portion of a directory table entry, before the name bytes.
pub const DIR_ENTRY_BASE_SIZE: u32 = 0x18;

/// Fixed portion of a file table entry, before the name bytes.
pub const FILE_ENTRY_BASE_SIZE: u32 = 0x20;

/// Alignment of individual file data blobs inside the data region.
pub const FILE_DATA_ALIGN: u64 = 0x10;

/// The finished image is padded to this boundary so the integrity tree can
/// hash it in whole blocks.
pub const IMAGE_ALIGN: u64 = 0x4000;

/// Seed mixed into every path hash.
const PATH_HASH_SEED: u32 = 123_456_789;

pub const fn align32(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

pub const fn align64(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Hash of an entry name under its parent's table offset.
///
/// The root directory hashes with parent offset 0 and an empty name.
pub fn path_hash(parent_offset: u32, name: &[u8]) -> u32 {
    let mut hash = parent_offset ^ PATH_HASH_SEED;
    for &byte in name {
        hash = hash.rotate_right(5);
        hash ^= u32::from(byte);
    }
    hash
}

/// Bucket count for a lookup table over `num_entries` entries.
///
/// Small tables get a fixed or next-odd count; larger ones grow until the
/// count has no small prime factors, which keeps the modulo distribution
/// cheap and even.
pub fn hash_table_entry_count(num_entries: u32) -> u32 {
    if num_entries < 3 {
        return 3;
    }
    if num_entries < 19 {
        return num_entries | 1;
    }
    let mut count = num_entries;
    while [2, 3, 5, 7, 11, 13, 17].iter().any(|&p| count % p == 0) {
        count += 1;
    }
    count
}

/// The 0x50-byte image header, written once all region sizes are known.
#[derive(Debug, Clone, Copy)]
pub struct RomFsHeader {
    pub dir_hash_table_offset: u64,
    pub dir_hash_table_size: u64,
    pub dir_table_offset: u64,
    pub dir_table_size: u64,
    pub file_hash_table_offset: u64,
    pub file_hash_table_size: u64,
    pub file_table_offset: u64,
    pub file_table_size: u64,
}

impl RomFsHeader {
    pub fn write_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(HEADER_SIZE)?;
        writer.write_u64::<LittleEndian>(self.dir_hash_table_offset)?;
        writer.write_u64::<LittleEndian>(self.dir_hash_table_size)?;
        writer.write_u64::<LittleEndian>(self.dir_table_offset)?;
        writer.write_u64::<LittleEndian>(self.dir_table_size)?;
        writer.write_u64::<LittleEndian>(self.file_hash_table_offset)?;
        writer.write_u64::<LittleEndian>(self.file_hash_table_size)?;
        writer.write_u64::<LittleEndian>(self.file_table_offset)?;
        writer.write_u64::<LittleEndian>(self.file_table_size)?;
        writer.write_u64::<LittleEndian>(FILE_PARTITION_OFFSET)?;
        Ok(())
    }
}
