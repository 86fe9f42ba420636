//! NCA header model and byte-exact serialization.
//!
//! The header is a fixed 0xC00-byte span. Serialization writes every field
//! at its explicit offset rather than relying on struct layout, and the
//! same description is exercised by the round-trip checks in the tests.

use std::io::{self, Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ivfc::{self, LevelHeader};

/// Alignment granularity for section offsets.
pub const MEDIA_UNIT: u64 = 0x200;

/// Size of the fixed header span.
pub const HEADER_SIZE: usize = 0xC00;

/// First section starts right behind the header: 0xC00 / 0x200.
pub const FIRST_SECTION_MEDIA_UNIT: u32 = 0x6;

/// Span covered by the ACID header signature: magic through the key area.
pub const SIGNED_SPAN: std::ops::Range<usize> = 0x200..0x400;

pub const NCA3_MAGIC: [u8; 4] = *b"NCA3";
pub const IVFC_MAGIC: [u8; 4] = *b"IVFC";

/// Container content type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ContentType {
    Program = 0x0,
    Meta = 0x1,
    Control = 0x2,
    Manual = 0x3,
}

/// Section filesystem type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FsType {
    RomFs = 0x0,
    PartitionFs = 0x1,
}

/// Section hash structure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum HashType {
    HierarchicalSha256 = 0x2,
    HierarchicalIntegrity = 0x3,
}

/// Section cipher kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CryptType {
    None = 0x1,
    Ctr = 0x3,
}

/// Per-section entry in the header: media-unit extent plus a flag byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionEntry {
    pub media_start_offset: u32,
    pub media_end_offset: u32,
}

impl SectionEntry {
    pub fn is_populated(&self) -> bool {
        self.media_end_offset != 0
    }
}

/// Superblock variants carried inside a section's crypto header.
#[derive(Debug, Clone)]
pub enum Superblock {
    /// Partition archive: master hash plus hash-table bookkeeping.
    Pfs0 {
        master_hash: [u8; 0x20],
        block_size: u32,
        hash_table_size: u64,
        pfs0_offset: u64,
        pfs0_size: u64,
    },
    /// RomFS image: the IVFC header.
    RomFs {
        levels: [LevelHeader; ivfc::LEVEL_HEADER_COUNT],
        master_hash: [u8; 0x20],
    },
}

impl Superblock {
    fn write_into<W: Write + Seek>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Self::Pfs0 {
                master_hash,
                block_size,
                hash_table_size,
                pfs0_offset,
                pfs0_size,
            } => {
                writer.write_all(master_hash)?;
                writer.write_u32::<LittleEndian>(*block_size)?;
                writer.write_u32::<LittleEndian>(0x2)?; // always 2
                writer.write_u64::<LittleEndian>(0)?; // hash table offset
                writer.write_u64::<LittleEndian>(*hash_table_size)?;
                writer.write_u64::<LittleEndian>(*pfs0_offset)?;
                writer.write_u64::<LittleEndian>(*pfs0_size)?;
            }
            Self::RomFs {
                levels,
                master_hash,
            } => {
                writer.write_all(&IVFC_MAGIC)?;
                writer.write_u32::<LittleEndian>(0x2_0000)?; // id
                writer.write_u32::<LittleEndian>(0x20)?; // master hash size
                writer.write_u32::<LittleEndian>(ivfc::LEVEL_COUNT)?;
                for level in levels {
                    writer.write_u64::<LittleEndian>(level.logical_offset)?;
                    writer.write_u64::<LittleEndian>(level.hash_data_size)?;
                    writer.write_u32::<LittleEndian>(level.block_size_log2)?;
                    writer.write_u32::<LittleEndian>(0)?;
                }
                // 0x20 reserved bytes, then the master hash.
                writer.seek(SeekFrom::Current(0x20))?;
                writer.write_all(master_hash)?;
            }
        }
        Ok(())
    }
}

/// One section's 0x200-byte cryptographic header.
#[derive(Debug, Clone)]
pub struct FsHeader {
    pub fs_type: FsType,
    pub hash_type: HashType,
    pub crypt_type: CryptType,
    pub superblock: Superblock,
    /// High half of the section counter, stored as-is.
    pub counter_seed: [u8; 0x8],
}

impl FsHeader {
    /// Serialize into the fixed 0x200-byte span.
    pub fn to_bytes(&self) -> io::Result<[u8; 0x200]> {
        let mut bytes = [0u8; 0x200];
        let mut cursor = Cursor::new(&mut bytes[..]);
        cursor.write_u16::<LittleEndian>(0x2)?; // version, always 2
        cursor.write_u8(self.fs_type.into())?;
        cursor.write_u8(self.hash_type.into())?;
        cursor.write_u8(self.crypt_type.into())?;
        cursor.seek(SeekFrom::Start(0x8))?;
        self.superblock.write_into(&mut cursor)?;
        cursor.seek(SeekFrom::Start(0x140))?;
        cursor.write_all(&self.counter_seed)?;
        Ok(bytes)
    }
}

/// The in-progress container header, owned by the assembler for the
/// duration of one build.
#[derive(Debug, Clone)]
pub struct NcaHeader {
    pub fixed_key_signature: [u8; 0x100],
    pub acid_signature: [u8; 0x100],
    pub content_type: Option<ContentType>,
    pub crypto_type: u8,
    pub crypto_type2: u8,
    pub nca_size: u64,
    pub title_id: u64,
    pub sdk_version: u32,
    pub section_entries: [SectionEntry; 4],
    pub section_hashes: [[u8; 0x20]; 4],
    pub key_area: [u8; 0x40],
    pub fs_headers: [Option<FsHeader>; 4],
}

impl Default for NcaHeader {
    fn default() -> Self {
        Self {
            fixed_key_signature: [0u8; 0x100],
            acid_signature: [0u8; 0x100],
            content_type: None,
            crypto_type: 0,
            crypto_type2: 0,
            nca_size: 0,
            title_id: 0,
            sdk_version: 0,
            section_entries: [SectionEntry::default(); 4],
            section_hashes: [[0u8; 0x20]; 4],
            key_area: [0u8; 0x40],
            fs_headers: [None, None, None, None],
        }
    }
}

impl NcaHeader {
    /// Tag the key generation the key area was sealed with.
    pub fn set_keygeneration(&mut self, keygeneration: u8) {
        if keygeneration >= 2 {
            self.crypto_type = 0x2;
        }
        if keygeneration >= 3 {
            self.crypto_type2 = keygeneration;
        }
    }

    /// Serialize the full 0xC00-byte header span.
    pub fn to_bytes(&self) -> io::Result<[u8; HEADER_SIZE]> {
        let mut bytes = [0u8; HEADER_SIZE];
        {
            let mut cursor = Cursor::new(&mut bytes[..]);
            cursor.write_all(&self.fixed_key_signature)?;
            cursor.write_all(&self.acid_signature)?;
            cursor.write_all(&NCA3_MAGIC)?;
            cursor.write_u8(0)?; // distribution: downloadable
            cursor.write_u8(self.content_type.map_or(0, u8::from))?;
            cursor.write_u8(self.crypto_type)?;
            cursor.write_u8(0)?; // key-area key index: application
            cursor.write_u64::<LittleEndian>(self.nca_size)?;
            cursor.write_u64::<LittleEndian>(self.title_id)?;
            cursor.seek(SeekFrom::Start(0x21C))?;
            cursor.write_u32::<LittleEndian>(self.sdk_version)?;
            cursor.write_u8(self.crypto_type2)?;
            // rights id at 0x230 stays zero: standard-crypto containers.

            cursor.seek(SeekFrom::Start(0x240))?;
            for entry in &self.section_entries {
                cursor.write_u32::<LittleEndian>(entry.media_start_offset)?;
                cursor.write_u32::<LittleEndian>(entry.media_end_offset)?;
                cursor.write_u8(u8::from(entry.is_populated()))?;
                cursor.write_all(&[0u8; 7])?;
            }

            for hash in &self.section_hashes {
                cursor.write_all(hash)?;
            }
            cursor.write_all(&self.key_area)?;
        }

        for (index, fs_header) in self.fs_headers.iter().enumerate() {
            if let Some(fs_header) = fs_header {
                let span = 0x400 + index * 0x200;
                bytes[span..span + 0x200].copy_from_slice(&fs_header.to_bytes()?);
            }
        }
        Ok(bytes)
    }
}
