//! PFS0 layout constants and the block hash table.

use sha2::{Digest, Sha256};

pub const PFS0_MAGIC: [u8; 4] = *b"PFS0";

/// Header: magic, file count, name-table size, reserved.
pub const HEADER_SIZE: u64 = 0x10;

/// File descriptor: data offset, data size, name offset, reserved.
pub const ENTRY_SIZE: u64 = 0x18;

/// Hash block size used for executable-filesystem sections.
pub const EXEFS_HASH_BLOCK_SIZE: u32 = 0x10000;

/// Hash block size used for icon/logo sections.
pub const LOGO_HASH_BLOCK_SIZE: u32 = 0x1000;

/// Hash block size used for metadata sections.
pub const META_HASH_BLOCK_SIZE: u32 = 0x1000;

/// Per-block SHA-256 table over a built archive.
///
/// The emitted bytes are padded so the archive itself lands block-aligned
/// when written straight after the table; the superblock records the
/// unpadded size and the aligned content offset.
pub struct HashTable {
    /// Table bytes, zero-padded up to `content_offset`.
    pub bytes: Vec<u8>,
    /// Size of the digests alone, before padding.
    pub table_size: u64,
    /// Block-aligned offset at which the hashed archive begins.
    pub content_offset: u64,
}

impl HashTable {
    /// Digest of the unpadded table, stored as the section master hash.
    pub fn master_hash(&self) -> [u8; 0x20] {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes[..self.table_size as usize]);
        hasher.finalize().into()
    }
}
