//! IVFC integrity hash tree.
//!
//! Read-only filesystem sections carry a seven-level integrity structure:
//! the content itself is the last level, and each level above it holds one
//! SHA-256 digest per 16 KiB block of the level below. The top level is
//! digested once more into the master hash stored in the section
//! superblock. Levels are laid out contiguously in construction order, so
//! each level's logical offset is the running sum of the sizes before it.

use std::io::{Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};

use crate::error::ContainerError;

/// Hash block size for every level.
pub const HASH_BLOCK_SIZE: u64 = 0x4000;

/// log2 of [`HASH_BLOCK_SIZE`], as stored in level headers.
pub const BLOCK_SIZE_LOG2: u32 = 0x0E;

/// Total level count: five derived hash levels, the content level, and the
/// master hash above them all.
pub const LEVEL_COUNT: u32 = 7;

/// Number of level headers in the superblock (content level included).
pub const LEVEL_HEADER_COUNT: usize = 6;

/// One level descriptor as stored in the superblock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelHeader {
    pub logical_offset: u64,
    pub hash_data_size: u64,
    pub block_size_log2: u32,
}

/// A fully built tree over one content stream.
pub struct HashTree {
    /// Level descriptors, top hash level first, content level last.
    pub levels: [LevelHeader; LEVEL_HEADER_COUNT],
    /// Hash data for the five derived levels, in write order (top first).
    pub level_data: Vec<Vec<u8>>,
    pub master_hash: [u8; 0x20],
}

/// Hash one level's content in `block_size` chunks, emitting one digest per
/// chunk. A short final chunk is hashed as-is, never zero-padded.
pub fn build_level<R: Read>(input: &mut R, block_size: u64) -> Result<Vec<u8>, ContainerError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(block_size as usize)
        .map_err(|_| ContainerError::AllocationFailed)?;
    buf.resize(block_size as usize, 0);

    let mut out = Vec::new();
    loop {
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = input.read(&mut buf[filled..])?;
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
        out.extend_from_slice(&hasher.finalize());
        if filled < buf.len() {
            break;
        }
    }
    Ok(out)
}

impl HashTree {
    /// Build the tree over a content stream.
    ///
    /// `content_size` is the logical image size recorded in the content
    /// level's descriptor; the stream itself (tail padding included) is
    /// what gets hashed. The content is read once; the derived levels are
    /// digest tables small enough to hold in memory.
    pub fn build<R: Read + Seek>(
        content: &mut R,
        content_size: u64,
    ) -> Result<Self, ContainerError> {
        let mut levels = [LevelHeader::default(); LEVEL_HEADER_COUNT];
        levels[LEVEL_HEADER_COUNT - 1] = LevelHeader {
            logical_offset: 0,
            hash_data_size: content_size,
            block_size_log2: BLOCK_SIZE_LOG2,
        };

        content.seek(SeekFrom::Start(0))?;
        let mut current = build_level(content, HASH_BLOCK_SIZE)?;

        // Derive upward: each pass hashes the previous level's data.
        let mut level_data = vec![current.clone()];
        for index in (0..LEVEL_HEADER_COUNT - 2).rev() {
            levels[index + 1].hash_data_size = current.len() as u64;
            levels[index + 1].block_size_log2 = BLOCK_SIZE_LOG2;
            current = build_level(&mut std::io::Cursor::new(&current), HASH_BLOCK_SIZE)?;
            level_data.push(current.clone());
        }
        levels[0].hash_data_size = current.len() as u64;
        levels[0].block_size_log2 = BLOCK_SIZE_LOG2;

        // level_data was collected bottom-up; the container writes top first.
        level_data.reverse();

        for index in 1..LEVEL_HEADER_COUNT {
            levels[index].logical_offset =
                levels[index - 1].logical_offset + levels[index - 1].hash_data_size;
        }

        let mut hasher = Sha256::new();
        hasher.update(&level_data[0]);
        let master_hash = hasher.finalize().into();

        Ok(Self {
            levels,
            level_data,
            master_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn build_level_emits_one_digest_per_block() {
        let data = vec![0x77u8; HASH_BLOCK_SIZE as usize * 2 + 5];
        let hashes = build_level(&mut Cursor::new(&data), HASH_BLOCK_SIZE).unwrap();
        assert_eq!(hashes.len(), 3 * 0x20);
    }

    #[test]
    fn short_final_block_is_hashed_as_is() {
        let data = vec![0x01u8; 10];
        let hashes = build_level(&mut Cursor::new(&data), HASH_BLOCK_SIZE).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let expected: [u8; 0x20] = hasher.finalize().into();
        assert_eq!(hashes, expected.to_vec());
    }

    #[test]
    fn tree_is_idempotent() {
        let data: Vec<u8> = (0..HASH_BLOCK_SIZE * 3).map(|i| (i % 253) as u8).collect();
        let a = HashTree::build(&mut Cursor::new(&data), data.len() as u64).unwrap();
        let b = HashTree::build(&mut Cursor::new(&data), data.len() as u64).unwrap();

        assert_eq!(a.master_hash, b.master_hash);
        assert_eq!(a.level_data, b.level_data);
    }

    #[test]
    fn master_hash_tracks_content() {
        let data = vec![0u8; HASH_BLOCK_SIZE as usize];
        let mut altered = data.clone();
        altered[100] = 1;

        let a = HashTree::build(&mut Cursor::new(&data), data.len() as u64).unwrap();
        let b = HashTree::build(&mut Cursor::new(&altered), altered.len() as u64).unwrap();
        assert_ne!(a.master_hash, b.master_hash);
    }

    #[test]
    fn logical_offsets_accumulate() {
        let data = vec![0xF0u8; HASH_BLOCK_SIZE as usize * 4];
        let tree = HashTree::build(&mut Cursor::new(&data), data.len() as u64).unwrap();

        assert_eq!(tree.levels[0].logical_offset, 0);
        for i in 1..LEVEL_HEADER_COUNT {
            assert_eq!(
                tree.levels[i].logical_offset,
                tree.levels[i - 1].logical_offset + tree.levels[i - 1].hash_data_size
            );
        }

        // The level above the content holds one digest per content block.
        assert_eq!(
            tree.levels[LEVEL_HEADER_COUNT - 2].hash_data_size,
            4 * 0x20
        );
        // Everything higher collapses to a single digest.
        assert_eq!(tree.levels[0].hash_data_size, 0x20);
    }

    #[test]
    fn level_data_is_written_top_first() {
        let data = vec![0x3Cu8; HASH_BLOCK_SIZE as usize * 2];
        let tree = HashTree::build(&mut Cursor::new(&data), data.len() as u64).unwrap();

        assert_eq!(tree.level_data.len(), LEVEL_HEADER_COUNT - 1);
        for (header, data) in tree.levels.iter().zip(tree.level_data.iter()) {
            assert_eq!(header.hash_data_size, data.len() as u64);
        }

        let mut hasher = Sha256::new();
        hasher.update(&tree.level_data[0]);
        let expected: [u8; 0x20] = hasher.finalize().into();
        assert_eq!(tree.master_hash, expected);
    }
}
