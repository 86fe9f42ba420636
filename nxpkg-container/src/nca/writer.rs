//! NCA assembler.
//!
//! Builds one container end to end: a zeroed header placeholder is written
//! first, sections stream in behind it padded to media units, then the
//! header is finalized, sealed (key area, sections, signature, header span)
//! and rewritten over the placeholder. The whole-file digest taken last
//! names the container: its first 16 bytes become the content id and the
//! final filename.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes128, Block};
use ctr::Ctr128BE;
use tracing::{debug, info};

use nxpkg_archive::pfs0::create_hash_table;
use nxpkg_archive::{Pfs0Writer, RomFsWriter};
use nxpkg_secure::{hash, sign, Keyset};
use nxpkg_secure::XtsAes128;

use crate::error::ContainerError;
use crate::ivfc::HashTree;

use super::structs::{
    ContentType, CryptType, FsHeader, FsType, HashType, NcaHeader, SectionEntry, Superblock,
    HEADER_SIZE, MEDIA_UNIT, SIGNED_SPAN,
};

/// Chunk size for in-place section encryption.
const CRYPT_CHUNK: usize = 0x40_0000;

/// What goes into one section slot.
pub enum SectionSource {
    /// Partition archive over a directory's immediate files, wrapped with a
    /// block hash table. `plaintext` forces the section to stay clear even
    /// in an otherwise encrypted container (icon/logo sections).
    Pfs0 {
        dir: PathBuf,
        hash_block_size: u32,
        plaintext: bool,
    },
    /// RomFS image wrapped in an integrity hash tree.
    RomFs { dir: PathBuf },
}

/// Identity of a finished container.
pub struct NcaOutput {
    pub path: PathBuf,
    pub hash: [u8; 0x20],
    pub content_id: [u8; 0x10],
    pub size: u64,
}

/// Builder for one container.
pub struct NcaBuilder {
    content_type: ContentType,
    title_id: u64,
    sdk_version: u32,
    keygeneration: u8,
    content_key: [u8; 0x10],
    plaintext: bool,
    sign_acid: bool,
    sections: Vec<SectionSource>,
}

impl NcaBuilder {
    pub fn new(content_type: ContentType, title_id: u64) -> Self {
        Self {
            content_type,
            title_id,
            sdk_version: 0x000C_1100,
            keygeneration: 1,
            content_key: [0u8; 0x10],
            plaintext: false,
            sign_acid: false,
            sections: Vec::new(),
        }
    }

    pub const fn with_sdk_version(mut self, sdk_version: u32) -> Self {
        self.sdk_version = sdk_version;
        self
    }

    pub const fn with_keygeneration(mut self, keygeneration: u8) -> Self {
        self.keygeneration = keygeneration;
        self
    }

    /// Content-area key placed in key-area slot 2 before sealing.
    pub const fn with_content_key(mut self, key: [u8; 0x10]) -> Self {
        self.content_key = key;
        self
    }

    /// Skip section encryption and tag section headers as plaintext.
    pub const fn with_plaintext(mut self, plaintext: bool) -> Self {
        self.plaintext = plaintext;
        self
    }

    /// Sign the sealed header span with the embedded ACID key (primary
    /// container only).
    pub const fn with_acid_signature(mut self, sign: bool) -> Self {
        self.sign_acid = sign;
        self
    }

    pub fn add_section(mut self, source: SectionSource) -> Self {
        self.sections.push(source);
        self
    }

    /// Assemble the container at `working_path`, then rename it to its
    /// content id. Section images are staged under `temp_dir`.
    pub fn write(
        self,
        working_path: &Path,
        keyset: &Keyset,
        temp_dir: &Path,
    ) -> Result<NcaOutput, ContainerError> {
        if self.sections.is_empty() {
            return Err(ContainerError::NoSections);
        }
        if self.sections.len() > 4 {
            return Err(ContainerError::TooManySections);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(working_path)
            .map_err(|_| ContainerError::CreateFailed(working_path.to_path_buf()))?;

        // Reserve the fixed header span.
        file.write_all(&[0u8; HEADER_SIZE])?;

        let mut header = NcaHeader {
            content_type: Some(self.content_type),
            title_id: self.title_id,
            sdk_version: self.sdk_version,
            ..Default::default()
        };
        header.set_keygeneration(self.keygeneration);

        for (index, source) in self.sections.iter().enumerate() {
            let media_start = (file.stream_position()? / MEDIA_UNIT) as u32;
            let fs_header = match source {
                SectionSource::Pfs0 {
                    dir,
                    hash_block_size,
                    plaintext,
                } => self.write_pfs0_section(&mut file, index, dir, *hash_block_size, *plaintext, temp_dir)?,
                SectionSource::RomFs { dir } => {
                    self.write_romfs_section(&mut file, index, dir, temp_dir)?
                }
            };
            pad_to_media_unit(&mut file)?;
            let media_end = (file.stream_position()? / MEDIA_UNIT) as u32;

            header.section_entries[index] = SectionEntry {
                media_start_offset: media_start,
                media_end_offset: media_end,
            };
            header.section_hashes[index] = hash::sha256(&fs_header.to_bytes()?);
            header.fs_headers[index] = Some(fs_header);
            debug!(
                section = index,
                media_start, media_end, "section written"
            );
        }

        // Key-area slot 2 holds the content key.
        header.key_area[0x20..0x30].copy_from_slice(&self.content_key);

        for index in 0..self.sections.len() {
            let crypt_type = header.fs_headers[index]
                .as_ref()
                .map(|h| h.crypt_type)
                .unwrap_or(CryptType::None);
            if crypt_type == CryptType::Ctr {
                debug!(section = index, "encrypting section");
                let entry = &header.section_entries[index];
                let seed = header.fs_headers[index]
                    .as_ref()
                    .map(|h| h.counter_seed)
                    .unwrap_or_default();
                encrypt_section(
                    &mut file,
                    u64::from(entry.media_start_offset) * MEDIA_UNIT,
                    u64::from(entry.media_end_offset) * MEDIA_UNIT,
                    &self.content_key,
                    &seed,
                )?;
            }
        }

        header.nca_size = file.seek(SeekFrom::End(0))?;

        // Seal the key area under the keygeneration's application key.
        let kaek = keyset.key_area_key(self.keygeneration)?;
        let cipher = Aes128::new(&(*kaek).into());
        for block in header.key_area.chunks_exact_mut(0x10) {
            cipher.encrypt_block(Block::from_mut_slice(block));
        }

        let mut header_bytes = header.to_bytes()?;
        if self.sign_acid {
            debug!("signing header");
            header.acid_signature = sign::sign_pss(&header_bytes[SIGNED_SPAN])?;
            header_bytes = header.to_bytes()?;
        }

        // Seal the whole header span.
        let xts = XtsAes128::new(keyset.header_key()?);
        xts.encrypt_in_place(&mut header_bytes, 0, MEDIA_UNIT as usize)?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header_bytes)?;
        file.flush()?;

        // The finished container names itself.
        file.seek(SeekFrom::Start(0))?;
        let file_hash = hash::sha256_stream(&mut file)?;
        let mut content_id = [0u8; 0x10];
        content_id.copy_from_slice(&file_hash[..0x10]);
        drop(file);

        let suffix = match self.content_type {
            ContentType::Meta => ".cnmt.nca",
            _ => ".nca",
        };
        let final_name = format!("{}{suffix}", hash::hex_string(&content_id));
        let final_path = working_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&final_name);
        fs::rename(working_path, &final_path)?;
        info!(path = %final_path.display(), "container created");

        Ok(NcaOutput {
            path: final_path,
            hash: file_hash,
            content_id,
            size: header.nca_size,
        })
    }

    fn write_pfs0_section(
        &self,
        file: &mut File,
        index: usize,
        dir: &Path,
        hash_block_size: u32,
        force_plaintext: bool,
        temp_dir: &Path,
    ) -> Result<FsHeader, ContainerError> {
        let archive_path = temp_dir.join(format!("sec{index}.pfs0"));
        let mut archive_file = File::create(&archive_path)?;
        let archive_size = Pfs0Writer::new(dir).write_into(&mut archive_file)?;
        archive_file.flush()?;
        drop(archive_file);

        let table = create_hash_table(&mut File::open(&archive_path)?, hash_block_size)?;
        file.write_all(&table.bytes)?;
        io::copy(&mut File::open(&archive_path)?, file)?;

        let crypt_type = if force_plaintext || self.plaintext {
            CryptType::None
        } else {
            CryptType::Ctr
        };
        Ok(FsHeader {
            fs_type: FsType::PartitionFs,
            hash_type: HashType::HierarchicalSha256,
            crypt_type,
            superblock: Superblock::Pfs0 {
                master_hash: table.master_hash(),
                block_size: hash_block_size,
                hash_table_size: table.table_size,
                pfs0_offset: table.content_offset,
                pfs0_size: archive_size,
            },
            counter_seed: [0u8; 8],
        })
    }

    fn write_romfs_section(
        &self,
        file: &mut File,
        index: usize,
        dir: &Path,
        temp_dir: &Path,
    ) -> Result<FsHeader, ContainerError> {
        let image_path = temp_dir.join(format!("sec{index}.romfs"));
        let mut image_file = File::create(&image_path)?;
        let image_size = RomFsWriter::new(dir).write_into(&mut image_file)?;
        image_file.flush()?;
        drop(image_file);

        let mut image = File::open(&image_path)?;
        let tree = HashTree::build(&mut image, image_size)?;

        // Hash levels first, top down, then the content itself.
        for level in &tree.level_data {
            file.write_all(level)?;
        }
        image.seek(SeekFrom::Start(0))?;
        io::copy(&mut image, file)?;

        let crypt_type = if self.plaintext {
            CryptType::None
        } else {
            CryptType::Ctr
        };
        Ok(FsHeader {
            fs_type: FsType::RomFs,
            hash_type: HashType::HierarchicalIntegrity,
            crypt_type,
            superblock: Superblock::RomFs {
                levels: tree.levels,
                master_hash: tree.master_hash,
            },
            counter_seed: [0u8; 8],
        })
    }
}

/// Counter block for a section offset: the high half is the stored seed
/// reversed into the counter, the low half is the 16-byte-unit offset,
/// big-endian. Rederived at every chunk boundary rather than incremented.
pub fn section_counter(seed: &[u8; 8], offset: u64) -> [u8; 0x10] {
    let mut counter = [0u8; 0x10];
    for (i, byte) in counter[..8].iter_mut().enumerate() {
        *byte = seed[7 - i];
    }
    counter[8..].copy_from_slice(&(offset >> 4).to_be_bytes());
    counter
}

/// Encrypt a section's on-disk byte range in place.
fn encrypt_section(
    file: &mut File,
    start: u64,
    end: u64,
    key: &[u8; 0x10],
    seed: &[u8; 8],
) -> Result<(), ContainerError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(CRYPT_CHUNK.min((end - start) as usize))
        .map_err(|_| ContainerError::AllocationFailed)?;
    buf.resize(CRYPT_CHUNK.min((end - start) as usize), 0);

    let mut offset = start;
    while offset < end {
        let len = buf.len().min((end - offset) as usize);
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..len])?;

        let counter = section_counter(seed, offset);
        let mut cipher = Ctr128BE::<Aes128>::new(&(*key).into(), &counter.into());
        cipher.apply_keystream(&mut buf[..len]);

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buf[..len])?;
        offset += len as u64;
    }
    Ok(())
}

fn pad_to_media_unit(file: &mut File) -> io::Result<()> {
    let position = file.stream_position()?;
    let padding = position.next_multiple_of(MEDIA_UNIT) - position;
    if padding > 0 {
        file.write_all(&vec![0u8; padding as usize])?;
    }
    Ok(())
}
