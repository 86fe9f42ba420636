//! Executable-metadata (NPDM) patch pass.
//!
//! The NPDM inside the executable filesystem supplies the title id and, for
//! signed builds, receives the tool's RSA public modulus at the ACID patch
//! point. Both are fixed-offset in-place overwrites; the container builders
//! never look inside this file again.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use nxpkg_secure::sign::ACID_PUBLIC_MODULUS;

use crate::error::PipelineError;
use crate::settings::BuildSettings;

const META_MAGIC: [u8; 4] = *b"META";
const ACI0_MAGIC: [u8; 4] = *b"ACI0";
const ACID_MAGIC: [u8; 4] = *b"ACID";

/// Offsets inside the META header.
const ACI0_OFFSET_FIELD: u64 = 0x70;
const ACID_OFFSET_FIELD: u64 = 0x78;

/// Title id field inside the ACI0 block.
const ACI0_TITLE_ID_OFFSET: u64 = 0x10;

/// Public modulus inside the ACID block (behind its signature).
const ACID_MODULUS_OFFSET: u64 = 0x100;

/// ACID magic sits behind signature and modulus.
const ACID_MAGIC_OFFSET: u64 = 0x200;

const TITLE_ID_MIN: u64 = 0x0100_0000_0000_0000;
const TITLE_ID_MAX: u64 = 0x0fff_ffff_ffff_ffff;

/// Validate `main.npdm`, resolve the title id, and apply the configured
/// patches. Returns the effective title id for the rest of the pipeline.
pub fn process(settings: &BuildSettings) -> Result<u64, PipelineError> {
    let npdm_path = settings.exefs_dir.join("main.npdm");
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&npdm_path)
        .map_err(|_| PipelineError::OpenFailed(npdm_path.clone()))?;

    expect_magic(&mut file, 0, META_MAGIC, &npdm_path)?;

    file.seek(SeekFrom::Start(ACI0_OFFSET_FIELD))?;
    let aci0_offset = u64::from(file.read_u32::<LittleEndian>()?);
    file.seek(SeekFrom::Start(ACID_OFFSET_FIELD))?;
    let acid_offset = u64::from(file.read_u32::<LittleEndian>()?);

    expect_magic(&mut file, acid_offset + ACID_MAGIC_OFFSET, ACID_MAGIC, &npdm_path)?;
    expect_magic(&mut file, aci0_offset, ACI0_MAGIC, &npdm_path)?;

    let title_id = match settings.title_id {
        Some(title_id) => title_id,
        None => {
            file.seek(SeekFrom::Start(aci0_offset + ACI0_TITLE_ID_OFFSET))?;
            file.read_u64::<LittleEndian>()?
        }
    };
    if !(TITLE_ID_MIN..=TITLE_ID_MAX).contains(&title_id) {
        return Err(PipelineError::BadTitleId { title_id });
    }
    if title_id > 0x01ff_ffff_ffff_ffff {
        warn!("title id {title_id:016x} is above 01ffffffffffffff and not recommended");
    }

    if settings.title_id.is_some() {
        debug!("patching title id to {title_id:016x}");
        file.seek(SeekFrom::Start(aci0_offset + ACI0_TITLE_ID_OFFSET))?;
        file.write_u64::<LittleEndian>(title_id)?;
    }

    if !settings.no_sign_acid {
        backup(&npdm_path, &settings.backup_dir, "main.npdm")?;
        debug!("patching ACID public key");
        file.seek(SeekFrom::Start(acid_offset + ACID_MODULUS_OFFSET))?;
        file.write_all(&ACID_PUBLIC_MODULUS)?;
    }

    Ok(title_id)
}

fn expect_magic(
    file: &mut std::fs::File,
    offset: u64,
    magic: [u8; 4],
    path: &Path,
) -> Result<(), PipelineError> {
    file.seek(SeekFrom::Start(offset))?;
    let mut found = [0u8; 4];
    file.read_exact(&mut found).map_err(|_| PipelineError::Truncated {
        file: path.to_path_buf(),
    })?;
    if found != magic {
        return Err(PipelineError::BadMagic {
            file: path.to_path_buf(),
            expected: String::from_utf8_lossy(&magic).into_owned(),
        });
    }
    Ok(())
}

/// Copy a file into the backup directory under a timestamped name before
/// overwriting it in place.
pub(crate) fn backup(
    source: &Path,
    backup_dir: &Path,
    name: &str,
) -> Result<(), PipelineError> {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let target = backup_dir.join(format!("{seconds}_{name}"));
    debug!(target = %target.display(), "backing up {name}");
    std::fs::copy(source, target)?;
    Ok(())
}
