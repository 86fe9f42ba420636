//! Application-metadata (NACP) patch pass.
//!
//! `control.nacp` carries the localized title entries and the ids derived
//! from the title id. Overrides rewrite all patchable language slots; ids
//! propagate into the presence-group, save-data-owner, add-on-content and
//! local-communication fields.

use std::path::Path;

use tracing::debug;

use crate::error::PipelineError;
use crate::npdm::backup;
use crate::settings::BuildSettings;

/// Serialized NACP size.
const NACP_SIZE: usize = 0x4000;

/// 16 title entries of name (0x200) + publisher (0x100).
const TITLE_ENTRY_COUNT: usize = 16;
const TITLE_ENTRY_SIZE: usize = 0x300;
const NAME_SIZE: usize = 0x200;
const PUBLISHER_SIZE: usize = 0x100;

/// Number of language slots the overrides rewrite.
const PATCHED_TITLE_ENTRIES: usize = 12;

const PRESENCE_GROUP_ID_OFFSET: usize = 0x3038;
const ADD_ON_CONTENT_BASE_ID_OFFSET: usize = 0x3070;
const SAVE_DATA_OWNER_ID_OFFSET: usize = 0x3078;
const LOCAL_COMMUNICATION_ID_OFFSET: usize = 0x30B0;
const LOCAL_COMMUNICATION_ID_COUNT: usize = 8;
const LOGO_HANDLING_OFFSET: usize = 0x30F1;

/// Validate and patch `control.nacp` in place.
pub fn process(settings: &BuildSettings, title_id: u64) -> Result<(), PipelineError> {
    let nacp_path = settings.control_dir.join("control.nacp");
    let mut nacp = std::fs::read(&nacp_path)
        .map_err(|_| PipelineError::OpenFailed(nacp_path.clone()))?;
    if nacp.len() < NACP_SIZE {
        return Err(PipelineError::Truncated {
            file: nacp_path.clone(),
        });
    }

    let has_name = (0..TITLE_ENTRY_COUNT).any(|i| nacp[i * TITLE_ENTRY_SIZE] != 0);
    let has_publisher =
        (0..TITLE_ENTRY_COUNT).any(|i| nacp[i * TITLE_ENTRY_SIZE + NAME_SIZE] != 0);

    match &settings.title_name {
        Some(name) => {
            debug!("changing title name");
            let bytes = &name.as_bytes()[..name.len().min(NAME_SIZE - 1)];
            for entry in 0..PATCHED_TITLE_ENTRIES {
                let start = entry * TITLE_ENTRY_SIZE;
                nacp[start..start + NAME_SIZE].fill(0);
                nacp[start..start + bytes.len()].copy_from_slice(bytes);
            }
        }
        None if !has_name => return Err(PipelineError::MissingTitleName),
        None => {}
    }

    match &settings.title_publisher {
        Some(publisher) => {
            debug!("changing title publisher");
            let bytes = &publisher.as_bytes()[..publisher.len().min(PUBLISHER_SIZE - 1)];
            for entry in 0..PATCHED_TITLE_ENTRIES {
                let start = entry * TITLE_ENTRY_SIZE + NAME_SIZE;
                nacp[start..start + PUBLISHER_SIZE].fill(0);
                nacp[start..start + bytes.len()].copy_from_slice(bytes);
            }
        }
        None if !has_publisher => return Err(PipelineError::MissingPublisher),
        None => {}
    }

    if !settings.no_patch_nacp_logo {
        debug!("setting logo handling to auto");
        nacp[LOGO_HANDLING_OFFSET] = 0;
    }

    if settings.title_id.is_some() {
        debug!("propagating title ids");
        write_u64(&mut nacp, PRESENCE_GROUP_ID_OFFSET, title_id);
        write_u64(&mut nacp, SAVE_DATA_OWNER_ID_OFFSET, title_id);
        write_u64(&mut nacp, ADD_ON_CONTENT_BASE_ID_OFFSET, title_id + 0x1000);
        for slot in 0..LOCAL_COMMUNICATION_ID_COUNT {
            write_u64(
                &mut nacp,
                LOCAL_COMMUNICATION_ID_OFFSET + slot * 8,
                title_id,
            );
        }
    }

    let changed = settings.title_name.is_some()
        || settings.title_publisher.is_some()
        || settings.title_id.is_some()
        || !settings.no_patch_nacp_logo;
    if changed {
        backup(&nacp_path, &settings.backup_dir, "control.nacp")?;
        write_back(&nacp_path, &nacp)?;
    }
    Ok(())
}

fn write_u64(nacp: &mut [u8], offset: usize, value: u64) {
    nacp[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_back(path: &Path, nacp: &[u8]) -> Result<(), PipelineError> {
    std::fs::write(path, nacp)?;
    Ok(())
}
