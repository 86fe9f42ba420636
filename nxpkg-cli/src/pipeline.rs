//! The build pipeline.
//!
//! Fixed sequence, each step consuming the previous step's outputs:
//! metadata patches, one container per content type, the metadata
//! container binding them together, and finally the package archive over
//! everything. The first error aborts the run; partially written output is
//! left on disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use nxpkg_archive::pfs0::{EXEFS_HASH_BLOCK_SIZE, LOGO_HASH_BLOCK_SIZE, META_HASH_BLOCK_SIZE};
use nxpkg_archive::Pfs0Writer;
use nxpkg_container::{
    Cnmt, ContentRecord, ContentRecordType, ContentType, NcaBuilder, NcaOutput, SectionSource,
};
use nxpkg_secure::Keyset;

use crate::error::PipelineError;
use crate::settings::BuildSettings;
use crate::{nacp, npdm};

/// Run the whole pipeline; returns the path of the finished package.
pub fn run(settings: &BuildSettings) -> Result<PathBuf, PipelineError> {
    prepare_directories(settings)?;

    let keyset = load_keyset(settings)?;
    // Fail before any container work if the run's keys are absent.
    keyset.key_area_key(settings.keygeneration)?;
    keyset.header_key()?;

    let title_id = {
        let _span = info_span!("npdm").entered();
        npdm::process(settings)?
    };
    {
        let _span = info_span!("nacp").entered();
        nacp::process(settings, title_id)?;
    }

    let mut cnmt = Cnmt::new(title_id);

    let program = {
        let _span = info_span!("program-nca").entered();
        build_program(settings, &keyset, title_id)?
    };
    cnmt.push_record(record(&program, ContentRecordType::Program));

    let control = {
        let _span = info_span!("control-nca").entered();
        NcaBuilder::new(ContentType::Control, title_id)
            .with_sdk_version(settings.sdk_version)
            .with_keygeneration(settings.keygeneration)
            .with_content_key(settings.content_key)
            .with_plaintext(settings.plaintext)
            .add_section(SectionSource::RomFs {
                dir: settings.control_dir.clone(),
            })
            .write(&settings.nca_dir.join("control.nca"), &keyset, &settings.temp_dir)?
    };
    cnmt.push_record(record(&control, ContentRecordType::Control));

    if let Some(htmldoc_dir) = &settings.htmldoc_dir {
        let _span = info_span!("manual-htmldoc-nca").entered();
        let manual = build_manual(settings, &keyset, title_id, htmldoc_dir, "manual_htmldoc")?;
        cnmt.push_record(record(&manual, ContentRecordType::HtmlDocument));
    }
    if let Some(legalinfo_dir) = &settings.legalinfo_dir {
        let _span = info_span!("manual-legalinfo-nca").entered();
        let manual =
            build_manual(settings, &keyset, title_id, legalinfo_dir, "manual_legalinfo")?;
        cnmt.push_record(record(&manual, ContentRecordType::LegalInformation));
    }

    {
        let _span = info_span!("meta-nca").entered();
        build_meta(settings, &keyset, title_id, &cnmt)?;
    }

    let nsp_path = {
        let _span = info_span!("nsp").entered();
        build_package(settings, title_id)?
    };

    cleanup(settings)?;
    summarize(settings, title_id, &nsp_path);
    Ok(nsp_path)
}

fn prepare_directories(settings: &BuildSettings) -> Result<(), PipelineError> {
    // Stale temp and container directories would leak into the package.
    remove_dir_if_present(&settings.temp_dir)?;
    remove_dir_if_present(&settings.nca_dir)?;
    fs::create_dir_all(&settings.temp_dir)?;
    fs::create_dir_all(&settings.nca_dir)?;
    fs::create_dir_all(&settings.nsp_dir)?;
    fs::create_dir_all(&settings.backup_dir)?;
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Explicit keyset path, or the first of the usual locations that exists.
fn load_keyset(settings: &BuildSettings) -> Result<Keyset, PipelineError> {
    if let Some(path) = &settings.keyset_path {
        info!(path = %path.display(), "loading keyset");
        return Ok(Keyset::load(path)?);
    }

    let mut candidates = vec![
        PathBuf::from("keys.dat"),
        PathBuf::from("keys.txt"),
        PathBuf::from("keys.ini"),
        PathBuf::from("prod.keys"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".switch").join("prod.keys"));
    }

    for candidate in candidates {
        if candidate.is_file() {
            info!(path = %candidate.display(), "loading keyset");
            return Ok(Keyset::load(&candidate)?);
        }
    }
    Err(PipelineError::KeysetNotFound)
}

fn build_program(
    settings: &BuildSettings,
    keyset: &Keyset,
    title_id: u64,
) -> Result<NcaOutput, PipelineError> {
    let mut builder = NcaBuilder::new(ContentType::Program, title_id)
        .with_sdk_version(settings.sdk_version)
        .with_keygeneration(settings.keygeneration)
        .with_content_key(settings.content_key)
        .with_plaintext(settings.plaintext)
        .with_acid_signature(!settings.no_sign_acid)
        .add_section(SectionSource::Pfs0 {
            dir: settings.exefs_dir.clone(),
            hash_block_size: EXEFS_HASH_BLOCK_SIZE,
            plaintext: false,
        });
    if !settings.no_romfs {
        builder = builder.add_section(SectionSource::RomFs {
            dir: settings.romfs_dir.clone(),
        });
    }
    if !settings.no_logo {
        // The icon section stays clear so loaders can read it unkeyed.
        builder = builder.add_section(SectionSource::Pfs0 {
            dir: settings.logo_dir.clone(),
            hash_block_size: LOGO_HASH_BLOCK_SIZE,
            plaintext: true,
        });
    }
    Ok(builder.write(&settings.nca_dir.join("program.nca"), keyset, &settings.temp_dir)?)
}

fn build_manual(
    settings: &BuildSettings,
    keyset: &Keyset,
    title_id: u64,
    dir: &Path,
    working_name: &str,
) -> Result<NcaOutput, PipelineError> {
    Ok(NcaBuilder::new(ContentType::Manual, title_id)
        .with_sdk_version(settings.sdk_version)
        .with_keygeneration(settings.keygeneration)
        .with_content_key(settings.content_key)
        .with_plaintext(settings.plaintext)
        .add_section(SectionSource::RomFs {
            dir: dir.to_path_buf(),
        })
        .write(
            &settings.nca_dir.join(format!("{working_name}.nca")),
            keyset,
            &settings.temp_dir,
        )?)
}

fn build_meta(
    settings: &BuildSettings,
    keyset: &Keyset,
    title_id: u64,
    cnmt: &Cnmt,
) -> Result<NcaOutput, PipelineError> {
    let cnmt_dir = settings.temp_dir.join("cnmt");
    fs::create_dir_all(&cnmt_dir)?;
    let cnmt_path = cnmt_dir.join(format!("Application_{title_id:016x}.cnmt"));
    fs::write(&cnmt_path, cnmt.to_vec())?;

    Ok(NcaBuilder::new(ContentType::Meta, title_id)
        .with_sdk_version(settings.sdk_version)
        .with_keygeneration(settings.keygeneration)
        .with_content_key(settings.content_key)
        .with_plaintext(settings.plaintext)
        .add_section(SectionSource::Pfs0 {
            dir: cnmt_dir,
            hash_block_size: META_HASH_BLOCK_SIZE,
            plaintext: false,
        })
        .write(&settings.nca_dir.join("meta.nca"), keyset, &settings.temp_dir)?)
}

/// The package is a plain partition archive over the finished containers.
fn build_package(settings: &BuildSettings, title_id: u64) -> Result<PathBuf, PipelineError> {
    let nsp_path = settings.nsp_dir.join(format!("{title_id:016x}.nsp"));
    let mut nsp_file = File::create(&nsp_path)?;
    let size = Pfs0Writer::new(&settings.nca_dir).write_into(&mut nsp_file)?;
    info!(path = %nsp_path.display(), size, "package created");
    Ok(nsp_path)
}

fn cleanup(settings: &BuildSettings) -> Result<(), PipelineError> {
    remove_dir_if_present(&settings.temp_dir)?;
    if !settings.keep_nca_dir {
        remove_dir_if_present(&settings.nca_dir)?;
    }
    Ok(())
}

fn record(output: &NcaOutput, record_type: ContentRecordType) -> ContentRecord {
    ContentRecord {
        hash: output.hash,
        content_id: output.content_id,
        size: output.size,
        record_type,
    }
}

fn summarize(settings: &BuildSettings, title_id: u64, nsp_path: &Path) {
    let title_id = format!("{title_id:016x}");
    let sdk_version = format!("{:08x}", settings.sdk_version);
    info!(
        title_id = %title_id,
        keygeneration = settings.keygeneration,
        sdk_version = %sdk_version,
        crypto = if settings.plaintext { "plaintext" } else { "aes-ctr" },
        romfs_section = !settings.no_romfs,
        logo_section = !settings.no_logo,
        htmldoc = settings.htmldoc_dir.is_some(),
        legalinfo = settings.legalinfo_dir.is_some(),
        package = %nsp_path.display(),
        "build complete"
    );
}
