//! `nxpkg` builds an installable NSP package from loose input directories.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nxpkg_cli::{pipeline, BuildSettings};

#[derive(Parser)]
#[command(
    name = "nxpkg",
    version,
    about = "Packs ExeFS/RomFS/control directories into sealed containers and an NSP"
)]
struct Args {
    /// Keyset file; defaults probe keys.dat, keys.txt, keys.ini, prod.keys,
    /// then ~/.switch/prod.keys
    #[arg(short, long)]
    keyset: Option<PathBuf>,

    /// Temp directory for staged section images
    #[arg(long, default_value = "nxpkg_temp")]
    tempdir: PathBuf,

    /// Output directory for finished containers
    #[arg(long, default_value = "nxpkg_nca")]
    ncadir: PathBuf,

    /// Output directory for the final package
    #[arg(long, default_value = "nxpkg_nsp")]
    nspdir: PathBuf,

    /// Backup directory for patched metadata originals
    #[arg(long, default_value = "nxpkg_backup")]
    backupdir: PathBuf,

    /// Program executable filesystem directory
    #[arg(long, default_value = "exefs")]
    exefsdir: PathBuf,

    /// Program read-only asset filesystem directory
    #[arg(long, default_value = "romfs")]
    romfsdir: PathBuf,

    /// Program icon/logo directory
    #[arg(long, default_value = "logo")]
    logodir: PathBuf,

    /// Control metadata filesystem directory
    #[arg(long, default_value = "control")]
    controldir: PathBuf,

    /// HtmlDocument manual filesystem directory
    #[arg(long)]
    htmldocdir: Option<PathBuf>,

    /// LegalInformation manual filesystem directory
    #[arg(long)]
    legalinfodir: Option<PathBuf>,

    /// Skip the program container's asset section
    #[arg(long)]
    noromfs: bool,

    /// Skip the program container's logo section
    #[arg(long)]
    nologo: bool,

    /// Skip section encryption and tag section headers plaintext
    #[arg(long)]
    plaintext: bool,

    /// Keep the container directory next to the package
    #[arg(long)]
    keepncadir: bool,

    /// Leave the logo-handling field in control.nacp untouched
    #[arg(long)]
    nopatchnacplogo: bool,

    /// Skip the ACID public-key patch and header signature
    #[arg(long)]
    nosignacid: bool,

    /// Key generation for the key-area seal (1-32)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=32))]
    keygeneration: u8,

    /// Content-area key, 16 bytes of hex
    #[arg(long, value_parser = parse_key)]
    keyareakey: Option<[u8; 16]>,

    /// SDK version in hex, minimum 000B0000
    #[arg(long, value_parser = parse_sdk_version)]
    sdkversion: Option<u32>,

    /// Title id override in hex; also patched into NPDM and NACP
    #[arg(long, value_parser = parse_title_id)]
    titleid: Option<u64>,

    /// Title name override for all languages (max 511 bytes)
    #[arg(long)]
    titlename: Option<String>,

    /// Title publisher override for all languages (max 255 bytes)
    #[arg(long)]
    titlepublisher: Option<String>,
}

fn parse_key(value: &str) -> Result<[u8; 16], String> {
    if value.len() != 32 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("expected 16 bytes of hex".to_string());
    }
    let mut key = [0u8; 16];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16)
            .map_err(|e| e.to_string())?;
    }
    Ok(key)
}

fn parse_sdk_version(value: &str) -> Result<u32, String> {
    let version = u32::from_str_radix(value, 16).map_err(|e| e.to_string())?;
    if version < 0x000B_0000 {
        return Err("valid SDK version range is 000B0000-00FFFFFF".to_string());
    }
    Ok(version)
}

fn parse_title_id(value: &str) -> Result<u64, String> {
    u64::from_str_radix(value, 16).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Some(name) = &args.titlename {
        if name.len() >= 0x200 {
            bail!("title name is longer than 511 bytes");
        }
    }
    if let Some(publisher) = &args.titlepublisher {
        if publisher.len() >= 0x100 {
            bail!("title publisher is longer than 255 bytes");
        }
    }

    let settings = BuildSettings {
        keyset_path: args.keyset,
        temp_dir: args.tempdir,
        nca_dir: args.ncadir,
        nsp_dir: args.nspdir,
        backup_dir: args.backupdir,
        exefs_dir: args.exefsdir,
        romfs_dir: args.romfsdir,
        logo_dir: args.logodir,
        control_dir: args.controldir,
        htmldoc_dir: args.htmldocdir,
        legalinfo_dir: args.legalinfodir,
        no_romfs: args.noromfs,
        no_logo: args.nologo,
        plaintext: args.plaintext,
        keep_nca_dir: args.keepncadir,
        no_patch_nacp_logo: args.nopatchnacplogo,
        no_sign_acid: args.nosignacid,
        title_id: args.titleid,
        title_name: args.titlename,
        title_publisher: args.titlepublisher,
        content_key: args.keyareakey.unwrap_or([0x04; 0x10]),
        keygeneration: args.keygeneration,
        sdk_version: args.sdkversion.unwrap_or(0x000C_1100),
    };

    pipeline::run(&settings).context("build failed")?;
    Ok(())
}
