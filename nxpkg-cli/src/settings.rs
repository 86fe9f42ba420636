//! Immutable build configuration.
//!
//! One value, assembled once from the command line and passed by reference
//! into every pipeline step; nothing here mutates during a run.

use std::path::PathBuf;

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Explicit keyset file; when absent the usual locations are probed.
    pub keyset_path: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub nca_dir: PathBuf,
    pub nsp_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub exefs_dir: PathBuf,
    pub romfs_dir: PathBuf,
    pub logo_dir: PathBuf,
    pub control_dir: PathBuf,
    pub htmldoc_dir: Option<PathBuf>,
    pub legalinfo_dir: Option<PathBuf>,
    /// Skip the program container's read-only asset section.
    pub no_romfs: bool,
    /// Skip the program container's logo section.
    pub no_logo: bool,
    /// Leave sections unencrypted and tag them plaintext.
    pub plaintext: bool,
    pub keep_nca_dir: bool,
    pub no_patch_nacp_logo: bool,
    /// Skip the ACID public-key patch and header signature.
    pub no_sign_acid: bool,
    pub title_id: Option<u64>,
    pub title_name: Option<String>,
    pub title_publisher: Option<String>,
    /// Content-area key sealed into key-area slot 2.
    pub content_key: [u8; 0x10],
    /// Key generation selecting the key-area key, 1..=32.
    pub keygeneration: u8,
    pub sdk_version: u32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            keyset_path: None,
            temp_dir: PathBuf::from("nxpkg_temp"),
            nca_dir: PathBuf::from("nxpkg_nca"),
            nsp_dir: PathBuf::from("nxpkg_nsp"),
            backup_dir: PathBuf::from("nxpkg_backup"),
            exefs_dir: PathBuf::from("exefs"),
            romfs_dir: PathBuf::from("romfs"),
            logo_dir: PathBuf::from("logo"),
            control_dir: PathBuf::from("control"),
            htmldoc_dir: None,
            legalinfo_dir: None,
            no_romfs: false,
            no_logo: false,
            plaintext: false,
            keep_nca_dir: false,
            no_patch_nacp_logo: false,
            no_sign_acid: false,
            title_id: None,
            title_name: None,
            title_publisher: None,
            content_key: [0x04; 0x10],
            keygeneration: 1,
            sdk_version: 0x000C_1100,
        }
    }
}
