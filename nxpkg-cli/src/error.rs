//! Error types for the build pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to locate a keyset file; pass one with --keyset")]
    KeysetNotFound,
    #[error("Keyset error: {0}")]
    Keyset(#[from] nxpkg_secure::KeysetError),
    #[error("Container build failed: {0}")]
    Container(#[from] nxpkg_container::ContainerError),
    #[error("Package build failed: {0}")]
    Archive(#[from] nxpkg_archive::ArchiveError),
    #[error("Failed to open {0}")]
    OpenFailed(PathBuf),
    #[error("Invalid magic in {file}: expected {expected}")]
    BadMagic { file: PathBuf, expected: String },
    #[error("{file} is truncated")]
    Truncated { file: PathBuf },
    #[error(
        "Bad title id {title_id:#018x}; valid range is 0100000000000000-0fffffffffffffff"
    )]
    BadTitleId { title_id: u64 },
    #[error("Invalid title name in control metadata")]
    MissingTitleName,
    #[error("Invalid publisher in control metadata")]
    MissingPublisher,
}
