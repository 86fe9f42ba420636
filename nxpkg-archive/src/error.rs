//! Error types for archive building

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while serializing a source directory into an image.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input directory not found: {0}")]
    InputNotFound(PathBuf),
    #[error("Invalid filesystem object type for {0}")]
    InvalidEntryType(PathBuf),
    #[error("Entry name is not valid UTF-8: {0}")]
    InvalidEntryName(PathBuf),
    #[error("Failed to allocate working buffer")]
    AllocationFailed,
}
