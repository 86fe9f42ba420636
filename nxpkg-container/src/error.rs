//! Error types for container assembly

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling or sealing a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive build failed: {0}")]
    Archive(#[from] nxpkg_archive::ArchiveError),
    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] nxpkg_secure::CryptoError),
    #[error("Keyset error: {0}")]
    Keyset(#[from] nxpkg_secure::KeysetError),
    #[error("Container has no sections")]
    NoSections,
    #[error("Container already holds the maximum of 4 sections")]
    TooManySections,
    #[error("Failed to create working file {0}")]
    CreateFailed(PathBuf),
    #[error("Failed to allocate working buffer")]
    AllocationFailed,
}
