//! Error types for crypto and keyset operations

use thiserror::Error;

/// Errors from cipher and signing primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("Data length {len} is not a multiple of the {unit}-byte cipher unit")]
    UnalignedData { len: usize, unit: usize },
    #[error("Signing failed: {0}")]
    Signature(String),
}

/// Errors from keyset loading and lookup.
#[derive(Debug, Error)]
pub enum KeysetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed keyset line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("Key \"{0}\" has an invalid hex value")]
    InvalidHexValue(String),
    #[error("Key \"{0}\" is not present in the keyset")]
    MissingKey(String),
}
