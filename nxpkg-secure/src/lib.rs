//! Crypto plumbing for NX content packaging.
//!
//! This crate gathers the cryptographic pieces the container builders need:
//! streaming SHA-256 helpers, the console-flavored AES-XTS mode used for
//! header sealing, the keyset model loaded from `prod.keys`-style files, and
//! the fixed-key RSA-PSS signer used for the ACID header signature.

pub mod error;
pub mod hash;
pub mod keyset;
pub mod sign;
pub mod xts;

pub use error::{CryptoError, KeysetError};
pub use keyset::Keyset;
pub use xts::XtsAes128;
