//! NCA content-archive assembly.
//!
//! An NCA is a sealed, content-addressed container of up to four sections.
//! This crate builds them from the flat images produced by `nxpkg-archive`:
//! it wraps read-only filesystem images in an IVFC integrity tree, wraps
//! partition archives with a block hash table, lays the sections out in
//! media units behind the fixed header, seals key area / sections / header
//! with their respective cipher modes, and derives the container's content
//! id from its whole-file digest. The CNMT metadata record set that binds
//! the finished containers into one title also lives here.

pub mod cnmt;
pub mod error;
pub mod ivfc;
pub mod nca;

pub use cnmt::{Cnmt, ContentRecord, ContentRecordType};
pub use error::ContainerError;
pub use nca::structs::ContentType;
pub use nca::writer::{NcaBuilder, NcaOutput, SectionSource};
