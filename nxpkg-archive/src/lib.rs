//! Flat filesystem-image writers for NX content sections.
//!
//! Two on-disk layouts are produced here:
//!
//! - **RomFS**: a flattened directory tree with hashed directory/file
//!   lookup tables, used for read-only asset sections.
//! - **PFS0**: a non-recursive named-blob archive, used for executable
//!   sections, icon sections, metadata sections and the outer package file.
//!
//! Both writers stream file contents in bounded chunks; only the table
//! intermediates (proportional to entry count) live in memory.

pub mod error;
pub mod pfs0;
pub mod romfs;

pub use error::ArchiveError;
pub use pfs0::writer::Pfs0Writer;
pub use romfs::writer::RomFsWriter;
