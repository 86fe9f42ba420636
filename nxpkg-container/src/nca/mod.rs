pub use structs::{ContentType, CryptType, FsHeader, FsType, HashType, NcaHeader, Superblock};
pub use writer::{NcaBuilder, NcaOutput, SectionSource};

pub mod structs;
pub mod writer;
