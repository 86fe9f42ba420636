pub use structs::{HashTable, EXEFS_HASH_BLOCK_SIZE, LOGO_HASH_BLOCK_SIZE, META_HASH_BLOCK_SIZE};
pub use writer::{create_hash_table, Pfs0Writer};

pub mod structs;
pub mod writer;
