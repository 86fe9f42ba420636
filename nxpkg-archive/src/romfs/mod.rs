pub use structs::{hash_table_entry_count, path_hash, RomFsHeader};
pub use writer::RomFsWriter;

pub mod structs;
pub mod writer;

#[cfg(test)]
mod tests;
