//! Keyset model and `prod.keys`-style file parsing.
//!
//! Key files are plain text, one `name = hexvalue` pair per line. Only the
//! keys this toolset actually consumes are retained: the 256-bit header key
//! and the per-keygeneration application key-area keys. Unknown key names
//! are skipped so full console dumps load unchanged.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::KeysetError;

/// Number of supported key generations.
pub const KEYGEN_COUNT: usize = 0x20;

/// The keys needed to seal containers.
#[derive(Clone)]
pub struct Keyset {
    header_key: [u8; 0x20],
    key_area_application_keys: [[u8; 0x10]; KEYGEN_COUNT],
}

impl Default for Keyset {
    fn default() -> Self {
        Self {
            header_key: [0u8; 0x20],
            key_area_application_keys: [[0u8; 0x10]; KEYGEN_COUNT],
        }
    }
}

impl Keyset {
    /// Load a keyset from a key file on disk.
    pub fn load(path: &Path) -> Result<Self, KeysetError> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Parse `name = hexvalue` lines from a reader.
    pub fn parse<R: Read>(reader: BufReader<R>) -> Result<Self, KeysetError> {
        let mut keyset = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let (name, value) = line.split_once('=').ok_or(KeysetError::MalformedLine {
                line: index + 1,
                reason: "expected \"name = hexvalue\"".to_string(),
            })?;
            let name = name.trim();
            let value = value.trim();

            if name == "header_key" {
                parse_hex_key(&mut keyset.header_key, name, value)?;
            } else if let Some(gen) = name.strip_prefix("key_area_key_application_") {
                let gen = usize::from_str_radix(gen, 16).map_err(|_| {
                    KeysetError::MalformedLine {
                        line: index + 1,
                        reason: format!("bad key generation suffix in \"{name}\""),
                    }
                })?;
                if gen < KEYGEN_COUNT {
                    parse_hex_key(&mut keyset.key_area_application_keys[gen], name, value)?;
                }
            }
            // Any other key name belongs to a concern outside this toolset.
        }

        Ok(keyset)
    }

    /// Header-protection key; missing if the key file never set it.
    pub fn header_key(&self) -> Result<&[u8; 0x20], KeysetError> {
        if self.header_key.iter().all(|&b| b == 0) {
            return Err(KeysetError::MissingKey("header_key".to_string()));
        }
        Ok(&self.header_key)
    }

    /// Application key-area key for a key generation (1-based, 1..=32).
    pub fn key_area_key(&self, keygeneration: u8) -> Result<&[u8; 0x10], KeysetError> {
        let index = usize::from(keygeneration).wrapping_sub(1);
        let key = self
            .key_area_application_keys
            .get(index)
            .ok_or_else(|| missing_kaek(keygeneration))?;
        if key.iter().all(|&b| b == 0) {
            return Err(missing_kaek(keygeneration));
        }
        Ok(key)
    }
}

fn missing_kaek(keygeneration: u8) -> KeysetError {
    KeysetError::MissingKey(format!(
        "key_area_key_application_{:02x}",
        keygeneration.wrapping_sub(1)
    ))
}

fn parse_hex_key(out: &mut [u8], name: &str, value: &str) -> Result<(), KeysetError> {
    if value.len() != out.len() * 2 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(KeysetError::InvalidHexValue(name.to_string()));
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16)
            .map_err(|_| KeysetError::InvalidHexValue(name.to_string()))?;
    }
    Ok(())
}
