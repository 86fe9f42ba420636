//! SHA-256 helpers for content hashing.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Chunk size for streaming digests. Large section files are never held in
/// memory whole; reads proceed in bounded chunks.
const STREAM_CHUNK: usize = 0x10_0000;

/// Digest a byte slice.
pub fn sha256(data: &[u8]) -> [u8; 0x20] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest everything a reader yields, in bounded chunks.
pub fn sha256_stream<R: Read>(reader: &mut R) -> io::Result<[u8; 0x20]> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Render a digest prefix as lowercase hex, e.g. for content-id filenames.
pub fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stream_matches_one_shot() {
        let data = vec![0xA7u8; STREAM_CHUNK + 123];
        let streamed = sha256_stream(&mut Cursor::new(&data)).unwrap();
        assert_eq!(streamed, sha256(&data));
    }

    #[test]
    fn known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex_string(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_string_formats_prefix() {
        assert_eq!(hex_string(&[0x00, 0xFF, 0x1b]), "00ff1b");
    }
}
