//! CNMT content-metadata record set.
//!
//! One record per generated container, bound by whole-file hash. The meta
//! container wraps this blob in a single-file partition archive.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use num_enum::IntoPrimitive;

/// Metadata type tag for applications.
pub const META_TYPE_APPLICATION: u8 = 0x80;

/// Size of the application extended header.
pub const EXTENDED_HEADER_SIZE: u16 = 0x10;

/// Serialized size of one content record.
pub const CONTENT_RECORD_SIZE: usize = 0x38;

/// Content record type tags, in the order records are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive)]
#[repr(u8)]
pub enum ContentRecordType {
    Program = 0x1,
    Control = 0x3,
    HtmlDocument = 0x4,
    LegalInformation = 0x5,
}

/// One finished container, as recorded in the metadata.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    /// Whole-file SHA-256 of the container.
    pub hash: [u8; 0x20],
    /// First 16 bytes of the hash; also the container's filename.
    pub content_id: [u8; 0x10],
    /// Container size; stored as 6 bytes on disk.
    pub size: u64,
    pub record_type: ContentRecordType,
}

/// The metadata record set for one title.
#[derive(Debug, Clone)]
pub struct Cnmt {
    pub title_id: u64,
    pub title_version: u32,
    pub records: Vec<ContentRecord>,
}

impl Cnmt {
    pub fn new(title_id: u64) -> Self {
        Self {
            title_id,
            title_version: 0,
            records: Vec::new(),
        }
    }

    pub fn push_record(&mut self, record: ContentRecord) {
        self.records.push(record);
    }

    /// Serialize the record set: header, application extended header,
    /// records in type order, then the reserved trailing block.
    pub fn write_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.record_type);

        writer.write_u64::<LittleEndian>(self.title_id)?;
        writer.write_u32::<LittleEndian>(self.title_version)?;
        writer.write_u8(META_TYPE_APPLICATION)?;
        writer.write_u8(0)?;
        writer.write_u16::<LittleEndian>(EXTENDED_HEADER_SIZE)?;
        writer.write_u16::<LittleEndian>(records.len() as u16)?;
        writer.write_u16::<LittleEndian>(0)?; // meta entry count
        writer.write_all(&[0u8; 0xC])?;

        // Application extended header.
        writer.write_u64::<LittleEndian>(self.title_id + 0x800)?; // patch title id
        writer.write_u32::<LittleEndian>(0)?; // required system version
        writer.write_u32::<LittleEndian>(0)?;

        for record in &records {
            writer.write_all(&record.hash)?;
            writer.write_all(&record.content_id)?;
            writer.write_all(&record.size.to_le_bytes()[..6])?;
            writer.write_u8(record.record_type.into())?;
            writer.write_u8(0)?; // id offset
        }

        // Reserved digest block; meaning unknown upstream, kept zero.
        writer.write_all(&[0u8; 0x20])?;
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_into(&mut out)
            .expect("writing to a Vec cannot fail");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: ContentRecordType, fill: u8) -> ContentRecord {
        ContentRecord {
            hash: [fill; 0x20],
            content_id: [fill; 0x10],
            size: 0x1234,
            record_type,
        }
    }

    #[test]
    fn two_records_without_manuals() {
        let mut cnmt = Cnmt::new(0x0100_0000_0000_2000);
        cnmt.push_record(record(ContentRecordType::Program, 1));
        cnmt.push_record(record(ContentRecordType::Control, 2));
        let bytes = cnmt.to_vec();

        // header + extended header + 2 records + reserved block
        assert_eq!(bytes.len(), 0x20 + 0x10 + 2 * CONTENT_RECORD_SIZE + 0x20);
        // entry count at +0x12
        assert_eq!(u16::from_le_bytes([bytes[0x12], bytes[0x13]]), 2);
    }

    #[test]
    fn manual_record_raises_entry_count() {
        let mut cnmt = Cnmt::new(0x0100_0000_0000_2000);
        cnmt.push_record(record(ContentRecordType::Program, 1));
        cnmt.push_record(record(ContentRecordType::Control, 2));
        cnmt.push_record(record(ContentRecordType::HtmlDocument, 3));
        let bytes = cnmt.to_vec();

        assert_eq!(bytes.len(), 0x20 + 0x10 + 3 * CONTENT_RECORD_SIZE + 0x20);
        assert_eq!(u16::from_le_bytes([bytes[0x12], bytes[0x13]]), 3);
    }

    #[test]
    fn records_are_emitted_in_type_order() {
        let mut cnmt = Cnmt::new(1);
        cnmt.push_record(record(ContentRecordType::Control, 2));
        cnmt.push_record(record(ContentRecordType::Program, 1));
        let bytes = cnmt.to_vec();

        let first_type = bytes[0x30 + 0x36];
        let second_type = bytes[0x30 + CONTENT_RECORD_SIZE + 0x36];
        assert_eq!(first_type, u8::from(ContentRecordType::Program));
        assert_eq!(second_type, u8::from(ContentRecordType::Control));
    }

    #[test]
    fn patch_title_id_offsets_the_base_id() {
        let cnmt = Cnmt::new(0x0100_0000_0000_2000);
        let bytes = cnmt.to_vec();
        let patch_id = u64::from_le_bytes(bytes[0x20..0x28].try_into().unwrap());
        assert_eq!(patch_id, 0x0100_0000_0000_2800);
    }

    #[test]
    fn size_field_is_six_bytes() {
        let mut cnmt = Cnmt::new(1);
        cnmt.push_record(ContentRecord {
            hash: [0; 0x20],
            content_id: [0; 0x10],
            size: 0x0000_AABB_CCDD_EEFF,
            record_type: ContentRecordType::Program,
        });
        let bytes = cnmt.to_vec();
        let size_bytes = &bytes[0x30 + 0x30..0x30 + 0x36];
        assert_eq!(size_bytes, &[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn reserved_tail_stays_zero() {
        let cnmt = Cnmt::new(1);
        let bytes = cnmt.to_vec();
        assert!(bytes[bytes.len() - 0x20..].iter().all(|&b| b == 0));
    }
}
