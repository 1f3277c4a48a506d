//! Addressed archive container.
//!
//! A signature, a record count and an absolute-address table in front of
//! colour-keyed, length-prefixed payloads. The sprite archive is the only
//! user; payloads are opaque at this level.

mod format;
mod reader;
mod writer;

pub use format::{
    address_slot, header_size, max_count, COLOR_KEY, MAX_COMPACT_COUNT, MAX_PAYLOAD_SIZE,
    RECORD_PREFIX_SIZE,
};
pub use reader::AddressedReader;
pub use writer::AddressedWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use crate::util::Error;

    fn build(extended: bool, records: &[Option<&[u8]>]) -> Vec<u8> {
        let mut writer =
            AddressedWriter::new(Cursor::new(Vec::new()), 0x1234_5678, records.len() as u32, extended).unwrap();
        for r in records {
            writer.write_record(*r).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn open(bytes: &[u8], signature: u32, extended: bool) -> crate::util::Result<AddressedReader> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        AddressedReader::open(file.path(), signature, extended)
    }

    #[test]
    fn test_layout_compact() {
        let bytes = build(false, &[Some(&[1, 2, 3]), None]);
        // signature, u16 count, two addresses
        assert_eq!(&bytes[0..4], &0x1234_5678u32.to_le_bytes());
        assert_eq!(&bytes[4..6], &2u16.to_le_bytes());
        assert_eq!(&bytes[6..10], &14u32.to_le_bytes());
        assert_eq!(&bytes[10..14], &0u32.to_le_bytes());
        assert_eq!(&bytes[14..17], &COLOR_KEY);
        assert_eq!(&bytes[17..19], &3u16.to_le_bytes());
        assert_eq!(&bytes[19..], &[1, 2, 3]);
    }

    #[test]
    fn test_read_back_both_backends() {
        let bytes = build(true, &[None, Some(b"abc"), Some(b"")]);
        for use_mmap in [true, false] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(&bytes).unwrap();
            file.flush().unwrap();

            let reader = AddressedReader::open_opts(file.path(), 0x1234_5678, true, use_mmap).unwrap();
            assert_eq!(reader.count(), 3);
            assert!(reader.is_extended());
            assert_eq!(reader.read_record(1).unwrap(), None);
            assert_eq!(reader.read_record(2).unwrap().as_deref(), Some(&b"abc"[..]));
            assert_eq!(reader.read_record(3).unwrap().as_deref(), Some(&b""[..]));
            assert!(matches!(reader.read_record(4), Err(Error::IndexOutOfRange { id: 4, count: 3 })));
            assert_eq!(reader.read_record(0).unwrap(), None);
            assert!(matches!(reader.address(0), Err(Error::IndexOutOfRange { .. })));
        }
    }

    #[test]
    fn test_id_zero_is_empty() {
        let reader = open(&build(false, &[Some(b"x")]), 0x1234_5678, false).unwrap();
        assert_eq!(reader.count(), 1);
        assert_eq!(reader.read_record(0).unwrap(), None);
        assert_eq!(reader.read_record(1).unwrap().as_deref(), Some(&b"x"[..]));
        assert!(matches!(reader.read_record(2), Err(Error::IndexOutOfRange { id: 2, count: 1 })));
    }

    #[test]
    fn test_signature_mismatch() {
        let bytes = build(false, &[None]);
        let err = open(&bytes, 0xDEAD_BEEF, false).unwrap_err();
        assert!(matches!(
            err,
            Error::SignatureMismatch { expected: 0xDEAD_BEEF, actual: 0x1234_5678 }
        ));
    }

    #[test]
    fn test_truncated_table() {
        let mut bytes = build(false, &[None, None, None]);
        bytes.truncate(10);
        assert!(matches!(open(&bytes, 0x1234_5678, false), Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_address_past_end() {
        let mut bytes = build(false, &[Some(&[9; 8])]);
        bytes[6..10].copy_from_slice(&1000u32.to_le_bytes());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        let reader = AddressedReader::open(file.path(), 0x1234_5678, false).unwrap();
        assert!(matches!(reader.read_record(1), Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_writer_limits() {
        assert!(matches!(
            AddressedWriter::new(Cursor::new(Vec::new()), 1, 0x1_0000, false),
            Err(Error::CapacityExceeded { .. })
        ));

        let mut writer = AddressedWriter::new(Cursor::new(Vec::new()), 1, 1, false).unwrap();
        assert!(matches!(
            writer.write_raw(&vec![0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(Error::CapacityExceeded { .. })
        ));
        writer.write_empty().unwrap();
        assert!(writer.write_empty().is_err());
    }

    #[test]
    fn test_short_write_rejected() {
        let mut writer = AddressedWriter::new(Cursor::new(Vec::new()), 1, 2, false).unwrap();
        writer.write_empty().unwrap();
        assert!(matches!(writer.finish(), Err(Error::InvalidStructure(_))));
    }
}
