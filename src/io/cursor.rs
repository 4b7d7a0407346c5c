//! Little-endian cursors over in-memory records.
//!
//! Headers are fetched from the byte source in one piece and then decoded with
//! [`RecordReader`]; running off the end of a record is a format error, not an
//! I/O error, so truncation is reported as [`ZipError::MalformedArchive`].

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{Result, ZipError};

/// Bounded reader over one record with position tracking.
pub struct RecordReader<'a> {
    cursor: Cursor<&'a [u8]>,
    what: &'static str,
}

impl<'a> RecordReader<'a> {
    /// `what` names the record in truncation errors.
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        Self {
            cursor: Cursor::new(data),
            what,
        }
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    fn truncated(&self) -> ZipError {
        ZipError::malformed(format!("truncated {}", self.what))
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    /// Borrow the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.truncated());
        }
        let start = self.cursor.position() as usize;
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    /// Read a four-byte signature and compare it with `expected`.
    pub fn expect_signature(&mut self, expected: &[u8]) -> Result<()> {
        let sig = self.bytes(expected.len())?;
        if sig != expected {
            return Err(ZipError::malformed(format!("bad {} signature", self.what)));
        }
        Ok(())
    }
}

/// Growable little-endian record builder.
#[derive(Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, value);
        self.buf.extend_from_slice(&b);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, value);
        self.buf.extend_from_slice(&b);
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields_in_order() {
        let data = [0x50, 0x4b, 0x05, 0x06, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, b'h', b'i'];
        let mut r = RecordReader::new(&data, "test record");
        r.expect_signature(b"PK\x05\x06").unwrap();
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.u32().unwrap(), 0x1234_5678);
        assert_eq!(r.bytes(2).unwrap(), b"hi");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncation_is_malformed() {
        let data = [0x01];
        let mut r = RecordReader::new(&data, "central directory record");
        match r.u16() {
            Err(ZipError::MalformedArchive(msg)) => assert!(msg.contains("central directory")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(r.bytes(5).is_err());
    }

    #[test]
    fn writer_emits_little_endian() {
        let mut w = RecordWriter::default();
        w.u16(0x0201).u32(0x0605_0403).bytes(b"x");
        assert_eq!(w.len(), 7);
        assert_eq!(w.into_inner(), vec![1, 2, 3, 4, 5, 6, b'x']);
    }
}
