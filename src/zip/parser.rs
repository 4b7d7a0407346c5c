//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Entries are returned in central directory order, which is the order the
//! writer appended them and not necessarily alphabetical.

use std::io;
use std::sync::Arc;

use crate::error::{Result, ZipError};
use crate::io::{ReadAt, RecordReader};

use super::names;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Everything the central directory says about an archive.
#[derive(Debug)]
pub struct Catalog {
    pub entries: Vec<ZipFileEntry>,
    pub comment: String,
}

/// Low-level ZIP file parser.
///
/// Reads through a shared [`ReadAt`] source with explicit offsets, so one
/// parser can serve several threads.
#[derive(Debug)]
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Read `len` bytes at `offset`; a range past the end is a format error.
    fn read_record(&self, offset: u64, len: usize, what: &str) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(ZipError::malformed(format!(
                "{what} at offset {offset} extends past end of archive"
            )));
        }
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact_at(offset, &mut buf)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    ZipError::malformed(format!("{what} at offset {offset} is truncated"))
                }
                _ => ZipError::Io(e),
            })?;
        Ok(buf)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset. The record may be followed by a
    /// comment of up to 65535 bytes, so the tail is scanned backwards for the
    /// signature.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(ZipError::malformed("too small to be a zip archive"));
        }

        // Optimization: First try the simple case where there's no comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let buf = self.read_record(offset, EndOfCentralDirectory::SIZE, "end of central directory")?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;
        let buf = self.read_record(search_start, search_size as usize, "archive tail")?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must account for exactly the remaining bytes.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(ZipError::malformed("end of central directory signature not found"))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| ZipError::malformed("missing zip64 end of central directory locator"))?;
        let locator_buf =
            self.read_record(locator_offset, Zip64EOCDLocator::SIZE, "zip64 locator")?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let eocd64_buf = self.read_record(
            locator.eocd64_offset,
            Zip64EOCD::MIN_SIZE,
            "zip64 end of central directory",
        )?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Parse the whole central directory.
    pub fn read_catalog(&self) -> Result<Catalog> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
            return Err(ZipError::UnsupportedFeature("multi-disk archives"));
        }

        // Get Central Directory info, using ZIP64 if needed
        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset
            .checked_add(cd_size)
            .is_none_or(|end| end > eocd_offset)
        {
            return Err(ZipError::malformed(format!(
                "central directory ({cd_size} bytes at {cd_offset}) out of bounds"
            )));
        }
        if total_entries > cd_size / CDFH_MIN_SIZE as u64 {
            return Err(ZipError::malformed(format!(
                "{total_entries} entries cannot fit in a {cd_size} byte central directory"
            )));
        }

        let comment = self.read_comment(&eocd, eocd_offset)?;

        let cd_data = self.read_record(cd_offset, cd_size as usize, "central directory")?;
        let mut cursor = RecordReader::new(&cd_data, "central directory record");
        let mut entries = Vec::with_capacity(total_entries as usize);
        for _ in 0..total_entries {
            entries.push(self.parse_cdfh(&mut cursor)?);
        }

        log::debug!(
            "parsed {} central directory entries at offset {}",
            entries.len(),
            cd_offset
        );

        Ok(Catalog { entries, comment })
    }

    fn read_comment(&self, eocd: &EndOfCentralDirectory, eocd_offset: u64) -> Result<String> {
        if eocd.comment_len == 0 {
            return Ok(String::new());
        }
        let raw = self.read_record(
            eocd_offset + EndOfCentralDirectory::SIZE as u64,
            eocd.comment_len as usize,
            "archive comment",
        )?;
        Ok(match String::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => names::decode_cp437(e.as_bytes()),
        })
    }

    /// Parse a Central Directory File Header from a cursor.
    fn parse_cdfh(&self, cursor: &mut RecordReader<'_>) -> Result<ZipFileEntry> {
        // Read and verify the signature (PK\x01\x02)
        cursor.expect_signature(CDFH_SIGNATURE)?;

        let version_made_by = cursor.u16()?;
        let _version_needed = cursor.u16()?;
        let entry_flags = cursor.u16()?;
        let compression_method = cursor.u16()?;
        let last_mod_time = cursor.u16()?;
        let last_mod_date = cursor.u16()?;
        let crc32 = cursor.u32()?;
        let mut compressed_size = cursor.u32()? as u64;
        let mut uncompressed_size = cursor.u32()? as u64;
        let file_name_length = cursor.u16()?;
        let extra_field_length = cursor.u16()?;
        let file_comment_length = cursor.u16()?;
        let _disk_number_start = cursor.u16()?;
        let _internal_attrs = cursor.u16()?;
        let external_attributes = cursor.u32()?;
        let mut lfh_offset = cursor.u32()? as u64;

        let raw_name = cursor.bytes(file_name_length as usize)?.to_vec();
        let extra = cursor.bytes(extra_field_length as usize)?;
        cursor.skip(file_comment_length as usize)?;

        let mut unicode_name = None;
        let mut aes = None;
        let mut fields = RecordReader::new(extra, "extra field");
        while fields.remaining() >= 4 {
            let header_id = fields.u16()?;
            let field_size = fields.u16()? as usize;
            let data = fields.bytes(field_size)?;

            match header_id {
                extra_id::ZIP64 => {
                    // Fields are present only if the header field is saturated
                    let mut z = RecordReader::new(data, "zip64 extra field");
                    if uncompressed_size == 0xFFFFFFFF {
                        uncompressed_size = z.u64()?;
                    }
                    if compressed_size == 0xFFFFFFFF {
                        compressed_size = z.u64()?;
                    }
                    if lfh_offset == 0xFFFFFFFF {
                        lfh_offset = z.u64()?;
                    }
                }
                extra_id::UNICODE_PATH => {
                    unicode_name = parse_unicode_path(data, &raw_name);
                }
                extra_id::AES => {
                    aes = Some(AesExtra::parse(data)?);
                }
                _ => {}
            }
        }

        let decoded = match unicode_name {
            Some(name) => names::validate_name(&name).map(|()| name),
            None => names::decode_name(&raw_name, entry_flags),
        };
        // A bad name disables its own entry, not the whole archive.
        let (file_name, name_error) = match decoded {
            Ok(name) => (name, None),
            Err(ZipError::InvalidEntryName { name, reason }) => {
                log::warn!("rejecting entry name {name:?}: {reason}");
                (name, Some(reason))
            }
            Err(e) => return Err(e),
        };

        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        Ok(ZipFileEntry {
            file_name,
            raw_name,
            version_made_by,
            flags: entry_flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            external_attributes,
            is_directory,
            aes,
            name_error,
        })
    }

    /// Read and validate the Local File Header of `entry`.
    ///
    /// The local header must agree with the central directory on the
    /// compression method and, unless a data descriptor follows the payload,
    /// on the CRC-32. Returns where the payload begins.
    pub fn read_local_header(&self, entry: &ZipFileEntry) -> Result<u64> {
        let lfh_buf = self.read_record(entry.lfh_offset, LFH_SIZE, "local file header")?;

        let mut r = RecordReader::new(&lfh_buf, "local file header");
        r.expect_signature(LFH_SIGNATURE)?;
        let _version_needed = r.u16()?;
        let local_flags = r.u16()?;
        let compression_method = CompressionMethod::from_u16(r.u16()?);
        let _last_mod_time = r.u16()?;
        let _last_mod_date = r.u16()?;
        let crc32 = r.u32()?;
        let _compressed_size = r.u32()?;
        let _uncompressed_size = r.u32()?;
        let file_name_length = r.u16()? as u64;
        let extra_field_length = r.u16()? as u64;

        if compression_method != entry.compression_method {
            return Err(ZipError::malformed(format!(
                "{}: local header method {} disagrees with central directory method {}",
                entry.file_name,
                compression_method.as_u16(),
                entry.compression_method.as_u16()
            )));
        }
        if local_flags & flags::DATA_DESCRIPTOR == 0 && crc32 != entry.crc32 {
            return Err(ZipError::malformed(format!(
                "{}: local header crc32 {:#010x} disagrees with central directory {:#010x}",
                entry.file_name, crc32, entry.crc32
            )));
        }

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > self.size)
        {
            return Err(ZipError::malformed(format!(
                "{}: payload extends past end of archive",
                entry.file_name
            )));
        }

        Ok(data_offset)
    }

    /// Read the raw (possibly encrypted, compressed) payload of `entry`.
    pub fn read_payload(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let data_offset = self.read_local_header(entry)?;
        self.read_record(data_offset, entry.compressed_size as usize, "entry payload")
    }
}

/// Info-ZIP Unicode Path field: version 1, CRC-32 of the raw name, UTF-8 name.
///
/// Ignored when the CRC shows the raw name was changed after the field was written.
fn parse_unicode_path(data: &[u8], raw_name: &[u8]) -> Option<String> {
    let mut r = RecordReader::new(data, "unicode path extra field");
    let version = r.bytes(1).ok()?[0];
    let name_crc = r.u32().ok()?;
    if version != 1 || name_crc != crc32fast::hash(raw_name) {
        return None;
    }
    let rest = r.bytes(r.remaining()).ok()?;
    String::from_utf8(rest.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryReader, RecordWriter};

    fn parser(bytes: Vec<u8>) -> ZipParser<MemoryReader> {
        ZipParser::new(Arc::new(MemoryReader::new(bytes)))
    }

    fn eocd(entries: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) -> Vec<u8> {
        let mut w = RecordWriter::default();
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len: comment.len() as u16,
        }
        .write_to(&mut w);
        w.bytes(comment);
        w.into_inner()
    }

    #[test]
    fn empty_archive_has_empty_catalog() {
        let catalog = parser(eocd(0, 0, 0, b"")).read_catalog().unwrap();
        assert!(catalog.entries.is_empty());
        assert_eq!(catalog.comment, "");
    }

    #[test]
    fn eocd_found_behind_comment() {
        let catalog = parser(eocd(0, 0, 0, b"archive comment"))
            .read_catalog()
            .unwrap();
        assert_eq!(catalog.comment, "archive comment");
    }

    #[test]
    fn missing_signature_is_malformed() {
        let err = parser(vec![0u8; 64]).read_catalog().unwrap_err();
        assert!(matches!(err, ZipError::MalformedArchive(_)));
        let err = parser(b"PK".to_vec()).read_catalog().unwrap_err();
        assert!(matches!(err, ZipError::MalformedArchive(_)));
    }

    #[test]
    fn directory_offset_out_of_bounds_is_malformed() {
        let err = parser(eocd(1, 46, 1000, b"")).read_catalog().unwrap_err();
        assert!(matches!(err, ZipError::MalformedArchive(_)));
    }

    #[test]
    fn bad_directory_signature_is_malformed() {
        let mut bytes = vec![0u8; 46];
        bytes[..4].copy_from_slice(b"PK\x09\x09");
        bytes.extend(eocd(1, 46, 0, b""));
        match parser(bytes).read_catalog() {
            Err(ZipError::MalformedArchive(msg)) => assert!(msg.contains("signature")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("parsed a bad signature"),
        }
    }

    #[test]
    fn zip64_records_redirect_sizes_and_offsets() {
        let data = b"hi";
        let crc = crc32fast::hash(data);
        let mut w = RecordWriter::default();
        w.bytes(LFH_SIGNATURE)
            .u16(45)
            .u16(0)
            .u16(0)
            .u16(0)
            .u16(0x21)
            .u32(crc)
            .u32(2)
            .u32(2)
            .u16(5)
            .u16(0)
            .bytes(b"a.txt")
            .bytes(data);
        let cd_offset = w.len() as u64;

        w.bytes(CDFH_SIGNATURE)
            .u16(VERSION_MADE_BY_UNIX)
            .u16(45)
            .u16(0)
            .u16(0)
            .u16(0)
            .u16(0x21)
            .u32(crc)
            .u32(0xFFFFFFFF)
            .u32(0xFFFFFFFF)
            .u16(5)
            .u16(28)
            .u16(0)
            .u16(0)
            .u16(0)
            .u32(0)
            .u32(0xFFFFFFFF)
            .bytes(b"a.txt")
            .u16(extra_id::ZIP64)
            .u16(24)
            .bytes(&2u64.to_le_bytes())
            .bytes(&2u64.to_le_bytes())
            .bytes(&0u64.to_le_bytes());
        let cd_size = w.len() as u64 - cd_offset;

        let eocd64_offset = w.len() as u64;
        w.bytes(Zip64EOCD::SIGNATURE)
            .bytes(&44u64.to_le_bytes())
            .u16(45)
            .u16(45)
            .u32(0)
            .u32(0)
            .bytes(&1u64.to_le_bytes())
            .bytes(&1u64.to_le_bytes())
            .bytes(&cd_size.to_le_bytes())
            .bytes(&cd_offset.to_le_bytes());
        w.bytes(Zip64EOCDLocator::SIGNATURE)
            .u32(0)
            .bytes(&eocd64_offset.to_le_bytes())
            .u32(1);
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 0xFFFF,
            total_entries: 0xFFFF,
            cd_size: 0xFFFFFFFF,
            cd_offset: 0xFFFFFFFF,
            comment_len: 0,
        }
        .write_to(&mut w);

        let parser = parser(w.into_inner());
        let catalog = parser.read_catalog().unwrap();
        assert_eq!(catalog.entries.len(), 1);
        let entry = &catalog.entries[0];
        assert_eq!(entry.file_name, "a.txt");
        assert_eq!(entry.compressed_size, 2);
        assert_eq!(entry.uncompressed_size, 2);
        assert_eq!(entry.lfh_offset, 0);
        assert_eq!(parser.read_payload(entry).unwrap(), data);
    }

    #[test]
    fn unicode_path_field_requires_matching_crc() {
        let raw = b"caf\x82.txt";
        let mut data = vec![1u8];
        data.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
        data.extend_from_slice("café.txt".as_bytes());
        assert_eq!(parse_unicode_path(&data, raw).as_deref(), Some("café.txt"));
        assert_eq!(parse_unicode_path(&data, b"other"), None);
    }
}
