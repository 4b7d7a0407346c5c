use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, ZipError};
use crate::io::{LocalFileReader, MemoryReader, ReadAt};

use super::compression;
use super::crypto::{self, Encryption};
use super::parser::ZipParser;
use super::structures::ZipFileEntry;

/// Read-only view of an archive: listing and single-entry extraction.
///
/// The catalog is parsed once at open. Every extraction reads the local header
/// and payload afresh through positioned reads, so `&self` methods may run
/// concurrently from several threads.
#[derive(Debug)]
pub struct ZipArchive<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
    comment: String,
}

impl ZipArchive<LocalFileReader> {
    /// Open an archive on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let reader = LocalFileReader::new(path.as_ref())?;
        Self::new(Arc::new(reader))
    }
}

impl ZipArchive<MemoryReader> {
    /// Open an archive held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(Arc::new(MemoryReader::new(data)))
    }
}

impl<R: ReadAt> ZipArchive<R> {
    pub fn new(reader: Arc<R>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let catalog = parser.read_catalog()?;
        Ok(Self {
            parser,
            entries: catalog.entries,
            comment: catalog.comment,
        })
    }

    /// Every central directory record, in archive order.
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// Names of the file entities in archive order.
    ///
    /// Directories, symbolic links and entries with rejected names are skipped.
    pub fn list_entries(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_file() && e.name_error.is_none())
            .map(|e| e.file_name.clone())
            .collect()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First file entity named exactly `name`.
    pub fn find(&self, name: &str) -> Option<&ZipFileEntry> {
        self.entries
            .iter()
            .find(|e| e.is_file() && e.file_name == name)
    }

    /// Extract an unencrypted entry.
    pub fn extract(&self, name: &str) -> Result<Vec<u8>> {
        self.extract_with_password(name, None)
    }

    pub fn extract_with_password(&self, name: &str, password: Option<&str>) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_owned()))?;
        self.extract_entry(entry, password)
    }

    /// Decrypt, decompress and verify one entry.
    pub fn extract_entry(&self, entry: &ZipFileEntry, password: Option<&str>) -> Result<Vec<u8>> {
        entry.check_name()?;
        let encryption = Encryption::for_entry(entry)?;
        let payload = self.parser.read_payload(entry)?;

        let check = crypto::check_byte(entry.flags, entry.crc32, entry.last_mod_time);
        let compressed = crypto::open(encryption, password, payload, check, &entry.file_name)?;

        let data = compression::decompress(
            entry.effective_method(),
            &compressed,
            entry.uncompressed_size,
            &entry.file_name,
        )?;

        if data.len() as u64 != entry.uncompressed_size {
            return Err(ZipError::CorruptEntry {
                name: entry.file_name.clone(),
                reason: format!(
                    "decoded {} bytes, expected {}",
                    data.len(),
                    entry.uncompressed_size
                ),
            });
        }

        // AE-2 zeroes the CRC and relies on the authentication code instead.
        let crc_stored = !matches!(entry.aes, Some(aes) if aes.vendor_version == 2);
        if crc_stored {
            let actual = crc32fast::hash(&data);
            if actual != entry.crc32 {
                return Err(ZipError::crc_mismatch(&entry.file_name, entry.crc32, actual));
            }
        }

        Ok(data)
    }

    pub fn is_password_protected(&self) -> bool {
        self.entries.iter().any(|e| e.is_encrypted())
    }

    /// Check `password` against the first encrypted file entity.
    ///
    /// Archives without encrypted entries accept any password. ZipCrypto's one
    /// byte verifier lets about 1 in 256 wrong passwords through, so garbage
    /// output after decryption also counts as a mismatch.
    pub fn is_password_valid(&self, password: &str) -> Result<bool> {
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.is_file() && e.is_encrypted() && e.name_error.is_none())
        else {
            return Ok(true);
        };
        match self.extract_entry(entry, Some(password)) {
            Ok(_) => Ok(true),
            Err(e) if e.is_password_error() => Ok(false),
            Err(ZipError::CorruptEntry { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Total uncompressed size of all entries.
    pub fn payload_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.uncompressed_size)
            .fold(0u64, u64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WriterOptions, ZipWriter};

    #[test]
    fn payload_size_saturates_on_huge_declared_sizes() {
        let mut w = ZipWriter::new(Vec::new(), WriterOptions::default());
        assert!(w.write_bytes(b"a", "a.txt", 0, None, false));
        assert!(w.write_bytes(b"bb", "b.txt", 0, None, false));
        let mut archive = ZipArchive::from_bytes(w.close().unwrap()).unwrap();
        assert_eq!(archive.payload_size(), 3);

        for entry in &mut archive.entries {
            entry.uncompressed_size = u64::MAX - 1;
        }
        assert_eq!(archive.payload_size(), u64::MAX);
    }
}
