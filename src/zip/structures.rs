use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, ZipError};
use crate::io::{RecordReader, RecordWriter};

use super::permissions;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    /// WinZip AES wrapper; the real method lives in the 0x9901 extra field.
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// General purpose bit flags
pub mod flags {
    pub const ENCRYPTED: u16 = 1 << 0;
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    /// Language encoding flag: name and comment are UTF-8.
    pub const UTF8: u16 = 1 << 11;
}

/// Extra field header ids
pub mod extra_id {
    pub const ZIP64: u16 = 0x0001;
    pub const UNICODE_PATH: u16 = 0x7075;
    pub const AES: u16 = 0x9901;
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, "end of central directory");
        r.expect_signature(Self::SIGNATURE)?;

        Ok(Self {
            disk_number: r.u16()?,
            disk_with_cd: r.u16()?,
            disk_entries: r.u16()?,
            total_entries: r.u16()?,
            cd_size: r.u32()?,
            cd_offset: r.u32()?,
            comment_len: r.u16()?,
        })
    }

    pub fn write_to(&self, w: &mut RecordWriter) {
        w.bytes(Self::SIGNATURE)
            .u16(self.disk_number)
            .u16(self.disk_with_cd)
            .u16(self.disk_entries)
            .u16(self.total_entries)
            .u32(self.cd_size)
            .u32(self.cd_offset)
            .u16(self.comment_len);
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, "zip64 end of central directory locator");
        r.expect_signature(Self::SIGNATURE)?;

        Ok(Self {
            disk_with_eocd64: r.u32()?,
            eocd64_offset: r.u64()?,
            total_disks: r.u32()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, "zip64 end of central directory");
        r.expect_signature(Self::SIGNATURE)?;

        Ok(Self {
            eocd64_size: r.u64()?,
            version_made_by: r.u16()?,
            version_needed: r.u16()?,
            disk_number: r.u32()?,
            disk_with_cd: r.u32()?,
            disk_entries: r.u64()?,
            total_entries: r.u64()?,
            cd_size: r.u64()?,
            cd_offset: r.u64()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Version needed to extract: 2.0 covers deflate and ZipCrypto, 5.1 covers AES.
pub const VERSION_NEEDED_DEFAULT: u16 = 20;
pub const VERSION_NEEDED_AES: u16 = 51;

/// Host system Unix (3) in the high byte, APPNOTE version 3.0 in the low byte.
pub const VERSION_MADE_BY_UNIX: u16 = (3 << 8) | 30;

/// AES key strength as stored in the 0x9901 extra field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl AesStrength {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AesStrength::Aes128),
            2 => Some(AesStrength::Aes192),
            3 => Some(AesStrength::Aes256),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            AesStrength::Aes128 => 1,
            AesStrength::Aes192 => 2,
            AesStrength::Aes256 => 3,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            AesStrength::Aes128 => 16,
            AesStrength::Aes192 => 24,
            AesStrength::Aes256 => 32,
        }
    }

    pub fn salt_len(&self) -> usize {
        self.key_len() / 2
    }
}

/// Contents of the WinZip AES extra field (0x9901)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    /// 1 = AE-1 (CRC stored), 2 = AE-2 (CRC zeroed)
    pub vendor_version: u16,
    pub strength: AesStrength,
    pub method: CompressionMethod,
}

impl AesExtra {
    pub const DATA_SIZE: u16 = 7;

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, "aes extra field");
        let vendor_version = r.u16()?;
        r.expect_signature(b"AE")?;
        let strength = r.bytes(1)?[0];
        let strength = AesStrength::from_u8(strength)
            .ok_or_else(|| ZipError::malformed("unknown aes strength"))?;
        let method = CompressionMethod::from_u16(r.u16()?);
        Ok(Self {
            vendor_version,
            strength,
            method,
        })
    }

    pub fn write_to(&self, w: &mut RecordWriter) {
        w.u16(extra_id::AES)
            .u16(Self::DATA_SIZE)
            .u16(self.vendor_version)
            .bytes(b"AE")
            .bytes(&[self.strength.as_u8()])
            .u16(self.method.as_u16());
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    /// Name bytes exactly as stored in the central directory.
    pub raw_name: Vec<u8>,
    pub version_made_by: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub external_attributes: u32,
    pub is_directory: bool,
    pub aes: Option<AesExtra>,
    /// Why the name was rejected (absolute, `..`, ...). Such entries stay in
    /// the catalog but are never listed or extracted.
    pub name_error: Option<&'static str>,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & flags::ENCRYPTED != 0
    }

    pub fn has_utf8_name(&self) -> bool {
        self.flags & flags::UTF8 != 0
    }

    /// Compression method of the payload once any AES wrapper is removed.
    pub fn effective_method(&self) -> CompressionMethod {
        match self.aes {
            Some(aes) => aes.method,
            None => self.compression_method,
        }
    }

    /// Full Unix mode (type and permission bits), if the writer recorded one.
    pub fn unix_mode(&self) -> Option<u32> {
        permissions::unix_mode(self.version_made_by, self.external_attributes)
    }

    /// Mode to give an extracted copy: the stored Unix mode, else a default
    /// implied by the MS-DOS attributes (0644 files, 0755 folders).
    pub fn mode(&self) -> u32 {
        match self.unix_mode() {
            Some(mode) => mode,
            None if self.is_directory => permissions::S_IFDIR | 0o755,
            None => permissions::msdos_mode(self.external_attributes),
        }
    }

    /// Fail with [`ZipError::InvalidEntryName`] if the name was rejected at parse time.
    pub fn check_name(&self) -> Result<()> {
        match self.name_error {
            Some(reason) => Err(ZipError::invalid_name(&self.file_name, reason)),
            None => Ok(()),
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.unix_mode()
            .is_some_and(|mode| mode & permissions::S_IFMT == permissions::S_IFLNK)
    }

    /// A regular file entity: neither a directory nor a symbolic link.
    pub fn is_file(&self) -> bool {
        !self.is_directory && !self.is_symlink()
    }
}

/// MS-DOS packed date and time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    pub fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        if year < 1980 {
            return Self::EPOCH;
        }
        let year = year.min(1980 + 127);
        Self {
            time: ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2),
            date: ((year - 1980) << 9) | ((month as u16) << 5) | day as u16,
        }
    }

    /// Convert a system time, taken as UTC.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(_) => return Self::EPOCH,
        };
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        if !(1980..=2107).contains(&year) {
            return Self::EPOCH;
        }
        Self::from_parts(
            year as u16,
            month,
            day,
            (rem / 3600) as u8,
            ((rem % 3600) / 60) as u8,
            (rem % 60) as u8,
        )
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry_with(date: u16, time: u16) -> ZipFileEntry {
        ZipFileEntry {
            file_name: "a".into(),
            raw_name: b"a".to_vec(),
            version_made_by: VERSION_MADE_BY_UNIX,
            flags: 0,
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: time,
            last_mod_date: date,
            external_attributes: 0,
            is_directory: false,
            aes: None,
            name_error: None,
        }
    }

    #[test]
    fn mode_falls_back_to_dos_attributes() {
        let mut entry = entry_with(0x21, 0);
        assert_eq!(entry.mode(), 0o100644);

        entry.version_made_by = 20;
        entry.external_attributes = 0x01;
        assert_eq!(entry.mode(), 0o100444);

        entry.external_attributes = (0o100755 << 16) | 0x20;
        entry.version_made_by = VERSION_MADE_BY_UNIX;
        assert_eq!(entry.mode(), 0o100755);

        entry.external_attributes = 0;
        entry.is_directory = true;
        assert_eq!(entry.mode(), 0o040755);
    }

    #[test]
    fn dos_timestamp_from_unix_time() {
        // 2024-02-29 13:45:30 UTC
        let t = UNIX_EPOCH + Duration::from_secs(1_709_214_330);
        let dos = DosDateTime::from_system_time(t);
        let entry = entry_with(dos.date, dos.time);
        assert_eq!(entry.mod_date(), (2024, 2, 29));
        assert_eq!(entry.mod_time(), (13, 45, 30));
    }

    #[test]
    fn dos_timestamp_clamps_before_1980() {
        let dos = DosDateTime::from_system_time(UNIX_EPOCH);
        assert_eq!(dos, DosDateTime::EPOCH);
        assert_eq!(entry_with(dos.date, dos.time).mod_date(), (1980, 1, 1));
    }

    #[test]
    fn aes_extra_field_layout() {
        let extra = AesExtra {
            vendor_version: 1,
            strength: AesStrength::Aes256,
            method: CompressionMethod::Deflate,
        };
        let mut w = RecordWriter::default();
        extra.write_to(&mut w);
        let bytes = w.into_inner();
        assert_eq!(&bytes[..4], &[0x01, 0x99, 0x07, 0x00]);
        assert_eq!(AesExtra::parse(&bytes[4..]).unwrap(), extra);
    }

    #[test]
    fn method_ids_round_trip() {
        for id in [0u16, 8, 99, 12] {
            assert_eq!(CompressionMethod::from_u16(id).as_u16(), id);
        }
    }
}
