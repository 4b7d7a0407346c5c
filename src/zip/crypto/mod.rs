//! Entry payload encryption.
//!
//! The set of ciphers is closed and chosen by header fields, so it is modelled
//! as the [`Encryption`] enum rather than a trait.

pub mod winzip_aes;
pub mod zipcrypto;

use crate::error::{Result, ZipError};

use super::structures::{AesStrength, CompressionMethod, ZipFileEntry, flags};

/// Cipher protecting one entry's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    ZipCrypto,
    Aes(AesStrength),
}

impl Encryption {
    /// Cipher for a new entry.
    pub fn for_writing(password: Option<&str>, use_aes: bool) -> Self {
        match password {
            None => Encryption::None,
            Some(_) if use_aes => Encryption::Aes(AesStrength::Aes256),
            Some(_) => Encryption::ZipCrypto,
        }
    }

    /// Cipher recorded in a central directory record.
    pub fn for_entry(entry: &ZipFileEntry) -> Result<Self> {
        if !entry.is_encrypted() {
            return Ok(Encryption::None);
        }
        if entry.flags & flags::STRONG_ENCRYPTION != 0 {
            return Err(ZipError::UnsupportedFeature("PKWARE strong encryption"));
        }
        match (entry.compression_method, entry.aes) {
            (CompressionMethod::Aes, Some(aes)) => Ok(Encryption::Aes(aes.strength)),
            (CompressionMethod::Aes, None) => Err(ZipError::malformed(format!(
                "{}: aes method without aes extra field",
                entry.file_name
            ))),
            _ => Ok(Encryption::ZipCrypto),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Encryption::None)
    }
}

/// Byte a ZipCrypto header must end with for this entry.
///
/// Streamed entries don't know their CRC up front and use the high byte of the
/// DOS time instead.
pub fn check_byte(entry_flags: u16, crc32: u32, last_mod_time: u16) -> u8 {
    if entry_flags & flags::DATA_DESCRIPTOR != 0 {
        (last_mod_time >> 8) as u8
    } else {
        (crc32 >> 24) as u8
    }
}

/// Encrypt an already compressed payload.
pub fn seal(encryption: Encryption, password: &str, data: Vec<u8>, check: u8) -> Result<Vec<u8>> {
    match encryption {
        Encryption::None => Ok(data),
        Encryption::ZipCrypto => zipcrypto::encrypt(password.as_bytes(), &data, check),
        Encryption::Aes(strength) => winzip_aes::encrypt(password.as_bytes(), strength, &data),
    }
}

/// Decrypt a payload read from the archive, yielding the compressed stream.
pub fn open(
    encryption: Encryption,
    password: Option<&str>,
    payload: Vec<u8>,
    check: u8,
    name: &str,
) -> Result<Vec<u8>> {
    let password = match (encryption, password) {
        (Encryption::None, _) => return Ok(payload),
        (_, Some(p)) => p,
        (_, None) => return Err(ZipError::PasswordRequired(name.to_owned())),
    };
    match encryption {
        Encryption::None => Ok(payload),
        Encryption::ZipCrypto => zipcrypto::decrypt(password.as_bytes(), &payload, check, name),
        Encryption::Aes(strength) => winzip_aes::decrypt(password.as_bytes(), strength, &payload, name),
    }
}
