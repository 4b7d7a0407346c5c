//! Error types for ZIP archive operations.
//!
//! Reading and lookup failures are reported through [`ZipError`] so callers can
//! tell a missing entry from corrupt data or a bad password. Writer appends
//! collapse these into a boolean (see [`ZipWriter`](crate::ZipWriter)), while
//! opening and closing a writer return the full error.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZipError>;

/// All failure modes of the archive engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ZipError {
    /// A directory record or header is structurally invalid.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// No file entry with the requested name exists.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The payload does not decode, or does not match its stored checksum.
    #[error("corrupt entry {name}: {reason}")]
    CorruptEntry { name: String, reason: String },

    /// The entry is encrypted and no password was supplied.
    #[error("entry {0} is encrypted and requires a password")]
    PasswordRequired(String),

    /// The password verifier did not match.
    #[error("wrong password for entry {0}")]
    WrongPassword(String),

    /// The AES authentication code did not match the ciphertext.
    #[error("authentication failed for entry {0}")]
    AuthFailure(String),

    /// An entry name escapes the extraction root or cannot be encoded.
    #[error("invalid entry name {name:?}: {reason}")]
    InvalidEntryName { name: String, reason: &'static str },

    /// Compression method other than store or deflate.
    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    /// A format feature this engine does not implement.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// A size or count does not fit the 32-bit archive fields.
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    /// The writer no longer accepts entries.
    #[error("archive is closed for writing")]
    ArchiveClosed,

    /// The underlying byte source or sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ZipError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ZipError::MalformedArchive(msg.into())
    }

    pub(crate) fn crc_mismatch(name: impl Into<String>, expected: u32, actual: u32) -> Self {
        ZipError::CorruptEntry {
            name: name.into(),
            reason: format!("crc32 {actual:#010x}, expected {expected:#010x}"),
        }
    }

    pub(crate) fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        ZipError::InvalidEntryName {
            name: name.into(),
            reason,
        }
    }

    /// True for the credential failures a caller may retry with another password.
    pub fn is_password_error(&self) -> bool {
        matches!(
            self,
            ZipError::PasswordRequired(_) | ZipError::WrongPassword(_) | ZipError::AuthFailure(_)
        )
    }
}
