//! ZIP archive parsing, extraction and creation.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Central directory catalog and local header validation
//! - [`reader`]: Listing and single-entry extraction
//! - [`writer`]: Sequential archive creation
//! - [`names`]: Entry name encoding (UTF-8 flag, CP437 fallback, path escape checks)
//! - [`permissions`]: Unix mode <-> external attributes
//! - [`compression`] and [`crypto`]: payload codecs
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - STORED and DEFLATE compression
//! - PKWARE traditional encryption and WinZip AES (AE-1/AE-2)
//! - ZIP64 extensions on read
//! - Unix permissions in external attributes
//!
//! ## Limitations
//!
//! - No multi-disk archive support
//! - The writer does not emit ZIP64 records

pub mod compression;
pub mod crypto;
pub mod names;
pub mod parser;
pub mod permissions;
pub mod reader;
pub mod structures;
pub mod writer;

pub use parser::ZipParser;
pub use reader::ZipArchive;
pub use structures::*;
pub use writer::{WriterOptions, ZipWriter};
