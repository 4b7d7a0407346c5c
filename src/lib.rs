//! # zipkit
//!
//! A synchronous ZIP archive engine.
//!
//! This library lists and extracts entries from existing archives and creates
//! new ones. Unix permission bits survive the round trip through the external
//! attributes field, entries may be protected with ZipCrypto or WinZip AES, and
//! non-ASCII names are decoded from UTF-8 or the legacy CP437 code page.
//!
//! ## Features
//!
//! - List file entries in archive order, extract any one by name
//! - Create archives from in-memory data, files, folders and symlinks
//! - Preserve source file modes (e.g. the executable bit)
//! - STORED and DEFLATE compression, ZipCrypto and AES-256 encryption
//! - Concurrent extraction from one opened archive
//!
//! ## Example
//!
//! ```no_run
//! use zipkit::{ZipArchive, ZipWriter};
//!
//! fn main() -> zipkit::Result<()> {
//!     let mut writer = ZipWriter::create("out.zip")?;
//!     writer.write_bytes(b"Hello.", "hello.txt", 0, None, false);
//!     writer.write_file("run.sh", None);
//!     writer.close()?;
//!
//!     let archive = ZipArchive::open("out.zip")?;
//!     for name in archive.list_entries() {
//!         println!("{name}");
//!     }
//!     let data = archive.extract("hello.txt")?;
//!     assert_eq!(data, b"Hello.");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod io;
pub mod zip;

pub use error::{Result, ZipError};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use zip::{WriterOptions, ZipArchive, ZipFileEntry, ZipWriter};
