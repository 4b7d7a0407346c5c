use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, ZipError};
use crate::io::RecordWriter;

use super::compression::{self, DEFAULT_LEVEL};
use super::crypto::{self, Encryption};
use super::names;
use super::permissions::{self, EntryKind};
use super::structures::*;

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterOptions {
    compression_level: u32,
    use_aes: bool,
    file_mode: u32,
    dir_mode: u32,
    comment: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
            use_aes: true,
            file_mode: 0o644,
            dir_mode: 0o755,
            comment: None,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level used by [`ZipWriter::write_data`] and [`ZipWriter::write_file`].
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Whether password-protected entries default to AES-256 rather than ZipCrypto.
    pub fn aes(mut self, use_aes: bool) -> Self {
        self.use_aes = use_aes;
        self
    }

    /// Permission bits for entries that have no source file.
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode & 0o7777;
        self
    }

    /// Permission bits for folders that have no source directory.
    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode & 0o7777;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Central directory data kept for each appended entry.
struct CentralRecord {
    raw_name: Vec<u8>,
    version_needed: u16,
    flags: u16,
    method: u16,
    time: DosDateTime,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    external_attributes: u32,
    lfh_offset: u32,
    extra: Vec<u8>,
}

/// One entry to append.
struct NewEntry<'a> {
    name: &'a str,
    data: &'a [u8],
    level: u32,
    password: Option<&'a str>,
    use_aes: bool,
    mode: u32,
    kind: EntryKind,
    time: DosDateTime,
}

/// Sequential archive builder.
///
/// Entries are appended in order and become visible to readers only once
/// [`close`](ZipWriter::close) writes the central directory. `close` consumes
/// the writer, so appending after finalizing does not compile.
///
/// Append methods return `bool` and log the reason on failure. An I/O failure
/// in the middle of an entry leaves the sink in an unknown state: the writer
/// then refuses further appends with [`ZipError::ArchiveClosed`].
pub struct ZipWriter<W: Write> {
    sink: W,
    offset: u64,
    records: Vec<CentralRecord>,
    options: WriterOptions,
    poisoned: bool,
}

impl ZipWriter<BufWriter<File>> {
    /// Create (or truncate) an archive file with default options.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    pub fn create_with_options(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file), options))
    }
}

impl<W: Write> ZipWriter<W> {
    pub fn new(sink: W, options: WriterOptions) -> Self {
        Self {
            sink,
            offset: 0,
            records: Vec::new(),
            options,
            poisoned: false,
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append in-memory data with the configured level and cipher.
    pub fn write_data(&mut self, data: &[u8], file_name: &str, password: Option<&str>) -> bool {
        let level = self.options.compression_level;
        let use_aes = self.options.use_aes;
        self.write_bytes(data, file_name, level, password, use_aes)
    }

    /// Append in-memory data as a regular file with the default file mode.
    ///
    /// `level` 0 stores, 1 to 9 deflate. A password encrypts the entry with
    /// AES-256 when `use_aes` is set, ZipCrypto otherwise.
    pub fn write_bytes(
        &mut self,
        data: &[u8],
        file_name: &str,
        level: u32,
        password: Option<&str>,
        use_aes: bool,
    ) -> bool {
        let entry = NewEntry {
            name: file_name,
            data,
            level,
            password,
            use_aes,
            mode: self.options.file_mode,
            kind: EntryKind::File,
            time: DosDateTime::now(),
        };
        let result = self.append(entry);
        self.report(file_name, result)
    }

    /// Append a file from disk under its own file name, keeping its permission bits.
    pub fn write_file(&mut self, path: impl AsRef<Path>, password: Option<&str>) -> bool {
        let level = self.options.compression_level;
        let use_aes = self.options.use_aes;
        self.write_file_at_path(path, None, level, password, use_aes)
    }

    /// Append a file from disk.
    ///
    /// The entry carries the source's permission bits and modification time.
    /// `file_name` defaults to the final component of `path`.
    pub fn write_file_at_path(
        &mut self,
        path: impl AsRef<Path>,
        file_name: Option<&str>,
        level: u32,
        password: Option<&str>,
        use_aes: bool,
    ) -> bool {
        let path = path.as_ref();
        let result = (|| -> Result<()> {
            let metadata = fs::metadata(path)?;
            if !metadata.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a regular file", path.display()),
                )
                .into());
            }
            let name = entry_name(path, file_name)?;
            let data = fs::read(path)?;
            self.append(NewEntry {
                name: &name,
                data: &data,
                level,
                password,
                use_aes,
                mode: permissions::host_mode(&metadata),
                kind: EntryKind::File,
                time: modified_time(&metadata),
            })
        })();
        self.report(&path.display().to_string(), result)
    }

    /// Append an empty folder entry named `folder_name/`.
    ///
    /// When `path` names an existing directory its permission bits and
    /// modification time are used, otherwise the configured defaults.
    pub fn write_folder(
        &mut self,
        path: Option<&Path>,
        folder_name: &str,
        password: Option<&str>,
    ) -> bool {
        let result = (|| -> Result<()> {
            let name = if folder_name.ends_with('/') {
                folder_name.to_owned()
            } else {
                format!("{folder_name}/")
            };
            let (mode, time) = match path.map(fs::metadata).transpose()? {
                Some(meta) if meta.is_dir() => (permissions::host_mode(&meta), modified_time(&meta)),
                _ => (self.options.dir_mode, DosDateTime::now()),
            };
            let use_aes = self.options.use_aes;
            self.append(NewEntry {
                name: &name,
                data: &[],
                level: 0,
                password,
                use_aes,
                mode,
                kind: EntryKind::Directory,
                time,
            })
        })();
        self.report(folder_name, result)
    }

    /// Append a symbolic link, storing its target as the payload.
    pub fn write_symlink(
        &mut self,
        path: impl AsRef<Path>,
        file_name: Option<&str>,
        level: u32,
        password: Option<&str>,
        use_aes: bool,
    ) -> bool {
        let path = path.as_ref();
        let result = (|| -> Result<()> {
            let metadata = fs::symlink_metadata(path)?;
            if !metadata.file_type().is_symlink() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a symbolic link", path.display()),
                )
                .into());
            }
            let target = link_target_bytes(&fs::read_link(path)?);
            let name = entry_name(path, file_name)?;
            self.append(NewEntry {
                name: &name,
                data: &target,
                level,
                password,
                use_aes,
                mode: permissions::host_mode(&metadata),
                kind: EntryKind::Symlink,
                time: modified_time(&metadata),
            })
        })();
        self.report(&path.display().to_string(), result)
    }

    /// Append several files, each under its own file name.
    ///
    /// Every path is attempted; returns true only if all of them were added.
    pub fn write_files<P: AsRef<Path>>(&mut self, paths: &[P], password: Option<&str>) -> bool {
        let mut ok = true;
        for path in paths {
            ok &= self.write_file(path, password);
        }
        ok
    }

    /// Append a directory tree.
    ///
    /// Entries are named relative to `root`, or relative to its parent when
    /// `keep_parent` is set so that unzipping recreates `root` itself.
    /// Subdirectories become folder entries and symbolic links are stored as
    /// links, not followed. Children are visited in file name order.
    pub fn write_directory(
        &mut self,
        root: impl AsRef<Path>,
        keep_parent: bool,
        password: Option<&str>,
    ) -> bool {
        let root = root.as_ref();
        let prefix = (|| -> Result<Option<String>> {
            if !fs::metadata(root)?.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a directory", root.display()),
                )
                .into());
            }
            keep_parent.then(|| entry_name(root, None)).transpose()
        })();
        let prefix = match prefix {
            Ok(prefix) => prefix,
            Err(e) => return self.report(&root.display().to_string(), Err(e)),
        };

        let level = self.options.compression_level;
        let use_aes = self.options.use_aes;
        let mut ok = true;
        if let Some(prefix) = &prefix {
            ok &= self.write_folder(Some(root), prefix, password);
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let err = io::Error::other(format!("walkdir error: {e}"));
                    ok &= self.report(&root.display().to_string(), Err(err.into()));
                    continue;
                }
            };
            let path = entry.path();
            let name = match relative_name(root, path, prefix.as_deref()) {
                Ok(name) => name,
                Err(e) => {
                    ok &= self.report(&path.display().to_string(), Err(e));
                    continue;
                }
            };
            let file_type = entry.file_type();
            ok &= if file_type.is_symlink() {
                self.write_symlink(path, Some(&name), level, password, use_aes)
            } else if file_type.is_dir() {
                self.write_folder(Some(path), &name, password)
            } else {
                self.write_file_at_path(path, Some(&name), level, password, use_aes)
            };
        }
        ok
    }

    fn report(&self, what: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to add {what} to archive: {e}");
                false
            }
        }
    }

    fn append(&mut self, entry: NewEntry<'_>) -> Result<()> {
        if self.poisoned {
            return Err(ZipError::ArchiveClosed);
        }
        if self.records.len() >= MAX_ENTRIES {
            return Err(ZipError::LimitExceeded("more than 65534 entries needs zip64"));
        }
        let (raw_name, name_flags) = names::encode_name(entry.name)?;
        let uncompressed_size =
            field_u32(entry.data.len() as u64, "entry larger than 4 GiB needs zip64")?;
        let lfh_offset = field_u32(self.offset, "archive larger than 4 GiB needs zip64")?;

        let crc32 = crc32fast::hash(entry.data);
        let (method, compressed) = compression::compress(entry.data, entry.level)?;

        let encryption = Encryption::for_writing(entry.password, entry.use_aes);
        let mut entry_flags = name_flags;
        if encryption.is_encrypted() {
            entry_flags |= flags::ENCRYPTED;
        }
        let check = crypto::check_byte(entry_flags, crc32, entry.time.time);
        let payload = crypto::seal(encryption, entry.password.unwrap_or_default(), compressed, check)?;
        let compressed_size =
            field_u32(payload.len() as u64, "compressed entry larger than 4 GiB")?;

        let mut extra = RecordWriter::default();
        let (stored_method, version_needed) = match encryption {
            Encryption::Aes(strength) => {
                AesExtra {
                    vendor_version: 1,
                    strength,
                    method,
                }
                .write_to(&mut extra);
                (CompressionMethod::Aes, VERSION_NEEDED_AES)
            }
            _ => (method, VERSION_NEEDED_DEFAULT),
        };
        let extra = extra.into_inner();

        let record = CentralRecord {
            raw_name,
            version_needed,
            flags: entry_flags,
            method: stored_method.as_u16(),
            time: entry.time,
            crc32,
            compressed_size,
            uncompressed_size,
            external_attributes: permissions::external_attributes(entry.mode, entry.kind),
            lfh_offset,
            extra,
        };

        let mut header = RecordWriter::with_capacity(LFH_SIZE + record.raw_name.len());
        header
            .bytes(LFH_SIGNATURE)
            .u16(record.version_needed)
            .u16(record.flags)
            .u16(record.method)
            .u16(record.time.time)
            .u16(record.time.date)
            .u32(record.crc32)
            .u32(record.compressed_size)
            .u32(record.uncompressed_size)
            .u16(record.raw_name.len() as u16)
            .u16(record.extra.len() as u16)
            .bytes(&record.raw_name)
            .bytes(&record.extra);
        let header = header.into_inner();

        if let Err(e) = self
            .sink
            .write_all(&header)
            .and_then(|()| self.sink.write_all(&payload))
        {
            self.poisoned = true;
            return Err(e.into());
        }
        self.offset += (header.len() + payload.len()) as u64;

        log::debug!(
            "appended {} ({:?}, {:?}, {} -> {} bytes)",
            entry.name,
            method,
            encryption,
            uncompressed_size,
            compressed_size
        );
        self.records.push(record);
        Ok(())
    }

    /// Write the central directory and end record, flush, and hand back the sink.
    ///
    /// Fails with [`ZipError::ArchiveClosed`] without writing anything when an
    /// earlier append left a partial entry in the sink.
    pub fn close(mut self) -> Result<W> {
        if self.poisoned {
            return Err(ZipError::ArchiveClosed);
        }
        let cd_offset = field_u32(self.offset, "archive larger than 4 GiB needs zip64")?;
        let comment = self.options.comment.take().unwrap_or_default();
        if comment.len() > u16::MAX as usize {
            return Err(ZipError::LimitExceeded("archive comment longer than 65535 bytes"));
        }

        let mut cd = RecordWriter::default();
        for record in &self.records {
            cd.bytes(CDFH_SIGNATURE)
                .u16(VERSION_MADE_BY_UNIX)
                .u16(record.version_needed)
                .u16(record.flags)
                .u16(record.method)
                .u16(record.time.time)
                .u16(record.time.date)
                .u32(record.crc32)
                .u32(record.compressed_size)
                .u32(record.uncompressed_size)
                .u16(record.raw_name.len() as u16)
                .u16(record.extra.len() as u16)
                .u16(0) // comment length
                .u16(0) // disk number start
                .u16(0) // internal attributes
                .u32(record.external_attributes)
                .u32(record.lfh_offset)
                .bytes(&record.raw_name)
                .bytes(&record.extra);
        }
        let cd_size = field_u32(cd.len() as u64, "central directory larger than 4 GiB")?;

        let count = self.records.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size,
            cd_offset,
            comment_len: comment.len() as u16,
        }
        .write_to(&mut cd);
        cd.bytes(comment.as_bytes());

        self.sink.write_all(&cd.into_inner())?;
        self.sink.flush()?;
        log::debug!(
            "closed archive with {} entries, central directory at {}",
            count,
            cd_offset
        );
        Ok(self.sink)
    }
}

/// 0xFFFF in the end record's entry counts marks a ZIP64 archive.
const MAX_ENTRIES: usize = 0xFFFE;

/// Narrow to a 32-bit header field. 0xFFFFFFFF is reserved as the ZIP64 marker.
fn field_u32(value: u64, what: &'static str) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if v != u32::MAX => Ok(v),
        _ => Err(ZipError::LimitExceeded(what)),
    }
}

fn entry_name(path: &Path, file_name: Option<&str>) -> Result<String> {
    if let Some(name) = file_name {
        return Ok(name.to_owned());
    }
    let display = path.display().to_string();
    path.file_name()
        .ok_or_else(|| ZipError::invalid_name(display.clone(), "path has no file name"))?
        .to_str()
        .map(str::to_owned)
        .ok_or_else(|| ZipError::invalid_name(display, "file name is not UTF-8"))
}

/// `/`-separated entry name of `path` below `root`.
fn relative_name(root: &Path, path: &Path, prefix: Option<&str>) -> Result<String> {
    let display = path.display().to_string();
    let relative = path
        .strip_prefix(root)
        .map_err(|_| {
            ZipError::invalid_name(display.clone(), "path outside the archived directory")
        })?;
    let mut parts: Vec<&str> = prefix.into_iter().collect();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| ZipError::invalid_name(display.clone(), "file name is not UTF-8"))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

fn modified_time(metadata: &fs::Metadata) -> DosDateTime {
    metadata
        .modified()
        .map(DosDateTime::from_system_time)
        .unwrap_or_else(|_| DosDateTime::now())
}

#[cfg(unix)]
fn link_target_bytes(target: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    target.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn link_target_bytes(target: &Path) -> Vec<u8> {
    target.to_string_lossy().replace('\\', "/").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ZipArchive;
    use std::io::Cursor;

    fn memory_writer() -> ZipWriter<Cursor<Vec<u8>>> {
        ZipWriter::new(Cursor::new(Vec::new()), WriterOptions::default())
    }

    #[test]
    fn empty_archive_is_a_bare_end_record() {
        let bytes = memory_writer().close().unwrap().into_inner();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(&bytes[..4], EndOfCentralDirectory::SIGNATURE);
    }

    #[test]
    fn stored_entry_layout() {
        let mut w = memory_writer();
        assert!(w.write_bytes(b"content", "content.txt", 0, None, false));
        let bytes = w.close().unwrap().into_inner();

        assert_eq!(&bytes[..4], LFH_SIGNATURE);
        // method
        assert_eq!(&bytes[8..10], &[0, 0]);
        // crc32
        assert_eq!(&bytes[14..18], &crc32fast::hash(b"content").to_le_bytes());
        assert_eq!(&bytes[30..41], b"content.txt");
        assert_eq!(&bytes[41..48], b"content");

        let archive = ZipArchive::from_bytes(bytes).unwrap();
        let entry = &archive.entries()[0];
        assert_eq!(entry.compression_method, CompressionMethod::Stored);
        assert_eq!(entry.unix_mode(), Some(0o100644));
        assert_eq!(entry.version_made_by >> 8, 3);
    }

    #[test]
    fn invalid_name_fails_without_poisoning() {
        let mut w = memory_writer();
        assert!(!w.write_bytes(b"x", "../escape", 0, None, false));
        assert!(w.write_bytes(b"x", "ok.txt", 0, None, false));
        assert_eq!(w.len(), 1);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_failure_reports_false_and_poisons() {
        let mut w = ZipWriter::new(FailingSink, WriterOptions::default());
        assert!(!w.write_bytes(b"x", "a.txt", 0, None, false));
        assert!(w.poisoned);
        assert!(matches!(
            w.append(NewEntry {
                name: "b.txt",
                data: b"",
                level: 0,
                password: None,
                use_aes: false,
                mode: 0o644,
                kind: EntryKind::File,
                time: DosDateTime::EPOCH,
            }),
            Err(ZipError::ArchiveClosed)
        ));
        assert!(matches!(w.close(), Err(ZipError::ArchiveClosed)));
    }

    /// Accepts `budget` bytes, then fails every write.
    struct ShortSink {
        out: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("device full"));
            }
            let n = buf.len().min(self.budget);
            self.out.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn close_refuses_after_partial_entry() {
        let sink = ShortSink {
            out: Vec::new(),
            budget: 50,
        };
        let mut w = ZipWriter::new(sink, WriterOptions::default());
        // 30-byte header, 5-byte name, 5-byte payload
        assert!(w.write_bytes(b"first", "a.txt", 0, None, false));
        assert!(!w.write_bytes(b"second", "b.txt", 0, None, false));
        assert!(!w.write_bytes(b"third", "c.txt", 0, None, false));
        assert!(matches!(w.close(), Err(ZipError::ArchiveClosed)));
    }

    #[test]
    fn entry_count_stops_below_zip64_marker() {
        let mut w = ZipWriter::new(Vec::new(), WriterOptions::default());
        for i in 0..MAX_ENTRIES {
            assert!(w.write_bytes(b"", &i.to_string(), 0, None, false), "entry {i}");
        }
        assert!(!w.write_bytes(b"", "one-too-many", 0, None, false));
        assert_eq!(w.len(), 0xFFFE);

        let archive = ZipArchive::from_bytes(w.close().unwrap()).unwrap();
        assert_eq!(archive.len(), 0xFFFE);
        assert_eq!(archive.entries()[0xFFFD].file_name, "65533");
    }

    #[test]
    fn header_fields_reserve_the_zip64_marker() {
        assert_eq!(field_u32(0xFFFF_FFFE, "x").unwrap(), 0xFFFF_FFFE);
        assert!(matches!(
            field_u32(0xFFFF_FFFF, "x"),
            Err(ZipError::LimitExceeded("x"))
        ));
        assert!(field_u32(1 << 32, "x").is_err());
    }

    #[test]
    fn folder_entry_gets_trailing_slash_and_dir_mode() {
        let mut w = memory_writer();
        assert!(w.write_folder(None, "docs", None));
        let archive = ZipArchive::from_bytes(w.close().unwrap().into_inner()).unwrap();
        let entry = &archive.entries()[0];
        assert_eq!(entry.file_name, "docs/");
        assert!(entry.is_directory);
        assert_eq!(entry.unix_mode(), Some(0o040755));
        assert!(archive.list_entries().is_empty());
    }

    #[test]
    fn aes_entry_records_wrapper_method() {
        let mut w = memory_writer();
        assert!(w.write_bytes(b"secret", "s.txt", 6, Some("pw"), true));
        let archive = ZipArchive::from_bytes(w.close().unwrap().into_inner()).unwrap();
        let entry = &archive.entries()[0];
        assert_eq!(entry.compression_method, CompressionMethod::Aes);
        assert_eq!(entry.effective_method(), CompressionMethod::Deflate);
        assert!(entry.is_encrypted());
        assert_eq!(entry.aes.map(|a| a.strength), Some(AesStrength::Aes256));
    }

    #[test]
    fn comment_is_written() {
        let w = ZipWriter::new(
            Cursor::new(Vec::new()),
            WriterOptions::new().comment("built by zipkit"),
        );
        let archive = ZipArchive::from_bytes(w.close().unwrap().into_inner()).unwrap();
        assert_eq!(archive.comment(), "built by zipkit");
    }
}
