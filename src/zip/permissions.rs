//! Mapping between host file modes and the external attributes field.
//!
//! Unix-aware writers store the full `st_mode` in the high 16 bits of the
//! external attributes and MS-DOS attribute bits in the low byte. Readers only
//! trust the high word when the "version made by" host byte says Unix.

use std::fs::Metadata;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

const MSDOS_READONLY: u32 = 0x01;
const MSDOS_DIR: u32 = 0x10;

/// Host systems from the high byte of "version made by"
const HOST_MSDOS: u16 = 0;
const HOST_UNIX: u16 = 3;
const HOST_MACOS: u16 = 19;

/// Which kind of filesystem object an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    fn type_bits(self) -> u32 {
        match self {
            EntryKind::File => S_IFREG,
            EntryKind::Directory => S_IFDIR,
            EntryKind::Symlink => S_IFLNK,
        }
    }
}

/// Build the external attributes for `mode`.
///
/// Permission bits (including setuid/setgid/sticky) are kept verbatim; the
/// file type bits are forced to match `kind`.
pub fn external_attributes(mode: u32, kind: EntryKind) -> u32 {
    let unix = (mode & 0o7777) | kind.type_bits();
    let mut dos = 0;
    if kind == EntryKind::Directory {
        dos |= MSDOS_DIR;
    }
    if mode & 0o222 == 0 {
        dos |= MSDOS_READONLY;
    }
    (unix << 16) | dos
}

/// Recover the Unix mode from a central directory record.
///
/// Returns `None` when the record carries no Unix mode (a DOS-only writer, or
/// a Unix writer that left the high word zero).
pub fn unix_mode(version_made_by: u16, external_attributes: u32) -> Option<u32> {
    let host = version_made_by >> 8;
    let high = external_attributes >> 16;
    match host {
        HOST_UNIX | HOST_MACOS if high != 0 => Some(high),
        // Some DOS-flagged writers still fill the high word.
        HOST_MSDOS if high & S_IFMT != 0 => Some(high),
        _ => None,
    }
}

/// Mode implied by the MS-DOS attribute byte alone.
pub fn msdos_mode(external_attributes: u32) -> u32 {
    if external_attributes & MSDOS_DIR != 0 {
        S_IFDIR | 0o755
    } else if external_attributes & MSDOS_READONLY != 0 {
        S_IFREG | 0o444
    } else {
        S_IFREG | 0o644
    }
}

/// Permission bits of a host file.
#[cfg(unix)]
pub fn host_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Permission bits of a host file.
#[cfg(not(unix))]
pub fn host_mode(metadata: &Metadata) -> u32 {
    let base = if metadata.is_dir() { 0o755 } else { 0o644 };
    if metadata.permissions().readonly() {
        base & !0o222
    } else {
        base
    }
}
