//! Hand-assembled archives in the shapes other tools produce.

#![allow(dead_code)]

/// One stored entry for [`raw_archive`].
pub struct RawEntry<'a> {
    pub name: &'a [u8],
    pub data: &'a [u8],
    pub flags: u16,
    pub version_made_by: u16,
    pub external_attributes: u32,
}

impl<'a> RawEntry<'a> {
    /// A stored file as written by a tool that never sets the UTF-8 flag.
    pub fn file(name: &'a [u8], data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            flags: 0,
            version_made_by: 20,
            external_attributes: 0,
        }
    }

    pub fn dir(name: &'a [u8]) -> Self {
        Self {
            name,
            data: b"",
            flags: 0,
            version_made_by: 20,
            external_attributes: 0x10,
        }
    }
}

fn u16le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Assemble a stored-only archive byte for byte.
pub fn raw_archive(entries: &[RawEntry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    for e in entries {
        offsets.push(out.len() as u32);
        let crc = crc32fast::hash(e.data);
        out.extend_from_slice(b"PK\x03\x04");
        u16le(&mut out, 10);
        u16le(&mut out, e.flags);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u16le(&mut out, 0x21);
        u32le(&mut out, crc);
        u32le(&mut out, e.data.len() as u32);
        u32le(&mut out, e.data.len() as u32);
        u16le(&mut out, e.name.len() as u16);
        u16le(&mut out, 0);
        out.extend_from_slice(e.name);
        out.extend_from_slice(e.data);
    }

    let cd_offset = out.len() as u32;
    for (e, offset) in entries.iter().zip(&offsets) {
        out.extend_from_slice(b"PK\x01\x02");
        u16le(&mut out, e.version_made_by);
        u16le(&mut out, 10);
        u16le(&mut out, e.flags);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u16le(&mut out, 0x21);
        u32le(&mut out, crc32fast::hash(e.data));
        u32le(&mut out, e.data.len() as u32);
        u32le(&mut out, e.data.len() as u32);
        u16le(&mut out, e.name.len() as u16);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u32le(&mut out, e.external_attributes);
        u32le(&mut out, *offset);
        out.extend_from_slice(e.name);
    }
    let cd_size = out.len() as u32 - cd_offset;

    out.extend_from_slice(b"PK\x05\x06");
    u16le(&mut out, 0);
    u16le(&mut out, 0);
    u16le(&mut out, entries.len() as u16);
    u16le(&mut out, entries.len() as u16);
    u32le(&mut out, cd_size);
    u32le(&mut out, cd_offset);
    u16le(&mut out, 0);
    out
}

/// Archive shaped like one zipped by macOS Finder: UTF-8 names without the
/// language encoding flag, decomposed accents, and a folder record.
pub fn unicode_archive() -> Vec<u8> {
    raw_archive(&[
        RawEntry::file("Acce\u{0301}nt.txt".as_bytes(), b"Hello.\n"),
        RawEntry::dir("Fo\u{0301}lder/".as_bytes()),
        RawEntry::file(
            "Fo\u{0301}lder/Nothing.txt".as_bytes(),
            b"Nothing to see here. Move along.\n",
        ),
    ])
}

/// Archive containing `LICENSE` then `Readme.markdown`.
pub fn test_archive() -> Vec<u8> {
    raw_archive(&[
        RawEntry::file(b"LICENSE", b"Copyright (c) 2010-2015 Sam Soffes\n"),
        RawEntry::file(b"Readme.markdown", b"# SSZipArchive\n"),
    ])
}

/// The 22-byte archive `zip` produces for an empty file list.
pub fn empty_archive() -> Vec<u8> {
    raw_archive(&[])
}

/// ZipCrypto archive produced by a third-party tool: `test.txt`, password
/// `test`, content `abcdefghijklmnopqrstuvwxyz123456789`.
pub const ZIPCRYPTO_ARCHIVE: [u8; 197] = [
    0x50, 0x4b, 0x03, 0x04, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0x54, 0xbd, 0xb5, 0x50, 0x2f,
    0x20, 0x79, 0x55, 0x2f, 0x00, 0x00, 0x00, 0x23, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00,
    0x74, 0x65, 0x73, 0x74, 0x2e, 0x74, 0x78, 0x74, 0xca, 0x2d, 0x1d, 0x27, 0x19, 0x19, 0x63,
    0x43, 0x77, 0x9a, 0x71, 0x76, 0xc9, 0xec, 0xd1, 0x6f, 0xd9, 0xf5, 0x22, 0x67, 0xb3, 0x8f,
    0x52, 0xb5, 0x41, 0xbc, 0x5c, 0x36, 0xf2, 0x1d, 0x84, 0xc3, 0xc0, 0x28, 0x3b, 0xfd, 0xe1,
    0x70, 0xc2, 0xcc, 0x0c, 0x11, 0x0c, 0xc5, 0x95, 0x2f, 0xa4, 0x50, 0x4b, 0x01, 0x02, 0x3f,
    0x00, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0x54, 0xbd, 0xb5, 0x50, 0x2f, 0x20, 0x79, 0x55,
    0x2f, 0x00, 0x00, 0x00, 0x23, 0x00, 0x00, 0x00, 0x08, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x74, 0x65, 0x73, 0x74,
    0x2e, 0x74, 0x78, 0x74, 0x0a, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x18,
    0x00, 0x31, 0xb2, 0x3b, 0xbf, 0xb8, 0x2f, 0xd6, 0x01, 0x31, 0xb2, 0x3b, 0xbf, 0xb8, 0x2f,
    0xd6, 0x01, 0xa8, 0xc4, 0x45, 0xbd, 0xb8, 0x2f, 0xd6, 0x01, 0x50, 0x4b, 0x05, 0x06, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x5a, 0x00, 0x00, 0x00, 0x55, 0x00, 0x00, 0x00,
    0x00, 0x00,
];
