//! PKWARE traditional encryption.
//!
//! A stream cipher over three 32-bit keys updated with CRC-32 steps. Each
//! entry is prefixed with a 12-byte header whose last byte lets a reader reject
//! most wrong passwords before touching the payload.

use std::io;

use crate::error::{Result, ZipError};

pub const HEADER_LEN: usize = 12;

// The key schedule steps raw CRC state one byte at a time, which crc32fast's
// whole-buffer hasher does not expose.
const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

fn crc32_step(crc: u32, byte: u8) -> u32 {
    CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

struct Keys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl Keys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, plain: u8) {
        self.k0 = crc32_step(self.k0, plain);
        self.k1 = self
            .k1
            .wrapping_add(self.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.k2 = crc32_step(self.k2, (self.k1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let t = (self.k2 | 2) & 0xFFFF;
        ((t.wrapping_mul(t ^ 1)) >> 8) as u8
    }

    fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let c = plain ^ self.stream_byte();
        self.update(plain);
        c
    }

    fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let p = cipher ^ self.stream_byte();
        self.update(p);
        p
    }
}

/// Encrypt `data`, prepending the 12-byte header ending in `check_byte`.
pub fn encrypt(password: &[u8], data: &[u8], check_byte: u8) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    getrandom::getrandom(&mut header[..HEADER_LEN - 1])
        .map_err(|e| io::Error::other(e.to_string()))?;
    header[HEADER_LEN - 1] = check_byte;

    let mut keys = Keys::new(password);
    let mut out = Vec::with_capacity(HEADER_LEN + data.len());
    out.extend(header.iter().map(|&b| keys.encrypt_byte(b)));
    out.extend(data.iter().map(|&b| keys.encrypt_byte(b)));
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt`].
pub fn decrypt(password: &[u8], payload: &[u8], check_byte: u8, name: &str) -> Result<Vec<u8>> {
    if payload.len() < HEADER_LEN {
        return Err(ZipError::CorruptEntry {
            name: name.to_owned(),
            reason: "encrypted payload shorter than its header".into(),
        });
    }
    let mut keys = Keys::new(password);
    let mut header = [0u8; HEADER_LEN];
    for (dst, &src) in header.iter_mut().zip(&payload[..HEADER_LEN]) {
        *dst = keys.decrypt_byte(src);
    }
    if header[HEADER_LEN - 1] != check_byte {
        return Err(ZipError::WrongPassword(name.to_owned()));
    }
    Ok(payload[HEADER_LEN..]
        .iter()
        .map(|&b| keys.decrypt_byte(b))
        .collect())
}
