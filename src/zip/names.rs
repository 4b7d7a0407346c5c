//! Entry name encoding.
//!
//! Names flagged with general purpose bit 11 are UTF-8. Unflagged names are
//! tried as strict UTF-8 first, since macOS tools write UTF-8 without setting
//! the flag, and fall back to IBM code page 437 otherwise.

use crate::error::{Result, ZipError};

use super::structures::flags;

/// Upper half of code page 437; the lower half is ASCII.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode CP437 bytes; every byte maps to exactly one character.
pub fn decode_cp437(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// Decode a stored entry name according to its flags.
pub fn decode_name(raw: &[u8], entry_flags: u16) -> Result<String> {
    let name = if entry_flags & flags::UTF8 != 0 {
        String::from_utf8(raw.to_vec())
            .map_err(|_| ZipError::invalid_name(decode_cp437(raw), "not valid UTF-8"))?
    } else {
        match std::str::from_utf8(raw) {
            Ok(s) => s.to_owned(),
            Err(_) => {
                log::debug!("entry name is not UTF-8, decoding as CP437");
                decode_cp437(raw)
            }
        }
    };
    validate_name(&name)?;
    Ok(name)
}

/// Encode a name for storage, returning the bytes and the flag bits to set.
pub fn encode_name(name: &str) -> Result<(Vec<u8>, u16)> {
    validate_name(name)?;
    if name.len() > u16::MAX as usize {
        return Err(ZipError::invalid_name(name, "name longer than 65535 bytes"));
    }
    let entry_flags = if name.is_ascii() { 0 } else { flags::UTF8 };
    Ok((name.as_bytes().to_vec(), entry_flags))
}

/// Reject names that would escape an extraction root.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ZipError::invalid_name(name, "empty name"));
    }
    if name.contains('\0') {
        return Err(ZipError::invalid_name(name, "contains NUL"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(ZipError::invalid_name(name, "absolute path"));
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(ZipError::invalid_name(name, "drive-qualified path"));
    }
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ZipError::invalid_name(name, "parent directory segment"));
    }
    Ok(())
}
