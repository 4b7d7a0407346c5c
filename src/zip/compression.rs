//! Store and deflate payload codecs.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::error::{Result, ZipError};

use super::structures::CompressionMethod;

/// Highest deflate level; larger requested levels are clamped to it.
pub const MAX_LEVEL: u32 = 9;

/// zlib's `Z_DEFAULT_COMPRESSION` level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Method used for a compression level: 0 stores, anything else deflates.
pub fn method_for_level(level: u32) -> CompressionMethod {
    if level == 0 {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflate
    }
}

/// Compress `data` at `level`, returning the method actually used.
pub fn compress(data: &[u8], level: u32) -> Result<(CompressionMethod, Vec<u8>)> {
    let method = method_for_level(level);
    let out = match method {
        CompressionMethod::Stored => data.to_vec(),
        _ => {
            let mut encoder = DeflateEncoder::new(
                Vec::with_capacity(data.len() / 2 + 64),
                Compression::new(level.min(MAX_LEVEL)),
            );
            encoder.write_all(data)?;
            encoder.finish()?
        }
    };
    Ok((method, out))
}

/// Decompress an entry payload.
///
/// Output is capped at `expected_size`: a stream that inflates past the
/// declared size is rejected as soon as the extra byte appears.
pub fn decompress(
    method: CompressionMethod,
    data: &[u8],
    expected_size: u64,
    name: &str,
) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::Stored => Ok(data.to_vec()),
        CompressionMethod::Deflate => {
            // Cap the hint so a lying header can't force a huge allocation.
            let hint = expected_size.min(64 * 1024 * 1024) as usize;
            let mut out = Vec::with_capacity(hint);
            DeflateDecoder::new(data)
                .take(expected_size.saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| ZipError::CorruptEntry {
                    name: name.to_owned(),
                    reason: format!("invalid deflate stream: {e}"),
                })?;
            if out.len() as u64 > expected_size {
                return Err(ZipError::CorruptEntry {
                    name: name.to_owned(),
                    reason: format!("inflates past the declared {expected_size} bytes"),
                });
            }
            Ok(out)
        }
        other => Err(ZipError::UnsupportedMethod(other.as_u16())),
    }
}
