//! WinZip AES encryption (AE-1 / AE-2).
//!
//! Payload layout: salt, 2-byte password verifier, AES-CTR ciphertext, then the
//! first 10 bytes of an HMAC-SHA1 over the ciphertext. Keys come from
//! PBKDF2-HMAC-SHA1 with 1000 iterations.

use std::io;

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::{Aes128, Aes192, Aes256};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::error::{Result, ZipError};
use crate::zip::structures::AesStrength;

type HmacSha1 = Hmac<Sha1>;

const ITERATIONS: u32 = 1000;
pub const VERIFIER_LEN: usize = 2;
pub const AUTH_CODE_LEN: usize = 10;

/// WinZip counters are little-endian and start at 1.
const COUNTER_START: [u8; 16] = [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

struct DerivedKeys {
    material: Zeroizing<Vec<u8>>,
    key_len: usize,
}

impl DerivedKeys {
    fn derive(password: &[u8], salt: &[u8], strength: AesStrength) -> Self {
        let key_len = strength.key_len();
        let mut material = Zeroizing::new(vec![0u8; 2 * key_len + VERIFIER_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, ITERATIONS, &mut material);
        Self { material, key_len }
    }

    fn encryption_key(&self) -> &[u8] {
        &self.material[..self.key_len]
    }

    fn auth_key(&self) -> &[u8] {
        &self.material[self.key_len..2 * self.key_len]
    }

    fn verifier(&self) -> &[u8] {
        &self.material[2 * self.key_len..]
    }
}

fn ctr_xor<C: KeyIvInit + StreamCipher>(key: &[u8], data: &mut [u8]) -> Result<()> {
    let mut cipher = C::new_from_slices(key, &COUNTER_START)
        .map_err(|_| ZipError::malformed("invalid aes key length"))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn apply_keystream(strength: AesStrength, key: &[u8], data: &mut [u8]) -> Result<()> {
    match strength {
        AesStrength::Aes128 => ctr_xor::<ctr::Ctr128LE<Aes128>>(key, data),
        AesStrength::Aes192 => ctr_xor::<ctr::Ctr128LE<Aes192>>(key, data),
        AesStrength::Aes256 => ctr_xor::<ctr::Ctr128LE<Aes256>>(key, data),
    }
}

fn new_mac(keys: &DerivedKeys) -> Result<HmacSha1> {
    <HmacSha1 as Mac>::new_from_slice(keys.auth_key())
        .map_err(|_| ZipError::malformed("invalid hmac key length"))
}

/// Encrypt with a fresh random salt.
pub fn encrypt(password: &[u8], strength: AesStrength, data: &[u8]) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; strength.salt_len()];
    getrandom::getrandom(&mut salt).map_err(|e| io::Error::other(e.to_string()))?;
    encrypt_with_salt(password, strength, &salt, data)
}

fn encrypt_with_salt(
    password: &[u8],
    strength: AesStrength,
    salt: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    let keys = DerivedKeys::derive(password, salt, strength);

    let mut out = Vec::with_capacity(salt.len() + VERIFIER_LEN + data.len() + AUTH_CODE_LEN);
    out.extend_from_slice(salt);
    out.extend_from_slice(keys.verifier());
    let body_start = out.len();
    out.extend_from_slice(data);
    apply_keystream(strength, keys.encryption_key(), &mut out[body_start..])?;

    let mut mac = new_mac(&keys)?;
    mac.update(&out[body_start..]);
    let tag = mac.finalize().into_bytes();
    out.extend_from_slice(&tag[..AUTH_CODE_LEN]);
    Ok(out)
}

/// Verify and decrypt. A verifier mismatch is a wrong password; a tag
/// mismatch means the ciphertext was altered.
pub fn decrypt(password: &[u8], strength: AesStrength, payload: &[u8], name: &str) -> Result<Vec<u8>> {
    let salt_len = strength.salt_len();
    let overhead = salt_len + VERIFIER_LEN + AUTH_CODE_LEN;
    if payload.len() < overhead {
        return Err(ZipError::CorruptEntry {
            name: name.to_owned(),
            reason: "aes payload shorter than salt, verifier and tag".into(),
        });
    }
    let salt = &payload[..salt_len];
    let verifier = &payload[salt_len..salt_len + VERIFIER_LEN];
    let body = &payload[salt_len + VERIFIER_LEN..payload.len() - AUTH_CODE_LEN];
    let tag = &payload[payload.len() - AUTH_CODE_LEN..];

    let keys = DerivedKeys::derive(password, salt, strength);
    if keys.verifier() != verifier {
        return Err(ZipError::WrongPassword(name.to_owned()));
    }

    let mut mac = new_mac(&keys)?;
    mac.update(body);
    mac.verify_truncated_left(tag)
        .map_err(|_| ZipError::AuthFailure(name.to_owned()))?;

    let mut plain = body.to_vec();
    apply_keystream(strength, keys.encryption_key(), &mut plain)?;
    Ok(plain)
}
