//! # Cryptographic Primitives
//!
//! AES-256-GCM payload encryption with a detached 16-byte tag, HMAC-SHA256
//! packet digests and SHA-256 file hashing.
//!
//! The session token doubles as the symmetric key for both AES-GCM and HMAC.
//! Key material lives in [`SessionKey`], which wipes itself when dropped.

use crate::core::header::{DIGEST_LEN, IV_LEN, SESSION_TOKEN_LEN};
use crate::error::{constants, ProtocolError, Result};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-GCM authentication tag length
pub const TAG_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Session token used as the symmetric key.
///
/// Never printed; `Debug` is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_TOKEN_LEN]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; SESSION_TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice that must be exactly 32 bytes long
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SESSION_TOKEN_LEN] = bytes
            .try_into()
            .map_err(|_| ProtocolError::Session(constants::ERR_BAD_TOKEN_LENGTH))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_TOKEN_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Encrypt `plaintext`, returning ciphertext and the detached tag.
pub fn encrypt(
    plaintext: &[u8],
    key: &SessionKey,
    iv: &[u8; IV_LEN],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer)
        .map_err(|_| ProtocolError::Validation("plaintext too large to encrypt".to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok((buffer, tag_bytes))
}

/// Decrypt and authenticate. A rejected tag yields no plaintext at all.
pub fn decrypt(
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    key: &SessionKey,
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut buffer = ciphertext.to_vec();
    match cipher.decrypt_in_place_detached(
        Nonce::from_slice(iv),
        b"",
        &mut buffer,
        Tag::from_slice(tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(ProtocolError::Authentication(constants::ERR_TAG_MISMATCH))
        }
    }
}

/// Split `ciphertext ‖ tag` and decrypt.
pub fn decrypt_sealed(sealed: &[u8], key: &SessionKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    if sealed.len() < TAG_LEN {
        return Err(ProtocolError::Authentication(
            constants::ERR_CIPHERTEXT_TOO_SHORT,
        ));
    }
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag);
    decrypt(ciphertext, &tag_bytes, key, iv)
}

fn keyed_mac(key: &SessionKey, parts: &[&[u8]]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| ProtocolError::Session(constants::ERR_BAD_TOKEN_LENGTH))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// HMAC-SHA256 over the concatenation of `parts`
pub fn hmac(parts: &[&[u8]], key: &SessionKey) -> Result<[u8; DIGEST_LEN]> {
    let digest = keyed_mac(key, parts)?.finalize().into_bytes();
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&digest);
    Ok(out)
}

/// Constant-time digest comparison over the concatenation of `parts`
pub fn verify_hmac(parts: &[&[u8]], key: &SessionKey, expected: &[u8]) -> Result<()> {
    keyed_mac(key, parts)?
        .verify_slice(expected)
        .map_err(|_| ProtocolError::Integrity(constants::ERR_HMAC_MISMATCH))
}

/// Fresh 12-byte IV from the OS random source
pub fn random_iv() -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    getrandom::fill(&mut iv).map_err(|e| {
        ProtocolError::Io(std::io::Error::other(format!(
            "{}: {e}",
            constants::ERR_RANDOM_SOURCE
        )))
    })?;
    Ok(iv)
}

/// SHA-256 of `data`
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
