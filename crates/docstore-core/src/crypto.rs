//! AES-256-GCM encryption of document content under a passphrase.
//!
//! The key is the SHA-256 digest of the passphrase; there is no salt or
//! iterated KDF. Each encryption draws a fresh 96-bit nonce, and the wire
//! format is standard base64 of `nonce || ciphertext || tag`.
//!
//! `decrypt` accepts both historical formats: content carrying the legacy
//! `PROTECTED:` marker and bare ciphertext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::protection::strip_legacy_marker;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors raised by the content cipher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),
}

fn cipher_for(passphrase: &str) -> Aes256Gcm {
    let key: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
    Aes256Gcm::new((&key).into())
}

/// Encrypt `plaintext` under `passphrase` in the current (unprefixed) format.
pub fn encrypt(plaintext: &str, passphrase: &str) -> Result<String, CryptoError> {
    let cipher = cipher_for(passphrase);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
    payload.extend_from_slice(nonce.as_slice());
    payload.extend_from_slice(&sealed);
    Ok(B64.encode(payload))
}

/// Decrypt content produced by [`encrypt`], with or without the legacy marker.
pub fn decrypt(ciphertext: &str, passphrase: &str) -> Result<String, CryptoError> {
    let encoded = strip_legacy_marker(ciphertext).trim();
    let payload = B64
        .decode(encoded)
        .map_err(|e| CryptoError::Malformed(format!("invalid base64: {}", e)))?;

    if payload.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Malformed(format!(
            "payload too short ({} bytes)",
            payload.len()
        )));
    }

    let (nonce, sealed) = payload.split_at(NONCE_LEN);
    let plaintext = cipher_for(passphrase)
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt and prepend the legacy marker. Only used to produce fixtures in
/// the old format; new writes always use [`encrypt`].
pub fn encrypt_legacy(plaintext: &str, passphrase: &str) -> Result<String, CryptoError> {
    Ok(format!(
        "{}{}",
        crate::protection::LEGACY_MARKER,
        encrypt(plaintext, passphrase)?
    ))
}
