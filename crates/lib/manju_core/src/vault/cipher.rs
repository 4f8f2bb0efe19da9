//! AES-256-GCM encryption for vaulted API keys.
//!
//! Uses a random 12-byte nonce per call, prepended to the ciphertext.
//! Output is hex-encoded `nonce || ciphertext || tag` for storage in TEXT
//! columns. Empty input maps to an empty token in both directions.

use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// AES-256 key size (32 bytes).
pub const KEY_SIZE: usize = 32;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Display value for secrets too short to partially reveal.
pub const MASK_SENTINEL: &str = "****";
/// Secrets shorter than this are fully masked.
const MASK_MIN_CHARS: usize = 8;

/// Cipher errors.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Encryption failed: {0}")]
    Crypto(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

/// 256-bit key material for [`CredentialCipher`].
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse key material given as 64 hex characters or as standard base64
    /// of exactly 32 bytes.
    pub fn parse(material: &str) -> Result<Self, CipherError> {
        let material = material.trim();
        if material.is_empty() {
            return Err(CipherError::InvalidKey("key material is empty".into()));
        }

        let bytes = if material.len() == KEY_SIZE * 2
            && material.bytes().all(|b| b.is_ascii_hexdigit())
        {
            hex::decode(material).map_err(|e| CipherError::InvalidKey(format!("hex: {e}")))?
        } else {
            base64::engine::general_purpose::STANDARD
                .decode(material)
                .map_err(|_| {
                    CipherError::InvalidKey(
                        "expected 64 hex characters or base64 of 32 bytes".into(),
                    )
                })?
        };

        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            CipherError::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", b.len()))
        })?;
        Ok(Self(key))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Symmetric cipher for secrets at rest, keyed once at startup.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.0);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt plaintext, returning hex `nonce || ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Crypto(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(hex::encode(combined))
    }

    /// Decrypt a token produced by [`CredentialCipher::encrypt`].
    ///
    /// Any malformed, truncated or tampered token is `InvalidCiphertext`.
    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        if token.is_empty() {
            return Ok(String::new());
        }

        let combined = hex::decode(token)
            .map_err(|e| CipherError::InvalidCiphertext(format!("hex decode failed: {e}")))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::InvalidCiphertext("ciphertext too short".into()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::InvalidCiphertext("integrity check failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CipherError::InvalidCiphertext("plaintext is not UTF-8".into()))
    }
}

/// Display form of a secret: first 3 characters, `...`, last 4 characters.
///
/// Secrets under 8 characters become [`MASK_SENTINEL`].
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < MASK_MIN_CHARS {
        return MASK_SENTINEL.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
