//! AES-256-GCM sealing for stateless authenticators.
//!
//! The secret key is loaded once at start-up into a [`SecretKey`] and handed
//! to [`TokenCipher`] explicitly; nothing here reads ambient state.
//!
//! ## Format
//! `aes256.<base64url(nonce || ciphertext || tag)>`, unpadded so the value is
//! safe in headers and cookies without further escaping.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::path::Path;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
const AES_GCM_NONCE_SIZE: usize = 12;

/// Secret key length in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// Prefix for sealed values.
const SEALED_PREFIX: &str = "aes256.";

/// Failures while sealing or opening a token.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("missing `aes256.` prefix")]
    MissingPrefix,
    #[error("sealed value is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("sealed value too short")]
    Truncated,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed (wrong key or tampered value)")]
    Decrypt,
}

/// Process-wide symmetric key for sealing authenticators.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SECRET_KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; SECRET_KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(encoded: &str) -> anyhow::Result<Self> {
        let decoded = hex::decode(encoded.trim())?;
        Self::from_slice(&decoded)
    }

    /// Load the key from a file holding exactly 32 raw bytes.
    pub fn from_key_file(path: &Path) -> anyhow::Result<Self> {
        let key_bytes = std::fs::read(path)?;
        Self::from_slice(&key_bytes)
    }

    /// Generate a new random key and save it to a file.
    pub fn generate_key_file(path: &Path) -> anyhow::Result<Self> {
        let key = Self::generate();
        std::fs::write(path, key.0)?;
        Ok(key)
    }

    fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() != SECRET_KEY_LEN {
            anyhow::bail!(
                "secret key must be exactly {SECRET_KEY_LEN} bytes, got {}",
                bytes.len()
            );
        }
        let mut key = [0u8; SECRET_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// AES-256-GCM sealing engine.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: &SecretKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0)),
        }
    }

    /// Seal plaintext under a random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut combined = Vec::with_capacity(AES_GCM_NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{SEALED_PREFIX}{}", URL_SAFE_NO_PAD.encode(&combined)))
    }

    /// Open a value produced by [`TokenCipher::seal`].
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CipherError> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or(CipherError::MissingPrefix)?;
        let combined = URL_SAFE_NO_PAD.decode(encoded)?;

        if combined.len() < AES_GCM_NONCE_SIZE {
            return Err(CipherError::Truncated);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(AES_GCM_NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Decrypt)
    }

    /// Check if a string has the sealed-value prefix.
    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(aes-256-gcm)")
    }
}
