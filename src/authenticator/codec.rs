//! Authenticator ⇄ transport string.
//!
//! The entity is written as a JSON document (`id`, `identity`, `lastUsed`,
//! `expiresAt`, `idleTimeout`, `fingerprint`). With a cipher configured the
//! document is sealed with AES-256-GCM; otherwise it is base64url encoded.
//! Plain encoding detects structural corruption but not tampering.

use super::Authenticator;
use crate::security::encryption::{CipherError, SecretKey, TokenCipher};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("could not encode authenticator document: {0}")]
    Document(#[from] serde_json::Error),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("token is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("authenticator document is malformed: {0}")]
    Document(#[from] serde_json::Error),
}

/// Serializes authenticators for stateless transport.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    cipher: Option<TokenCipher>,
}

impl TokenCodec {
    /// Codec that seals documents under `key`.
    pub fn encrypted(key: &SecretKey) -> Self {
        Self {
            cipher: Some(TokenCipher::new(key)),
        }
    }

    /// Codec that only base64url-encodes documents.
    pub fn plain() -> Self {
        Self { cipher: None }
    }

    /// Build from the `encrypt_authenticator` flag.
    pub fn from_settings(encrypt: bool, key: Option<&SecretKey>) -> anyhow::Result<Self> {
        match (encrypt, key) {
            (true, Some(key)) => Ok(Self::encrypted(key)),
            (true, None) => {
                anyhow::bail!("encrypt_authenticator is enabled but no secret key was provided")
            }
            (false, _) => Ok(Self::plain()),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn serialize(&self, authenticator: &Authenticator) -> Result<String, EncodeError> {
        let document = serde_json::to_vec(authenticator)?;
        match &self.cipher {
            Some(cipher) => Ok(cipher.seal(&document)?),
            None => Ok(URL_SAFE_NO_PAD.encode(document)),
        }
    }

    pub fn deserialize(&self, token: &str) -> Result<Authenticator, DecodeError> {
        let document = match &self.cipher {
            Some(cipher) => cipher.open(token)?,
            None => URL_SAFE_NO_PAD.decode(token)?,
        };
        Ok(serde_json::from_slice(&document)?)
    }
}
