//! Token sealing and request fingerprinting.

pub mod encryption;
pub mod fingerprint;

pub use encryption::{CipherError, SecretKey, TokenCipher};
pub use fingerprint::{FingerprintGenerator, RequestFingerprinter};
