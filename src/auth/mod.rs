//! Session authenticators for web services.
//!
//! Provides:
//! - Authenticator lifecycle (create, retrieve, init, touch, update, renew, discard)
//! - Stateless mode: the whole record travels, optionally AES-256-GCM sealed
//! - Stateful mode: only an opaque id travels, the record lives in a store
//! - In-memory and SQLite stores with expired-record sweeping
//!
//! ## Design Decisions
//! - One [`TokenMode`] is chosen at construction; the service never asks
//!   whether a store exists.
//! - Store keys are SHA-256 hashes of the id, consistent with the rest of the
//!   token handling. A leaked database does not leak usable tokens.
//! - Clock, id generator, fingerprinter and transport are injected so the
//!   lifecycle can be tested without wall time or real requests.

pub mod error;
pub mod mode;
pub mod service;
pub mod store;
pub mod traits;

pub use error::AuthenticatorError;
pub use mode::{StatefulMode, StatelessMode, TokenMode, TokenUpdate};
pub use service::{
    spawn_purge_task, AuthenticatorService, AuthenticatorServiceBuilder, AuthenticatorSettings,
};
pub use store::{InMemoryAuthenticatorStore, SqliteAuthenticatorStore};
pub use traits::{AuthenticatorStore, Clock, IdGenerator, ManualClock, SystemClock, UuidIdGenerator};

use crate::authenticator::TokenCodec;
use crate::config::{Config, StoreConfig};
use crate::security::encryption::SecretKey;
use crate::security::fingerprint::RequestFingerprinter;
use crate::transport::HeaderTransport;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

/// Store for the configured backend. `None` selects stateless mode.
pub fn create_store(config: &StoreConfig) -> Result<Option<Arc<dyn AuthenticatorStore>>> {
    match config.backend.as_str() {
        "stateless" => Ok(None),
        "memory" => Ok(Some(Arc::new(InMemoryAuthenticatorStore::new()))),
        "sqlite" => {
            let Some(path) = config.resolved_db_path() else {
                bail!("store.db_path is required for the sqlite backend");
            };
            Ok(Some(Arc::new(SqliteAuthenticatorStore::open(&path)?)))
        }
        other => bail!("Unknown store backend: {other}"),
    }
}

/// Secret key from `authenticator.secret_key_path`, if configured.
pub fn load_secret_key(config: &Config) -> Result<Option<SecretKey>> {
    let Some(path) = config.authenticator.resolved_secret_key_path() else {
        return Ok(None);
    };
    let key = SecretKey::from_key_file(&path)
        .with_context(|| format!("Failed to load secret key from {}", path.display()))?;
    Ok(Some(key))
}

/// Service wired from config with default collaborators.
pub fn create_service(config: &Config) -> Result<AuthenticatorService> {
    config.validate()?;
    let settings = AuthenticatorSettings::from_config(&config.authenticator);
    let transport = HeaderTransport::new(&config.authenticator.token_name)?;
    let fingerprinter =
        RequestFingerprinter::new(config.authenticator.fingerprint_remote_address);

    let builder = AuthenticatorService::builder(settings)
        .transport(Arc::new(transport))
        .fingerprint_generator(Arc::new(fingerprinter));

    let builder = match create_store(&config.store)? {
        Some(store) => builder.stateful(store),
        None => {
            let key = load_secret_key(config)?;
            let codec =
                TokenCodec::from_settings(config.authenticator.encrypt_authenticator, key.as_ref())?;
            if !codec.is_encrypted() {
                tracing::warn!("Stateless authenticators are not encrypted and can be forged");
            }
            builder.stateless(codec)
        }
    };

    let service = builder.build()?;
    tracing::info!(
        mode = service.mode_name(),
        backend = %config.store.backend,
        "Authenticator service ready"
    );
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthenticatorConfig;

    #[test]
    fn create_store_selects_backend() {
        assert!(create_store(&StoreConfig::default()).unwrap().is_none());

        let memory = StoreConfig {
            backend: "memory".into(),
            ..StoreConfig::default()
        };
        assert_eq!(create_store(&memory).unwrap().unwrap().name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let sqlite = StoreConfig {
            backend: "sqlite".into(),
            db_path: Some(dir.path().join("tokens.db").to_string_lossy().into_owned()),
            ..StoreConfig::default()
        };
        assert_eq!(create_store(&sqlite).unwrap().unwrap().name(), "sqlite");
    }

    #[test]
    fn create_store_rejects_unknown_backend() {
        let config = StoreConfig {
            backend: "redis".into(),
            ..StoreConfig::default()
        };
        let err = create_store(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown store backend"));
    }

    #[test]
    fn encrypted_stateless_requires_key() {
        let err = create_service(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("secret key"));
    }

    #[test]
    fn stateless_service_from_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("secret.key");
        SecretKey::generate_key_file(&key_path).unwrap();

        let config = Config {
            authenticator: AuthenticatorConfig {
                secret_key_path: Some(key_path.to_string_lossy().into_owned()),
                ..AuthenticatorConfig::default()
            },
            ..Config::default()
        };
        let service = create_service(&config).unwrap();
        assert_eq!(service.mode_name(), "stateless");
    }

    #[test]
    fn plain_stateless_needs_no_key() {
        let config = Config {
            authenticator: AuthenticatorConfig {
                encrypt_authenticator: false,
                ..AuthenticatorConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(create_service(&config).unwrap().mode_name(), "stateless");
    }

    #[test]
    fn memory_backend_is_stateful() {
        let config = Config {
            store: StoreConfig {
                backend: "memory".into(),
                ..StoreConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(create_service(&config).unwrap().mode_name(), "stateful");
    }
}
