//! Stateless vs. stateful token handling behind one trait.
//!
//! The service picks a [`TokenMode`] once at construction: [`StatefulMode`]
//! when a store is configured, [`StatelessMode`] otherwise. No other code
//! branches on the presence of a store.

use super::traits::AuthenticatorStore;
use crate::authenticator::{Authenticator, TokenCodec};
use crate::transport::TokenValue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// How an updated authenticator reaches the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenUpdate {
    /// Record persisted under the same id; the client's value stays valid.
    Persisted,
    /// Token content changed; the client's value must be replaced.
    Replace(TokenValue),
}

#[async_trait]
pub trait TokenMode: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve a raw transport value. `Ok(None)` for unknown or undecodable
    /// values; `Err` only for infrastructure failures.
    async fn resolve(&self, raw: &str) -> anyhow::Result<Option<Authenticator>>;

    /// Make a new authenticator transportable.
    async fn init(&self, authenticator: &Authenticator) -> anyhow::Result<TokenValue>;

    async fn update(&self, authenticator: &Authenticator) -> anyhow::Result<TokenUpdate>;

    /// Invalidate server-side state for an authenticator, if there is any.
    async fn revoke(&self, authenticator: &Authenticator) -> anyhow::Result<()>;

    async fn purge_expired(&self, _now: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(0)
    }
}

// ── Stateless ────────────────────────────────────────────────────

/// The whole authenticator travels with the client.
///
/// `revoke` is a no-op: a stateless token already held by a client stays
/// decodable until it expires. Only the transport can ask the client to
/// drop it.
#[derive(Debug, Clone)]
pub struct StatelessMode {
    codec: TokenCodec,
}

impl StatelessMode {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl TokenMode for StatelessMode {
    fn name(&self) -> &str {
        "stateless"
    }

    async fn resolve(&self, raw: &str) -> anyhow::Result<Option<Authenticator>> {
        match self.codec.deserialize(raw) {
            Ok(authenticator) => Ok(Some(authenticator)),
            Err(e) => {
                tracing::info!(
                    encrypted = self.codec.is_encrypted(),
                    "Authenticator token could not be decoded: {e}"
                );
                Ok(None)
            }
        }
    }

    async fn init(&self, authenticator: &Authenticator) -> anyhow::Result<TokenValue> {
        Ok(TokenValue::new(self.codec.serialize(authenticator)?))
    }

    async fn update(&self, authenticator: &Authenticator) -> anyhow::Result<TokenUpdate> {
        Ok(TokenUpdate::Replace(TokenValue::new(
            self.codec.serialize(authenticator)?,
        )))
    }

    async fn revoke(&self, _authenticator: &Authenticator) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Stateful ─────────────────────────────────────────────────────

/// Only the id travels; the record lives in the store.
#[derive(Clone)]
pub struct StatefulMode {
    store: Arc<dyn AuthenticatorStore>,
}

impl StatefulMode {
    pub fn new(store: Arc<dyn AuthenticatorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenMode for StatefulMode {
    fn name(&self) -> &str {
        "stateful"
    }

    async fn resolve(&self, raw: &str) -> anyhow::Result<Option<Authenticator>> {
        let found = self.store.find(raw).await?;
        if found.is_none() {
            tracing::info!(
                store = self.store.name(),
                id = %log_id(raw),
                "Authenticator not found in store"
            );
        }
        Ok(found)
    }

    async fn init(&self, authenticator: &Authenticator) -> anyhow::Result<TokenValue> {
        let stored = self.store.add(authenticator.clone()).await?;
        Ok(TokenValue::new(stored.id))
    }

    async fn update(&self, authenticator: &Authenticator) -> anyhow::Result<TokenUpdate> {
        self.store.update(authenticator.clone()).await?;
        Ok(TokenUpdate::Persisted)
    }

    async fn revoke(&self, authenticator: &Authenticator) -> anyhow::Result<()> {
        self.store.remove(&authenticator.id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.store.purge_expired(now).await
    }
}

/// Short, non-reversible tag for an id in logs.
pub(crate) fn log_id(id: &str) -> String {
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    digest[..12].to_string()
}
