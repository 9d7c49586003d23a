//! Collaborator traits for the authenticator service.
//!
//! Follows the crate's trait-driven layout: the service only talks to
//! [`Clock`], [`IdGenerator`] and [`AuthenticatorStore`] (plus the
//! fingerprint and transport traits in their own modules), so tests and
//! deployments can swap any of them.

use crate::authenticator::Authenticator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

// ── Clock ────────────────────────────────────────────────────────

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ── Id generation ────────────────────────────────────────────────

/// Produces unique opaque authenticator ids.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    async fn generate(&self) -> anyhow::Result<String>;
}

/// Random v4 UUIDs in simple (32 hex chars) form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

#[async_trait]
impl IdGenerator for UuidIdGenerator {
    async fn generate(&self) -> anyhow::Result<String> {
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }
}

// ── Store ────────────────────────────────────────────────────────

/// Key→record persistence for stateful mode.
///
/// Implementations must give per-key atomicity; the service does no locking
/// of its own.
#[async_trait]
pub trait AuthenticatorStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn find(&self, id: &str) -> anyhow::Result<Option<Authenticator>>;

    /// Insert a new record. Fails if the id is already present.
    async fn add(&self, authenticator: Authenticator) -> anyhow::Result<Authenticator>;

    /// Replace an existing record. Fails if the id is unknown.
    async fn update(&self, authenticator: Authenticator) -> anyhow::Result<Authenticator>;

    /// Delete a record. Removing an unknown id is not an error.
    async fn remove(&self, id: &str) -> anyhow::Result<()>;

    /// Delete records that are no longer valid at `now`. Returns how many
    /// were removed.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(0)
    }
}
