//! Bundled [`AuthenticatorStore`] backends.
//!
//! - [`InMemoryAuthenticatorStore`]: process-local map, for tests and single
//!   node deployments that accept losing sessions on restart.
//! - [`SqliteAuthenticatorStore`]: SQLite file shared by every process that
//!   points at it.
//!
//! Table:
//! - `authenticators`: id_hash, identity, last_used, expires_at,
//!   idle_timeout_secs, fingerprint, plus epoch-nanosecond `expires_at_ns`
//!   and `idle_deadline_ns` used by expiry sweeps
//!
//! Ids are stored as SHA-256 hashes (single pass, ids are already
//! high-entropy), so a leaked database does not leak live tokens.

use super::traits::AuthenticatorStore;
use crate::authenticator::Authenticator;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ── In-memory ───────────────────────────────────────────────────────

/// Process-local store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryAuthenticatorStore {
    records: Mutex<HashMap<String, Authenticator>>,
}

impl InMemoryAuthenticatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuthenticatorStore for InMemoryAuthenticatorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find(&self, id: &str) -> Result<Option<Authenticator>> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn add(&self, authenticator: Authenticator) -> Result<Authenticator> {
        let mut records = self.records.lock();
        if records.contains_key(&authenticator.id) {
            bail!("authenticator id already exists");
        }
        records.insert(authenticator.id.clone(), authenticator.clone());
        Ok(authenticator)
    }

    async fn update(&self, authenticator: Authenticator) -> Result<Authenticator> {
        let mut records = self.records.lock();
        match records.get_mut(&authenticator.id) {
            Some(existing) => {
                *existing = authenticator.clone();
                Ok(authenticator)
            }
            None => bail!("authenticator not found"),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.records.lock().remove(id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, a| a.is_valid_at(now));
        Ok((before - records.len()) as u64)
    }
}

// ── SQLite ──────────────────────────────────────────────────────────

/// SQLite-backed authenticator store.
///
/// All statements run on the blocking pool; the connection is shared behind
/// a mutex, which also gives per-key atomicity.
#[derive(Clone)]
pub struct SqliteAuthenticatorStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteAuthenticatorStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;

        // WAL mode for concurrent readers across processes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init_tables(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_tables(conn: &rusqlite::Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS authenticators (
                id_hash TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                last_used TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                idle_timeout_secs INTEGER,
                fingerprint TEXT,
                expires_at_ns INTEGER NOT NULL,
                idle_deadline_ns INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_authenticators_expires
                ON authenticators(expires_at_ns);
            CREATE INDEX IF NOT EXISTS idx_authenticators_idle
                ON authenticators(idle_deadline_ns);
            CREATE INDEX IF NOT EXISTS idx_authenticators_identity
                ON authenticators(identity);",
        )?;
        Ok(())
    }

    /// Number of stored records, valid or not.
    pub async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM authenticators", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    /// Remove every record belonging to one identity (e.g. "log out
    /// everywhere"). Returns how many were removed.
    pub async fn remove_all_for_identity(&self, identity: &str) -> Result<u64> {
        let identity = identity.to_owned();
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM authenticators WHERE identity = ?1",
                rusqlite::params![identity],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .context("authenticator store task panicked")?
    }
}

/// Row as stored, before the id is re-attached.
struct StoredRow {
    identity: String,
    last_used: String,
    expires_at: String,
    idle_timeout_secs: Option<i64>,
    fingerprint: Option<String>,
}

impl StoredRow {
    fn into_authenticator(self, id: String) -> Result<Authenticator> {
        let idle_timeout = self
            .idle_timeout_secs
            .map(|secs| u64::try_from(secs).map(Duration::from_secs))
            .transpose()
            .context("negative idle timeout in store")?;
        Ok(Authenticator {
            id,
            identity: self.identity,
            last_used: parse_timestamp(&self.last_used)?,
            expires_at: parse_timestamp(&self.expires_at)?,
            idle_timeout,
            fingerprint: self.fingerprint,
        })
    }
}

#[async_trait]
impl AuthenticatorStore for SqliteAuthenticatorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find(&self, id: &str) -> Result<Option<Authenticator>> {
        let id = id.to_owned();
        self.with_conn(move |conn| {
            let row = conn.query_row(
                "SELECT identity, last_used, expires_at, idle_timeout_secs, fingerprint
                 FROM authenticators WHERE id_hash = ?1",
                rusqlite::params![hash_id(&id)],
                |row| {
                    Ok(StoredRow {
                        identity: row.get(0)?,
                        last_used: row.get(1)?,
                        expires_at: row.get(2)?,
                        idle_timeout_secs: row.get(3)?,
                        fingerprint: row.get(4)?,
                    })
                },
            );

            match row {
                Ok(stored) => Ok(Some(stored.into_authenticator(id)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn add(&self, authenticator: Authenticator) -> Result<Authenticator> {
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO authenticators
                    (id_hash, identity, last_used, expires_at, idle_timeout_secs,
                     fingerprint, expires_at_ns, idle_deadline_ns)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    hash_id(&authenticator.id),
                    authenticator.identity,
                    format_timestamp(authenticator.last_used),
                    format_timestamp(authenticator.expires_at),
                    idle_timeout_column(&authenticator)?,
                    authenticator.fingerprint,
                    epoch_nanos(authenticator.expires_at),
                    authenticator.idle_deadline().map(epoch_nanos),
                ],
            );

            match result {
                Ok(_) => Ok(authenticator),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    bail!("authenticator id already exists")
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update(&self, authenticator: Authenticator) -> Result<Authenticator> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE authenticators SET
                    identity = ?2, last_used = ?3, expires_at = ?4,
                    idle_timeout_secs = ?5, fingerprint = ?6,
                    expires_at_ns = ?7, idle_deadline_ns = ?8
                 WHERE id_hash = ?1",
                rusqlite::params![
                    hash_id(&authenticator.id),
                    authenticator.identity,
                    format_timestamp(authenticator.last_used),
                    format_timestamp(authenticator.expires_at),
                    idle_timeout_column(&authenticator)?,
                    authenticator.fingerprint,
                    epoch_nanos(authenticator.expires_at),
                    authenticator.idle_deadline().map(epoch_nanos),
                ],
            )?;
            if updated == 0 {
                bail!("authenticator not found");
            }
            Ok(authenticator)
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let id_hash = hash_id(id);
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM authenticators WHERE id_hash = ?1",
                rusqlite::params![id_hash],
            )?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let now_ns = epoch_nanos(now);
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM authenticators
                 WHERE expires_at_ns <= ?1 OR idle_deadline_ns <= ?1",
                rusqlite::params![now_ns],
            )?;
            Ok(deleted as u64)
        })
        .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Hash an authenticator id for storage.
fn hash_id(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp in store: {raw}"))?
        .with_timezone(&Utc))
}

/// Nanoseconds since the epoch, clamped to the `i64` range (years 1677-2262).
fn epoch_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn idle_timeout_column(authenticator: &Authenticator) -> Result<Option<i64>> {
    let Some(idle) = authenticator.idle_timeout else {
        return Ok(None);
    };
    if idle.subsec_nanos() != 0 {
        bail!("idle timeout must be a whole number of seconds");
    }
    let secs = i64::try_from(idle.as_secs()).context("idle timeout too large to store")?;
    Ok(Some(secs))
}

// ── Tests ───────────────────────────────────────────────────────────
