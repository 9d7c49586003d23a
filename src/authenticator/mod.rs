//! The authenticator value object and its validity rules.
//!
//! An [`Authenticator`] proves that a login already happened. It is handed to
//! the client either whole (stateless mode, see [`codec`]) or as an opaque id
//! pointing at a store record (stateful mode).
//!
//! Validity is a pure function of the record and the current time:
//! - expired once `now >= expires_at`
//! - idle-timed-out once `now >= last_used + idle_timeout` (when set)

pub mod codec;

pub use codec::{DecodeError, EncodeError, TokenCodec};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A session token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticator {
    /// Opaque unique id. Store key in stateful mode.
    pub id: String,
    /// Opaque reference to the authenticated principal.
    pub identity: String,
    /// Last successful use. Only moves forward when an idle timeout is set.
    pub last_used: DateTime<Utc>,
    /// Absolute expiry, fixed at creation.
    pub expires_at: DateTime<Utc>,
    /// Sliding-window idle timeout.
    #[serde(default, with = "idle_timeout_secs", skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<Duration>,
    /// Device fingerprint captured at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Authenticator {
    /// Whether the absolute expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the idle timeout (if any) has elapsed since the last use.
    pub fn is_timed_out_at(&self, now: DateTime<Utc>) -> bool {
        match self.idle_deadline() {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Valid iff neither expired nor idle-timed-out.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && !self.is_timed_out_at(now)
    }

    /// Copy of this authenticator marked as used at `now`.
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_used: now,
            ..self.clone()
        }
    }

    /// Point in time at which the idle timeout fires.
    ///
    /// A timeout too large to represent never fires.
    pub fn idle_deadline(&self) -> Option<DateTime<Utc>> {
        let timeout = chrono::Duration::from_std(self.idle_timeout?).ok()?;
        self.last_used.checked_add_signed(timeout)
    }
}

/// Result of [`crate::auth::AuthenticatorService::touch`].
///
/// `Touched` carries a copy that must be persisted (stateful) or re-embedded
/// (stateless). `Unchanged` needs no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched(Authenticator),
    Unchanged(Authenticator),
}

impl TouchOutcome {
    /// Whether the caller has to run an update.
    pub fn needs_update(&self) -> bool {
        matches!(self, Self::Touched(_))
    }

    /// The authenticator, touched or not.
    pub fn authenticator(&self) -> &Authenticator {
        match self {
            Self::Touched(a) | Self::Unchanged(a) => a,
        }
    }

    pub fn into_inner(self) -> Authenticator {
        match self {
            Self::Touched(a) | Self::Unchanged(a) => a,
        }
    }
}

/// Idle timeout as whole seconds in the serialized document.
///
/// Fractional seconds are refused rather than truncated.
mod idle_timeout_secs {
    use serde::{ser::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) if d.subsec_nanos() != 0 => Err(S::Error::custom(
                "idle timeout must be a whole number of seconds",
            )),
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
