//! The authenticator lifecycle: create, retrieve, init, touch, update,
//! renew, discard.
//!
//! ## Flow
//!
//! 1. After a successful login: `create` → `init` → `embed`
//! 2. On each request: `retrieve` → `is_valid` → `touch` → `update` when
//!    touched (or all of it at once through `authenticate`)
//! 3. On privilege change: `renew_and_embed`
//! 4. On logout: `discard`
//!
//! Missing, unknown, undecodable and fingerprint-mismatched tokens are
//! `Ok(None)` and logged at info. Only collaborator failures are errors.

use super::error::AuthenticatorError;
use super::mode::{log_id, StatefulMode, StatelessMode, TokenMode, TokenUpdate};
use super::traits::{AuthenticatorStore, Clock, IdGenerator, SystemClock, UuidIdGenerator};
use crate::authenticator::{Authenticator, TokenCodec, TouchOutcome};
use crate::config::AuthenticatorConfig;
use crate::security::fingerprint::{FingerprintGenerator, RequestFingerprinter};
use crate::transport::{HeaderTransport, RequestContext, TokenTransport, TokenValue};
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default absolute lifetime: 12 hours.
const DEFAULT_EXPIRY_SECS: u64 = 12 * 3600;

/// Default token header.
pub const DEFAULT_TOKEN_NAME: &str = "X-Auth-Token";

/// Lifetime and binding policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorSettings {
    /// Absolute lifetime from creation.
    pub expiry: Duration,
    /// Sliding idle window. `None` disables touching.
    pub idle_timeout: Option<Duration>,
    /// Bind authenticators to the creating request's fingerprint.
    pub use_fingerprinting: bool,
}

impl Default for AuthenticatorSettings {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(DEFAULT_EXPIRY_SECS),
            idle_timeout: None,
            use_fingerprinting: true,
        }
    }
}

impl AuthenticatorSettings {
    pub fn from_config(config: &AuthenticatorConfig) -> Self {
        Self {
            expiry: Duration::from_secs(config.expiry_secs),
            idle_timeout: config.idle_timeout_secs.map(Duration::from_secs),
            use_fingerprinting: config.use_fingerprinting,
        }
    }
}

/// Issues and validates authenticators in stateless or stateful mode.
pub struct AuthenticatorService {
    settings: AuthenticatorSettings,
    expiry: chrono::Duration,
    mode: Arc<dyn TokenMode>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    fingerprinter: Arc<dyn FingerprintGenerator>,
    transport: Arc<dyn TokenTransport>,
}

impl std::fmt::Debug for AuthenticatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatorService")
            .field("settings", &self.settings)
            .field("mode", &self.mode.name())
            .finish_non_exhaustive()
    }
}

impl AuthenticatorService {
    pub fn builder(settings: AuthenticatorSettings) -> AuthenticatorServiceBuilder {
        AuthenticatorServiceBuilder::new(settings)
    }

    /// `"stateless"` or `"stateful"`.
    pub fn mode_name(&self) -> &str {
        self.mode.name()
    }

    /// Validity against the service clock.
    pub fn is_valid(&self, authenticator: &Authenticator) -> bool {
        authenticator.is_valid_at(self.clock.now())
    }

    /// Build a new authenticator for an identity that just logged in.
    pub async fn create(
        &self,
        identity: &str,
        request: &RequestContext,
    ) -> Result<Authenticator, AuthenticatorError> {
        let now = self.clock.now();
        let id = self
            .ids
            .generate()
            .await
            .map_err(AuthenticatorError::Creation)?;

        let fingerprint = if self.settings.use_fingerprinting {
            Some(
                self.fingerprinter
                    .generate(request)
                    .await
                    .map_err(AuthenticatorError::Creation)?,
            )
        } else {
            None
        };

        let expires_at = now.checked_add_signed(self.expiry).ok_or_else(|| {
            AuthenticatorError::Creation(anyhow::anyhow!("expiry overflows the calendar"))
        })?;

        tracing::debug!(mode = self.mode.name(), "Authenticator created");

        Ok(Authenticator {
            id,
            identity: identity.to_owned(),
            last_used: now,
            expires_at,
            idle_timeout: self.settings.idle_timeout,
            fingerprint,
        })
    }

    /// Authenticator carried by the request, if any.
    ///
    /// Validity is not checked here; see [`Self::is_valid`] and
    /// [`Self::authenticate`].
    pub async fn retrieve(
        &self,
        request: &RequestContext,
    ) -> Result<Option<Authenticator>, AuthenticatorError> {
        let Some(raw) = self.transport.extract(request) else {
            tracing::info!(mode = self.mode.name(), "No authenticator in request");
            return Ok(None);
        };

        let Some(authenticator) = self
            .mode
            .resolve(&raw)
            .await
            .map_err(AuthenticatorError::Retrieval)?
        else {
            return Ok(None);
        };

        if self.settings.use_fingerprinting {
            if let Some(stored) = authenticator.fingerprint.as_deref() {
                let current = self
                    .fingerprinter
                    .generate(request)
                    .await
                    .map_err(AuthenticatorError::Retrieval)?;
                if !constant_time_eq(current.as_bytes(), stored.as_bytes()) {
                    tracing::info!(
                        mode = self.mode.name(),
                        reason = "fingerprint_mismatch",
                        "Authenticator rejected: fingerprint does not match request"
                    );
                    return Ok(None);
                }
            }
        }

        Ok(Some(authenticator))
    }

    /// Resolve a raw token value without a request, for administrative
    /// tools. No fingerprint check is made.
    pub async fn resolve_token(
        &self,
        raw: &str,
    ) -> Result<Option<Authenticator>, AuthenticatorError> {
        self.mode
            .resolve(raw.trim())
            .await
            .map_err(AuthenticatorError::Retrieval)
    }

    /// Persist (stateful) or serialize (stateless) a new authenticator and
    /// return the value to hand to the client.
    pub async fn init(
        &self,
        authenticator: &Authenticator,
    ) -> Result<TokenValue, AuthenticatorError> {
        let value = self
            .mode
            .init(authenticator)
            .await
            .map_err(AuthenticatorError::Initialization)?;
        tracing::debug!(mode = self.mode.name(), "Authenticator initialized");
        Ok(value)
    }

    /// Attach a token value to the response.
    pub fn embed(
        &self,
        value: &TokenValue,
        response: &mut HeaderMap,
    ) -> Result<(), AuthenticatorError> {
        self.transport
            .embed(value, response)
            .map_err(AuthenticatorError::Initialization)
    }

    /// Slide the idle window. Only touches when an idle timeout is set.
    pub fn touch(&self, authenticator: Authenticator) -> TouchOutcome {
        if self.settings.idle_timeout.is_some() {
            TouchOutcome::Touched(authenticator.touched(self.clock.now()))
        } else {
            TouchOutcome::Unchanged(authenticator)
        }
    }

    /// Write back a touched authenticator.
    pub async fn update(
        &self,
        authenticator: &Authenticator,
    ) -> Result<TokenUpdate, AuthenticatorError> {
        self.mode
            .update(authenticator)
            .await
            .map_err(AuthenticatorError::Update)
    }

    /// Invalidate `authenticator` and issue a fresh one for the same
    /// identity. In stateless mode the old token cannot be invalidated and
    /// simply stops being sent; the caller must replace the client's value.
    pub async fn renew(
        &self,
        authenticator: &Authenticator,
        request: &RequestContext,
    ) -> Result<Authenticator, AuthenticatorError> {
        self.mode
            .revoke(authenticator)
            .await
            .map_err(AuthenticatorError::Renewal)?;

        let renewed = self
            .create(&authenticator.identity, request)
            .await
            .map_err(|e| AuthenticatorError::Renewal(e.into()))?;

        tracing::info!(
            mode = self.mode.name(),
            old = %log_id(&authenticator.id),
            "Authenticator renewed"
        );
        Ok(renewed)
    }

    /// [`Self::renew`], then init the new authenticator and replace the
    /// value on the response.
    pub async fn renew_and_embed(
        &self,
        authenticator: &Authenticator,
        request: &RequestContext,
        response: &mut HeaderMap,
    ) -> Result<(Authenticator, TokenValue), AuthenticatorError> {
        let renewed = self.renew(authenticator, request).await?;
        let value = self
            .mode
            .init(&renewed)
            .await
            .map_err(AuthenticatorError::Renewal)?;
        self.transport
            .embed(&value, response)
            .map_err(AuthenticatorError::Renewal)?;
        Ok((renewed, value))
    }

    /// Revoke an authenticator and tell the transport to drop it.
    ///
    /// Stateless tokens already held by a client remain decodable until
    /// they expire.
    pub async fn discard(
        &self,
        authenticator: &Authenticator,
        response: &mut HeaderMap,
    ) -> Result<(), AuthenticatorError> {
        self.mode
            .revoke(authenticator)
            .await
            .map_err(AuthenticatorError::Discard)?;
        self.transport.discard(response);
        tracing::debug!(mode = self.mode.name(), "Authenticator discarded");
        Ok(())
    }

    /// Per-request convenience: retrieve, check validity, touch and update.
    ///
    /// Invalid stateful records are removed best-effort. When the token
    /// content changed the new value is embedded in `response`.
    pub async fn authenticate(
        &self,
        request: &RequestContext,
        response: &mut HeaderMap,
    ) -> Result<Option<Authenticator>, AuthenticatorError> {
        let Some(authenticator) = self.retrieve(request).await? else {
            return Ok(None);
        };

        if !self.is_valid(&authenticator) {
            tracing::info!(
                mode = self.mode.name(),
                reason = "expired",
                "Authenticator rejected: expired or idle-timed-out"
            );
            if let Err(e) = self.mode.revoke(&authenticator).await {
                tracing::warn!("Failed to reclaim invalid authenticator: {e}");
            }
            self.transport.discard(response);
            return Ok(None);
        }

        let authenticator = match self.touch(authenticator) {
            TouchOutcome::Unchanged(a) => a,
            TouchOutcome::Touched(a) => {
                if let TokenUpdate::Replace(value) = self.update(&a).await? {
                    self.transport
                        .embed(&value, response)
                        .map_err(AuthenticatorError::Update)?;
                }
                a
            }
        };

        Ok(Some(authenticator))
    }

    /// Remove store records that are no longer valid. Always 0 in
    /// stateless mode.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        self.mode.purge_expired(self.clock.now()).await
    }
}

/// Periodically purge expired records until the returned handle is aborted.
pub fn spawn_purge_task(service: Arc<AuthenticatorService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match service.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Swept expired authenticators"),
                Err(e) => tracing::warn!("Authenticator sweep failed: {e}"),
            }
        }
    })
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ── Builder ─────────────────────────────────────────────────────────

enum Backing {
    Stateless(TokenCodec),
    Stateful(Arc<dyn AuthenticatorStore>),
}

/// Wires collaborators into an [`AuthenticatorService`].
///
/// Exactly one of [`Self::stateless`] / [`Self::stateful`] must be chosen.
/// Everything else has a default.
pub struct AuthenticatorServiceBuilder {
    settings: AuthenticatorSettings,
    backing: Option<Backing>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    fingerprinter: Option<Arc<dyn FingerprintGenerator>>,
    transport: Option<Arc<dyn TokenTransport>>,
}

impl AuthenticatorServiceBuilder {
    fn new(settings: AuthenticatorSettings) -> Self {
        Self {
            settings,
            backing: None,
            clock: None,
            ids: None,
            fingerprinter: None,
            transport: None,
        }
    }

    pub fn stateless(mut self, codec: TokenCodec) -> Self {
        self.backing = Some(Backing::Stateless(codec));
        self
    }

    pub fn stateful(mut self, store: Arc<dyn AuthenticatorStore>) -> Self {
        self.backing = Some(Backing::Stateful(store));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn fingerprint_generator(mut self, fingerprinter: Arc<dyn FingerprintGenerator>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn TokenTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> anyhow::Result<AuthenticatorService> {
        let mode: Arc<dyn TokenMode> = match self.backing {
            Some(Backing::Stateless(codec)) => Arc::new(StatelessMode::new(codec)),
            Some(Backing::Stateful(store)) => Arc::new(StatefulMode::new(store)),
            None => anyhow::bail!("choose stateless (codec) or stateful (store) mode"),
        };

        if self.settings.expiry.is_zero() {
            anyhow::bail!("authenticator expiry must be greater than zero");
        }
        if self.settings.expiry.subsec_nanos() != 0 {
            anyhow::bail!("authenticator expiry must be a whole number of seconds");
        }
        if let Some(idle) = self.settings.idle_timeout {
            if idle.is_zero() {
                anyhow::bail!("idle timeout must be greater than zero when set");
            }
            if idle.subsec_nanos() != 0 {
                anyhow::bail!("idle timeout must be a whole number of seconds");
            }
            if i64::try_from(idle.as_secs()).is_err() {
                anyhow::bail!("idle timeout is out of range");
            }
        }
        let expiry = chrono::Duration::from_std(self.settings.expiry)
            .map_err(|_| anyhow::anyhow!("authenticator expiry is out of range"))?;

        let transport: Arc<dyn TokenTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HeaderTransport::new(DEFAULT_TOKEN_NAME)?),
        };

        Ok(AuthenticatorService {
            settings: self.settings,
            expiry,
            mode,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidIdGenerator)),
            fingerprinter: self
                .fingerprinter
                .unwrap_or_else(|| Arc::new(RequestFingerprinter::default())),
            transport,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
