//! Errors surfaced by [`super::AuthenticatorService`].
//!
//! Each variant wraps an unexpected collaborator failure (store, id or
//! fingerprint generator, codec). Missing, unknown, corrupt or mismatched
//! tokens are not errors; they come back as `Ok(None)`.

#[derive(Debug, thiserror::Error)]
pub enum AuthenticatorError {
    #[error("could not create authenticator")]
    Creation(#[source] anyhow::Error),
    #[error("could not retrieve authenticator")]
    Retrieval(#[source] anyhow::Error),
    #[error("could not initialize authenticator")]
    Initialization(#[source] anyhow::Error),
    #[error("could not update authenticator")]
    Update(#[source] anyhow::Error),
    #[error("could not renew authenticator")]
    Renewal(#[source] anyhow::Error),
    #[error("could not discard authenticator")]
    Discard(#[source] anyhow::Error),
}

impl AuthenticatorError {
    /// Lifecycle step that failed, for structured logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Creation(_) => "create",
            Self::Retrieval(_) => "retrieve",
            Self::Initialization(_) => "init",
            Self::Update(_) => "update",
            Self::Renewal(_) => "renew",
            Self::Discard(_) => "discard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn source_is_preserved() {
        let err = AuthenticatorError::Update(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "could not update authenticator");
        assert_eq!(err.source().unwrap().to_string(), "disk full");
        assert_eq!(err.operation(), "update");
    }
}
