#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

//! Session authenticators for web services.
//!
//! After a login, an [`Authenticator`] records who signed in, when it expires
//! and, optionally, how long it may sit idle and which device created it. It
//! reaches the client in one of two ways:
//!
//! - **stateless**: the whole record, serialized and optionally sealed with
//!   AES-256-GCM
//! - **stateful**: an opaque id pointing at an [`auth::AuthenticatorStore`]
//!   record
//!
//! [`auth::AuthenticatorService`] drives the lifecycle in either mode.

pub mod auth;
pub mod authenticator;
pub mod config;
pub mod security;
pub mod transport;

pub use auth::{create_service, AuthenticatorError, AuthenticatorService, TokenUpdate};
pub use authenticator::{Authenticator, TokenCodec, TouchOutcome};
pub use config::Config;
pub use transport::{RequestContext, TokenTransport, TokenValue};
