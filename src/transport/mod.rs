//! Moving token values in and out of HTTP messages.
//!
//! The service never touches headers directly. It asks a [`TokenTransport`]
//! to extract the raw value from a [`RequestContext`] and to embed or drop a
//! [`TokenValue`] on the outgoing response headers. The value is either a
//! full serialized authenticator or a short store id; transports don't care.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// What the service needs to know about an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: HeaderMap,
    pub remote_addr: Option<IpAddr>,
}

impl RequestContext {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            remote_addr: None,
        }
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Client address: first `X-Forwarded-For` / `X-Real-IP` entry, else the
    /// socket peer.
    pub fn client_address(&self) -> Option<String> {
        for header_name in ["X-Forwarded-For", "X-Real-IP"] {
            if let Some(value) = self.header(header_name) {
                let first = value.split(',').next().unwrap_or("").trim();
                if !first.is_empty() {
                    return Some(first.to_owned());
                }
            }
        }
        self.remote_addr.map(|ip| ip.to_string())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self {
            headers: parts.headers.clone(),
            remote_addr,
        })
    }
}

/// A token as handed to the transport: a store id or a serialized record.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenValue(String);

impl TokenValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for TokenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenValue(<{} chars>)", self.0.len())
    }
}

/// Carries token values between requests and responses.
pub trait TokenTransport: Send + Sync {
    /// Raw token value from the request. `None` when absent.
    fn extract(&self, request: &RequestContext) -> Option<String>;

    /// Attach or replace the token value on the response.
    fn embed(&self, value: &TokenValue, response: &mut HeaderMap) -> anyhow::Result<()>;

    /// Drop the token value from the response.
    fn discard(&self, response: &mut HeaderMap);
}

/// Token in a named header, with `Authorization: Bearer` accepted on input.
#[derive(Debug, Clone)]
pub struct HeaderTransport {
    header: HeaderName,
}

impl HeaderTransport {
    pub fn new(header_name: &str) -> anyhow::Result<Self> {
        let header = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid token header name '{header_name}': {e}"))?;
        Ok(Self { header })
    }
}

impl TokenTransport for HeaderTransport {
    fn extract(&self, request: &RequestContext) -> Option<String> {
        request
            .header(&self.header)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| extract_bearer_token(&request.headers))
            .map(str::to_owned)
    }

    fn embed(&self, value: &TokenValue, response: &mut HeaderMap) -> anyhow::Result<()> {
        let mut header_value = HeaderValue::from_str(value.as_str())?;
        header_value.set_sensitive(true);
        response.insert(self.header.clone(), header_value);
        Ok(())
    }

    fn discard(&self, response: &mut HeaderMap) {
        response.remove(&self.header);
    }
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
