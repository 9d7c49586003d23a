//! Request fingerprinting for device-bound authenticators.
//!
//! A fingerprint is a SHA-256 over request characteristics that stay stable
//! for one browser/device: user agent, accept-language, accept-charset and,
//! optionally, the client address. It is captured at creation and compared on
//! every retrieval.

use crate::transport::RequestContext;
use async_trait::async_trait;
use axum::http::header;
use sha2::{Digest, Sha256};

/// Derives a stable string from the current request.
#[async_trait]
pub trait FingerprintGenerator: Send + Sync {
    async fn generate(&self, request: &RequestContext) -> anyhow::Result<String>;
}

/// Default fingerprint generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestFingerprinter {
    include_remote_address: bool,
}

impl RequestFingerprinter {
    pub fn new(include_remote_address: bool) -> Self {
        Self {
            include_remote_address,
        }
    }

    /// Raw characteristics joined with `|`, before hashing.
    fn collect(&self, request: &RequestContext) -> String {
        let address = if self.include_remote_address {
            request.client_address()
        } else {
            None
        };

        let mut parts: Vec<&str> = [
            header::USER_AGENT,
            header::ACCEPT_LANGUAGE,
            header::ACCEPT_CHARSET,
        ]
        .iter()
        .map(|name| request.header(name).unwrap_or(""))
        .collect();

        if let Some(ref address) = address {
            parts.push(address);
        }

        parts.join("|")
    }
}

#[async_trait]
impl FingerprintGenerator for RequestFingerprinter {
    async fn generate(&self, request: &RequestContext) -> anyhow::Result<String> {
        let digest = Sha256::digest(self.collect(request).as_bytes());
        Ok(hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use std::net::{IpAddr, Ipv4Addr};

    fn browser(user_agent: &'static str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(user_agent));
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("ko-KR"));
        RequestContext::new(headers)
    }

    #[tokio::test]
    async fn fingerprint_is_deterministic() {
        let fp = RequestFingerprinter::default();
        let a = fp.generate(&browser("Firefox/128")).await.unwrap();
        let b = fp.generate(&browser("Firefox/128")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn different_devices_differ() {
        let fp = RequestFingerprinter::default();
        let a = fp.generate(&browser("Firefox/128")).await.unwrap();
        let b = fp.generate(&browser("Safari/17")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn remote_address_only_counts_when_enabled() {
        let home = browser("Firefox/128").with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let cafe = browser("Firefox/128").with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        let without = RequestFingerprinter::new(false);
        assert_eq!(
            without.generate(&home).await.unwrap(),
            without.generate(&cafe).await.unwrap()
        );

        let with = RequestFingerprinter::new(true);
        assert_ne!(
            with.generate(&home).await.unwrap(),
            with.generate(&cafe).await.unwrap()
        );
    }

    #[test]
    fn collect_joins_parts() {
        let fp = RequestFingerprinter::new(true);
        let ctx = browser("Firefox/128").with_remote_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(fp.collect(&ctx), "Firefox/128|ko-KR||127.0.0.1");
    }
}
