//! Client identity for rate limiting.
//!
//! The rate limiter only needs a string partition key per request. How that
//! key is derived is pluggable: the TCP peer address for direct exposure, or a
//! header written by a trusted proxy in front of the gate.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, Request},
};

use crate::config::{ClientKeyConfig, ValidationError};

/// Key used when no identity can be derived.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derives the partition key of a request.
pub trait ClientKey: Send + Sync + 'static {
    fn key(&self, request: &Request<Body>) -> String;
}

impl<F> ClientKey for F
where
    F: Fn(&Request<Body>) -> String + Send + Sync + 'static,
{
    fn key(&self, request: &Request<Body>) -> String {
        self(request)
    }
}

/// IP address of the connected peer, from axum's `ConnectInfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr;

impl ClientKey for PeerAddr {
    fn key(&self, request: &Request<Body>) -> String {
        peer_ip(request).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// First entry of a proxy-supplied header such as `X-Forwarded-For`,
/// falling back to the peer address when the header is absent.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    name: HeaderName,
}

impl HeaderKey {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl ClientKey for HeaderKey {
    fn key(&self, request: &Request<Body>) -> String {
        request
            .headers()
            .get(&self.name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| PeerAddr.key(request))
    }
}

fn peer_ip(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Build the configured strategy.
pub fn from_config(config: &ClientKeyConfig) -> Result<Arc<dyn ClientKey>, ValidationError> {
    match config {
        ClientKeyConfig::Peer => Ok(Arc::new(PeerAddr)),
        ClientKeyConfig::Header { name } => {
            let header = HeaderName::try_from(name.as_str())
                .map_err(|_| ValidationError::InvalidClientKeyHeader(name.clone()))?;
            Ok(Arc::new(HeaderKey::new(header)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_from(peer: Option<&str>, forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = peer {
            let addr: SocketAddr = addr.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_peer_addr_uses_ip_only() {
        let request = request_from(Some("192.0.2.7:51234"), None);
        assert_eq!(PeerAddr.key(&request), "192.0.2.7");
    }

    #[test]
    fn test_peer_addr_without_connect_info() {
        assert_eq!(PeerAddr.key(&request_from(None, None)), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_header_key_takes_first_hop() {
        let key = from_config(&ClientKeyConfig::Header {
            name: "X-Forwarded-For".into(),
        })
        .unwrap();
        let request = request_from(Some("10.0.0.1:80"), Some(" 203.0.113.9 , 10.0.0.1"));
        assert_eq!(key.key(&request), "203.0.113.9");
    }

    #[test]
    fn test_header_key_falls_back_to_peer() {
        let key = HeaderKey::new(HeaderName::from_static("x-forwarded-for"));
        let request = request_from(Some("10.0.0.1:80"), Some(""));
        assert_eq!(key.key(&request), "10.0.0.1");
    }

    #[test]
    fn test_closure_key() {
        let key = |request: &Request<Body>| request.uri().path().to_string();
        assert_eq!(ClientKey::key(&key, &request_from(None, None)), "/");
    }

    #[test]
    fn test_invalid_header_name() {
        assert!(from_config(&ClientKeyConfig::Header { name: "bad header".into() }).is_err());
    }
}
