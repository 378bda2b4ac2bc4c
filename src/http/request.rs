//! Request inspection helpers.
//!
//! # Responsibilities
//! - Determine the effective client address for a request
//! - Read query and form parameters without rejecting odd input
//!
//! # Design Decisions
//! - The connection address comes from `ConnectInfo`, already PROXY-unwrapped
//! - Forwarding headers are honored only when configured, and only when they
//!   carry a parseable IP address
//! - Duplicate query keys resolve to the first occurrence

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, StatusCode};

use crate::http::state::AppState;

/// Forwarding headers consulted in priority order.
pub const REAL_IP_HEADERS: [HeaderName; 2] = [
    HeaderName::from_static("true-client-ip"),
    HeaderName::from_static("x-real-ip"),
];

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Effective client address, formatted without a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn resolve(peer: SocketAddr, headers: &HeaderMap, trust_headers: bool) -> Self {
        let ip = trust_headers
            .then(|| forwarded_ip(headers))
            .flatten()
            .unwrap_or_else(|| peer.ip());
        Self(ip.to_canonical().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "missing connection info"))?;
        Ok(Self::resolve(peer, &parts.headers, state.trust_forwarded_headers))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    for name in &REAL_IP_HEADERS {
        if let Some(ip) = header_ip(headers, name, |v| v) {
            return Some(ip);
        }
    }
    header_ip(headers, &X_FORWARDED_FOR, |v| v.split(',').next().unwrap_or(v))
}

fn header_ip(headers: &HeaderMap, name: &HeaderName, select: impl Fn(&str) -> &str) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    select(value).trim().parse().ok()
}

/// First value of `key` in an `application/x-www-form-urlencoded` string.
pub fn first_param(encoded: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Merge urlencoded pairs into `params`, keeping earlier values on conflict.
pub fn collect_params(params: &mut HashMap<String, String>, encoded: &[u8]) {
    for (key, value) in url::form_urlencoded::parse(encoded) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.5:41234".parse().unwrap()
    }

    #[test]
    fn peer_address_without_headers() {
        let ip = ClientIp::resolve(peer(), &HeaderMap::new(), true);
        assert_eq!(ip.as_str(), "10.0.0.5");
    }

    #[test]
    fn mapped_ipv6_peer_is_unmapped() {
        let peer: SocketAddr = "[::ffff:8.8.8.8]:443".parse().unwrap();
        assert_eq!(ClientIp::resolve(peer, &HeaderMap::new(), false).as_str(), "8.8.8.8");
    }

    #[test]
    fn header_priority() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(ClientIp::resolve(peer(), &headers, true).as_str(), "203.0.113.9");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(ClientIp::resolve(peer(), &headers, true).as_str(), "198.51.100.7");

        headers.insert("true-client-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(ClientIp::resolve(peer(), &headers, true).as_str(), "2001:db8::1");
    }

    #[test]
    fn headers_ignored_when_untrusted_or_invalid() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(ClientIp::resolve(peer(), &headers, false).as_str(), "10.0.0.5");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(ClientIp::resolve(peer(), &headers, true).as_str(), "10.0.0.5");
    }

    #[test]
    fn query_helpers() {
        assert_eq!(first_param(Some("ckSize=8&ckSize=2"), "ckSize").as_deref(), Some("8"));
        assert_eq!(first_param(Some("isp=true"), "ckSize"), None);
        assert_eq!(first_param(None, "ckSize"), None);

        let mut params = HashMap::new();
        collect_params(&mut params, b"id=L100&password=a%20b");
        collect_params(&mut params, b"id=other");
        assert_eq!(params["id"], "L100");
        assert_eq!(params["password"], "a b");
    }
}
