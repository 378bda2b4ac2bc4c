//! Authorization for the stats viewer.
//!
//! The viewer accepts the configured password either as a bearer token or
//! as a `password` form/query field. Session cookies are not issued here.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};

use crate::config::schema::PLACEHOLDER_STATS_PASSWORD;

/// Decides whether a stats request may read stored results.
pub trait StatsGate: Send + Sync {
    /// False when no usable password was configured.
    fn is_configured(&self) -> bool;

    fn authorize(&self, headers: &HeaderMap, params: &HashMap<String, String>) -> bool;
}

/// Gate backed by the `statistics_password` setting.
#[derive(Debug, Clone)]
pub struct PasswordGate {
    password: String,
}

impl PasswordGate {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        let expected = self.password.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl StatsGate for PasswordGate {
    fn is_configured(&self) -> bool {
        !self.password.is_empty() && self.password != PLACEHOLDER_STATS_PASSWORD
    }

    fn authorize(&self, headers: &HeaderMap, params: &HashMap<String, String>) -> bool {
        if !self.is_configured() {
            return false;
        }

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        bearer.is_some_and(|token| self.matches(token))
            || params.get("password").is_some_and(|p| self.matches(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn placeholder_password_is_never_configured() {
        let gate = PasswordGate::new(PLACEHOLDER_STATS_PASSWORD);
        assert!(!gate.is_configured());
        assert!(!gate.authorize(&HeaderMap::new(), &params(&[("password", "PASSWORD")])));
        assert!(!PasswordGate::new("").is_configured());
    }

    #[test]
    fn bearer_token_and_form_field_both_work() {
        let gate = PasswordGate::new("s3cret");

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(gate.authorize(&headers, &HashMap::new()));

        assert!(gate.authorize(&HeaderMap::new(), &params(&[("password", "s3cret")])));
    }

    #[test]
    fn wrong_credentials_are_rejected() {
        let gate = PasswordGate::new("s3cret");

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic s3cret"));
        assert!(!gate.authorize(&headers, &HashMap::new()));
        assert!(!gate.authorize(&HeaderMap::new(), &params(&[("password", "s3cre")])));
        assert!(!gate.authorize(&HeaderMap::new(), &HashMap::new()));
    }
}
