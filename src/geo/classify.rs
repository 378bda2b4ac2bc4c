//! Caller address classification.
//!
//! Matching is textual and ordered; the first rule that matches wins.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static PRIVATE_172: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^172\.(1[6-9]|2\d|3[01])\.").expect("valid regex"));

// Second-octet bounds are kept as deployed (60-99, 100-107, 110-117, 120-127),
// which is not the RFC 6598 100.64.0.0/10 block.
static CGNAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^100\.([6-9][0-9]|1[0-2][0-7])\.").expect("valid regex"));

/// IP family of a loopback address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// Category of a caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientClassification {
    Loopback(IpFamily),
    LinkLocalV6,
    PrivateV4,
    LinkLocalV4,
    Cgnat,
    Public,
}

impl ClientClassification {
    /// Classify a textual address.
    pub fn of(address: &str) -> Self {
        let address = normalize_address(address);

        if address == "::1" {
            Self::Loopback(IpFamily::V6)
        } else if address.starts_with("fe80:") {
            Self::LinkLocalV6
        } else if address.starts_with("127.") {
            Self::Loopback(IpFamily::V4)
        } else if address.starts_with("10.") || PRIVATE_172.is_match(address) || address.starts_with("192.168.") {
            Self::PrivateV4
        } else if address.starts_with("169.254.") {
            Self::LinkLocalV4
        } else if CGNAT.is_match(address) {
            Self::Cgnat
        } else {
            Self::Public
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }

    /// Human readable suffix used in `/getIP` responses.
    pub fn description(&self) -> Option<&'static str> {
        match self {
            Self::Loopback(IpFamily::V6) => Some("localhost IPv6 access"),
            Self::LinkLocalV6 => Some("link-local IPv6 access"),
            Self::Loopback(IpFamily::V4) => Some("localhost IPv4 access"),
            Self::PrivateV4 => Some("private IPv4 access"),
            Self::LinkLocalV4 => Some("link-local IPv4 access"),
            Self::Cgnat => Some("CGNAT IPv4 access"),
            Self::Public => None,
        }
    }
}

impl fmt::Display for ClientClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description().unwrap_or("public access"))
    }
}

/// Strip an IPv4-mapped IPv6 prefix so the IPv4 rules can match.
pub fn normalize_address(address: &str) -> &str {
    address.strip_prefix("::ffff:").unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        let cases = [
            ("::1", ClientClassification::Loopback(IpFamily::V6)),
            ("fe80::1", ClientClassification::LinkLocalV6),
            ("127.0.0.1", ClientClassification::Loopback(IpFamily::V4)),
            ("10.1.2.3", ClientClassification::PrivateV4),
            ("172.16.0.1", ClientClassification::PrivateV4),
            ("172.20.0.1", ClientClassification::PrivateV4),
            ("172.31.255.1", ClientClassification::PrivateV4),
            ("172.15.0.1", ClientClassification::Public),
            ("172.32.0.1", ClientClassification::Public),
            ("192.168.1.1", ClientClassification::PrivateV4),
            ("169.254.1.1", ClientClassification::LinkLocalV4),
            ("8.8.8.8", ClientClassification::Public),
            ("2001:4860:4860::8888", ClientClassification::Public),
        ];

        for (input, expected) in cases {
            assert_eq!(ClientClassification::of(input), expected, "input {input}");
        }
    }

    #[test]
    fn cgnat_uses_literal_bounds() {
        assert_eq!(ClientClassification::of("100.64.0.1"), ClientClassification::Cgnat);
        assert_eq!(ClientClassification::of("100.99.0.1"), ClientClassification::Cgnat);
        assert_eq!(ClientClassification::of("100.127.0.1"), ClientClassification::Cgnat);
        assert_eq!(ClientClassification::of("100.60.0.1"), ClientClassification::Cgnat);
        assert_eq!(ClientClassification::of("100.108.0.1"), ClientClassification::Public);
        assert_eq!(ClientClassification::of("100.128.0.1"), ClientClassification::Public);
        assert_eq!(ClientClassification::of("100.5.0.1"), ClientClassification::Public);
    }

    #[test]
    fn mapped_addresses_are_stripped() {
        assert_eq!(
            ClientClassification::of("::ffff:192.168.0.10"),
            ClientClassification::PrivateV4
        );
        assert_eq!(ClientClassification::of("::ffff:1.1.1.1"), ClientClassification::Public);
    }

    #[test]
    fn only_public_has_no_description() {
        assert!(ClientClassification::Public.description().is_none());
        assert_eq!(
            ClientClassification::Cgnat.description(),
            Some("CGNAT IPv4 access")
        );
    }
}
