//! CIDR allow-list for upstreams trusted to send PROXY protocol headers.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use thiserror::Error;

/// A CIDR entry that failed to parse.
#[derive(Debug, Clone, Error)]
#[error("invalid CIDR {entry:?}: {reason}")]
pub struct AllowListError {
    pub entry: String,
    pub reason: String,
}

/// Ordered set of networks allowed to supply a PROXY header.
///
/// An empty list trusts every peer.
#[derive(Debug, Clone, Default)]
pub struct ProxyAllowList {
    networks: Vec<IpNetwork>,
}

impl ProxyAllowList {
    /// A list that trusts every upstream.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse CIDR strings. A bare address is treated as a host route.
    pub fn from_cidrs<S: AsRef<str>>(entries: &[S]) -> Result<Self, AllowListError> {
        let networks = entries
            .iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry.parse::<IpNetwork>().map_err(|e| AllowListError {
                    entry: entry.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    /// Whether `peer` may supply a PROXY header.
    ///
    /// Only the immediate peer address is considered, never header content.
    /// IPv4-mapped IPv6 peers are matched as IPv4.
    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        if self.networks.is_empty() {
            return true;
        }
        let peer = peer.to_canonical();
        self.networks.iter().any(|network| network.contains(peer))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_trusts_everyone() {
        let list = ProxyAllowList::allow_all();
        assert!(list.is_trusted("203.0.113.9".parse().unwrap()));
        assert!(list.is_trusted("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn matches_configured_networks() {
        let list = ProxyAllowList::from_cidrs(&["10.0.0.0/8", "::1/128", "192.0.2.7"]).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.is_trusted("10.20.30.40".parse().unwrap()));
        assert!(list.is_trusted("::1".parse().unwrap()));
        assert!(list.is_trusted("192.0.2.7".parse().unwrap()));
        assert!(!list.is_trusted("192.0.2.8".parse().unwrap()));
        assert!(!list.is_trusted("11.0.0.1".parse().unwrap()));
    }

    #[test]
    fn mapped_ipv4_peer_matches_ipv4_range() {
        let list = ProxyAllowList::from_cidrs(&["127.0.0.1/32"]).unwrap();
        assert!(list.is_trusted("::ffff:127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn rejects_bad_entry() {
        let err = ProxyAllowList::from_cidrs(&["10.0.0.0/8", "not-a-network"]).unwrap_err();
        assert_eq!(err.entry, "not-a-network");
    }
}
