//! Trusted reverse-proxy configuration.

use std::{borrow::Cow, fmt, net::IpAddr, str::FromStr};

use ipnet::IpNet;
use serde::{Deserialize, Deserializer};

/// Settings controlling when `X-Forwarded-*` headers are honored.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Peers allowed to set forwarded headers, as bare IP literals or CIDR
    /// ranges. An empty list trusts every peer.
    pub trusted: Vec<TrustedProxy>,
}

/// A single trusted proxy entry: an exact address or a CIDR range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TrustedProxy {
    Address(IpAddr),
    Network(IpNet),
}

impl TrustedProxy {
    /// Whether the peer address falls under this entry. Address families must
    /// agree; a v4 entry never matches a v6 peer or vice versa.
    pub fn matches(&self, peer: IpAddr) -> bool {
        match self {
            TrustedProxy::Address(address) => *address == peer,
            TrustedProxy::Network(network) => network.contains(&peer),
        }
    }
}

impl FromStr for TrustedProxy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') {
            s.parse::<IpNet>()
                .map(TrustedProxy::Network)
                .map_err(|err| format!("invalid trusted proxy range {s:?}: {err}"))
        } else {
            s.parse::<IpAddr>()
                .map(TrustedProxy::Address)
                .map_err(|err| format!("invalid trusted proxy address {s:?}: {err}"))
        }
    }
}

impl fmt::Display for TrustedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustedProxy::Address(address) => address.fmt(f),
            TrustedProxy::Network(network) => network.fmt(f),
        }
    }
}

impl fmt::Debug for TrustedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'de> Deserialize<'de> for TrustedProxy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entry = Cow::<'de, str>::deserialize(deserializer)?;
        entry.as_ref().parse().map_err(serde::de::Error::custom)
    }
}
