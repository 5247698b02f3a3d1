//! Peer trust evaluation against the configured proxy allow-list.

use std::net::IpAddr;

use config::TrustedProxy;

/// Decide whether forwarded headers from this peer may be honored.
///
/// An empty allow-list trusts every peer. A peer address that is not a valid
/// IPv4 or IPv6 literal is never trusted; malformed peer data fails closed.
/// The first matching entry wins, purely by byte comparison, with no DNS
/// resolution involved.
pub fn is_trusted(peer_addr: &str, trusted: &[TrustedProxy]) -> bool {
    if trusted.is_empty() {
        return true;
    }

    let Ok(peer) = peer_addr.parse::<IpAddr>() else {
        return false;
    };

    trusted.iter().any(|proxy| proxy.matches(peer))
}

/// [`is_trusted`] for a peer address the transport already parsed.
pub fn is_trusted_ip(peer: IpAddr, trusted: &[TrustedProxy]) -> bool {
    trusted.is_empty() || trusted.iter().any(|proxy| proxy.matches(peer))
}
