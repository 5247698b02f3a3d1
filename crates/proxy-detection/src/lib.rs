//! Reverse-proxy detection middleware.
//!
//! Rewrites a request URI's scheme, host, and port from the
//! `X-Forwarded-Proto`, `X-Forwarded-Port`, and `X-Forwarded-Host` headers,
//! but only when the connecting peer is one of the configured trusted proxies.
//! With no trusted proxies configured, every peer is trusted; restricting is
//! an explicit opt-in.
//!
//! The transform is synchronous, allocation-light, and never fails a request:
//! malformed header values leave the affected URI field unchanged.

mod layer;
mod rewrite;
mod trust;

pub use layer::{ProxyDetectionLayer, ProxyDetectionService};
pub use rewrite::rewrite_uri;
pub use trust::{is_trusted, is_trusted_ip};
