//! Forwarded-header parsing and URI rewriting.
//!
//! Three independent rules run in a fixed order: proto, then port, then host.
//! The host rule may carry its own port, which overrides a port set by the
//! port rule moments earlier in the same pass. No rule ever fails the
//! request; a value that cannot be applied leaves the field as it was.

use std::sync::LazyLock;

use http::{
    HeaderMap, Uri,
    uri::{Authority, PathAndQuery, Scheme},
};
use regex::Regex;

pub(crate) const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub(crate) const X_FORWARDED_PORT: &str = "x-forwarded-port";
pub(crate) const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// A bracketed IPv6-style host literal, optionally followed by a port.
static BRACKETED_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\[[0-9A-Fa-f:.]+\])(?::(\d+))?$").expect("valid pattern"));

/// Candidate scheme/host/port replacements accumulated by the rewrite rules.
#[derive(Debug, Clone, PartialEq)]
struct UriOverride {
    scheme: Option<Scheme>,
    host: Option<String>,
    port: Option<u16>,
}

impl UriOverride {
    fn from_uri(uri: &Uri) -> Self {
        Self {
            scheme: uri.scheme().cloned(),
            // Uri::host strips the brackets from IPv6 literals; they have to
            // come back before the host can be part of an authority again.
            host: uri.host().map(|host| {
                if host.contains(':') {
                    format!("[{host}]")
                } else {
                    host.to_owned()
                }
            }),
            port: uri.port_u16(),
        }
    }
}

/// Apply the forwarded proto, port, and host rules to a URI.
///
/// Returns the original URI unchanged when no header produced an applicable
/// override, or when the overridden parts cannot form a valid URI.
pub fn rewrite_uri(uri: &Uri, headers: &HeaderMap) -> Uri {
    rewritten_uri(uri, headers).unwrap_or_else(|| uri.clone())
}

/// [`rewrite_uri`], with `None` signalling that nothing changed.
pub(crate) fn rewritten_uri(uri: &Uri, headers: &HeaderMap) -> Option<Uri> {
    let original = UriOverride::from_uri(uri);

    let candidate = forwarded_proto(original.clone(), headers);
    let candidate = forwarded_port(candidate, headers);
    let candidate = forwarded_host(candidate, headers);

    if candidate == original {
        return None;
    }

    rebuild(uri, candidate)
}

/// Replace the scheme when the header value is exactly `http` or `https`.
/// Anything else, including uppercase variants, is ignored.
fn forwarded_proto(mut candidate: UriOverride, headers: &HeaderMap) -> UriOverride {
    if let Some(proto) = first_value(headers, X_FORWARDED_PROTO) {
        match proto {
            "http" => candidate.scheme = Some(Scheme::HTTP),
            "https" => candidate.scheme = Some(Scheme::HTTPS),
            _ => {}
        }
    }

    candidate
}

/// Replace the port when the header value is digits in full.
fn forwarded_port(mut candidate: UriOverride, headers: &HeaderMap) -> UriOverride {
    if let Some(value) = first_value(headers, X_FORWARDED_PORT)
        && let Some(port) = strict_port(value)
    {
        candidate.port = Some(port);
    }

    candidate
}

/// Replace the host, and the port when the host value embeds one.
///
/// A bracketed IPv6 literal keeps its brackets and accepts an optional
/// `:digits` suffix. Any other value splits at the first colon, with the
/// suffix parsed leniently (see [`lenient_port`]); a zero or unparsable
/// suffix replaces the host but leaves the port alone.
fn forwarded_host(mut candidate: UriOverride, headers: &HeaderMap) -> UriOverride {
    let Some(value) = first_value(headers, X_FORWARDED_HOST) else {
        return candidate;
    };

    let (host, port) = if let Some(captures) = BRACKETED_HOST.captures(value) {
        let literal = captures.get(1).map_or("", |m| m.as_str());
        let port = captures
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .filter(|port| *port != 0);

        (literal, port)
    } else if let Some((host, suffix)) = value.split_once(':') {
        (host, lenient_port(suffix))
    } else {
        (value, None)
    };

    // An empty authority is unrepresentable in a URI.
    if !host.is_empty() {
        candidate.host = Some(host.to_owned());
    }

    if let Some(port) = port {
        candidate.port = Some(port);
    }

    candidate
}

/// First comma-separated value of a header, trimmed. Multi-hop chains are not
/// walked; only the outermost hop is consulted.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?;

    Some(value.split(',').next().unwrap_or(value).trim())
}

/// One or more ASCII digits in full, fitting a 16-bit URI port.
fn strict_port(value: &str) -> Option<u16> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    value.parse().ok()
}

/// Integer-prefix parse of a host-embedded port: `12a4` is port 12, `abc` is
/// nothing. Intentionally looser than [`strict_port`], matching how these
/// suffixes have historically been cast; zero means "no port".
fn lenient_port(value: &str) -> Option<u16> {
    let digits = value.bytes().take_while(u8::is_ascii_digit).count();

    if digits == 0 {
        return None;
    }

    value[..digits].parse().ok().filter(|port| *port != 0)
}

fn rebuild(uri: &Uri, candidate: UriOverride) -> Option<Uri> {
    let host = candidate.host?;
    let authority: Authority = match candidate.port {
        Some(port) => format!("{host}:{port}").parse().ok()?,
        None => host.parse().ok()?,
    };

    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(candidate.scheme.unwrap_or(Scheme::HTTP));
    parts.authority = Some(authority);

    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    Uri::from_parts(parts).ok()
}
