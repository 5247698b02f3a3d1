//! Tower middleware wiring for proxy detection.

use std::{
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
};

use axum::extract::ConnectInfo;
use config::{ProxyConfig, TrustedProxy};
use http::{Request, Uri, header, uri::Scheme};
use tower::Layer;

use crate::{
    rewrite::{self, X_FORWARDED_HOST, X_FORWARDED_PORT, X_FORWARDED_PROTO},
    trust::is_trusted_ip,
};

/// Rewrites request URIs from forwarded headers sent by trusted proxies.
///
/// The trusted list is immutable after construction and shared across every
/// clone of the service, so concurrent requests evaluate it without locking.
#[derive(Clone)]
pub struct ProxyDetectionLayer {
    trusted: Arc<[TrustedProxy]>,
}

impl ProxyDetectionLayer {
    pub fn new(trusted: Vec<TrustedProxy>) -> Self {
        Self {
            trusted: trusted.into(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.trusted.clone())
    }
}

impl<S> Layer<S> for ProxyDetectionLayer {
    type Service = ProxyDetectionService<S>;

    fn layer(&self, next: S) -> Self::Service {
        ProxyDetectionService {
            next,
            trusted: self.trusted.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ProxyDetectionService<S> {
    next: S,
    trusted: Arc<[TrustedProxy]>,
}

impl<S, B> tower::Service<Request<B>> for ProxyDetectionService<S>
where
    S: tower::Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if !self.trusted.is_empty() {
            // The trust decision is made fresh per request; the peer behind a
            // connection is whatever the transport reports right now.
            let peer = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip());

            if !peer.is_some_and(|ip| is_trusted_ip(ip, &self.trusted)) {
                log::debug!("peer is not a trusted proxy, ignoring forwarded headers");
                return self.next.call(req);
            }
        }

        if has_forwarded_headers(&req)
            && let Some(uri) = rewrite::rewritten_uri(&effective_uri(&req), req.headers())
        {
            *req.uri_mut() = uri;
        }

        self.next.call(req)
    }
}

fn has_forwarded_headers<B>(req: &Request<B>) -> bool {
    [X_FORWARDED_PROTO, X_FORWARDED_PORT, X_FORWARDED_HOST]
        .iter()
        .any(|name| req.headers().contains_key(*name))
}

/// Server-side requests usually carry origin-form URIs. Seed the rewrite with
/// the authority from the `Host` header and an `http` scheme so scheme and
/// port overrides have a host to attach to, the same shape a client-facing
/// absolute URI would have.
fn effective_uri<B>(req: &Request<B>) -> Uri {
    if req.uri().host().is_some() {
        return req.uri().clone();
    }

    let Some(host) = req.headers().get(header::HOST).and_then(|v| v.to_str().ok()) else {
        return req.uri().clone();
    };

    let mut parts = req.uri().clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = host.parse().ok();

    match Uri::from_parts(parts) {
        Ok(uri) => uri,
        Err(_) => req.uri().clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use tower::{ServiceExt, service_fn};

    use super::*;

    async fn seen_uri(trusted: &[&str], peer: Option<&str>, uri: &str, headers: &[(&str, &str)]) -> String {
        let trusted: Vec<TrustedProxy> = trusted.iter().map(|entry| entry.parse().unwrap()).collect();

        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let mut req = builder.body(()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }

        let service = ProxyDetectionLayer::new(trusted).layer(service_fn(|req: Request<()>| async move {
            Ok::<_, Infallible>(req.uri().to_string())
        }));

        service.oneshot(req).await.unwrap()
    }

    #[test]
    fn effective_uri_falls_back_to_the_host_header() {
        let req = Request::builder()
            .uri("/path")
            .header("Host", "foo.com:8080")
            .body(())
            .unwrap();

        assert_eq!(effective_uri(&req), "http://foo.com:8080/path");
    }

    #[tokio::test]
    async fn trusted_exact_peer_is_rewritten() {
        let uri = seen_uri(
            &["192.168.0.1"],
            Some("192.168.0.1:40000"),
            "http://foo.com/path",
            &[("X-Forwarded-Proto", "https"), ("X-Forwarded-Host", "example.com:1234")],
        )
        .await;

        assert_eq!(uri, "https://example.com:1234/path");
    }

    #[tokio::test]
    async fn untrusted_peer_passes_through() {
        let uri = seen_uri(
            &["192.168.0.0/24"],
            Some("10.0.0.1:40000"),
            "http://foo.com/path",
            &[("X-Forwarded-Proto", "https"), ("X-Forwarded-Host", "example.com:1234")],
        )
        .await;

        assert_eq!(uri, "http://foo.com/path");
    }

    #[tokio::test]
    async fn host_embedded_port_wins_within_a_trusted_range() {
        let uri = seen_uri(
            &["192.168.0.0/24"],
            Some("192.168.0.1:40000"),
            "http://foo.com/",
            &[
                ("X-Forwarded-Proto", "https"),
                ("X-Forwarded-Host", "example.com:1000"),
                ("X-Forwarded-Port", "2000"),
            ],
        )
        .await;

        assert_eq!(uri, "https://example.com:1000/");
    }

    #[tokio::test]
    async fn empty_trust_list_rewrites_for_any_peer() {
        let uri = seen_uri(
            &[],
            Some("203.0.113.77:40000"),
            "http://foo.com/",
            &[
                ("X-Forwarded-Proto", "https"),
                ("X-Forwarded-Port", "1234"),
                ("X-Forwarded-Host", "example.com"),
            ],
        )
        .await;

        assert_eq!(uri, "https://example.com:1234/");
    }

    #[tokio::test]
    async fn missing_peer_information_never_grants_trust() {
        let uri = seen_uri(
            &["0.0.0.0/0", "::/0"],
            None,
            "http://foo.com/path",
            &[("X-Forwarded-Host", "example.com")],
        )
        .await;

        assert_eq!(uri, "http://foo.com/path");
    }

    #[tokio::test]
    async fn origin_form_request_uses_the_host_header() {
        let uri = seen_uri(
            &[],
            Some("127.0.0.1:40000"),
            "/path",
            &[("Host", "foo.com"), ("X-Forwarded-Proto", "https")],
        )
        .await;

        assert_eq!(uri, "https://foo.com/path");
    }

    #[tokio::test]
    async fn origin_form_request_without_changes_stays_origin_form() {
        let uri = seen_uri(&[], Some("127.0.0.1:40000"), "/path", &[("Host", "foo.com")]).await;

        assert_eq!(uri, "/path");
    }
}
