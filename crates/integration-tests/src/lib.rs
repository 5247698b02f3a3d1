//! Test harness running the proxy-detection layer inside a real axum server,
//! driven over loopback connections so the middleware sees genuine peer
//! addresses.

use std::net::SocketAddr;

use axum::{Json, Router, http::Uri, routing::get};
use config::Config;
use proxy_detection::ProxyDetectionLayer;
use serde_json::{Value, json};

pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
}

impl TestServer {
    /// Boot a server on an ephemeral loopback port with the proxy settings
    /// from the given TOML fragment.
    pub async fn start(config: &str) -> Self {
        let config: Config = toml::from_str(config).expect("valid test configuration");

        let app = Router::new()
            .route("/uri", get(observed_uri))
            .layer(ProxyDetectionLayer::from_config(&config.proxy));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("can bind an ephemeral port");

        let address = listener.local_addr().expect("listener has an address");

        let server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .expect("server runs until the test ends");
        });

        // The task outlives the handle; the runtime tears it down with the test.
        drop(server);

        Self {
            client: TestClient::new(format!("http://{address}")),
            address,
        }
    }
}

/// Echoes the URI the handler observed, field by field.
async fn observed_uri(uri: Uri) -> Json<Value> {
    Json(json!({
        "scheme": uri.scheme_str(),
        "host": uri.host(),
        "port": uri.port_u16(),
        "path": uri.path(),
    }))
}

#[derive(Clone)]
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// GET `/uri` with the given headers and return the echoed URI fields.
    pub async fn observed_uri(&self, headers: &[(&str, &str)]) -> Value {
        let mut request = self.client.get(format!("{}/uri", self.base_url));

        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.expect("request reaches the server");
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        response.json().await.expect("handler returns JSON")
    }
}
