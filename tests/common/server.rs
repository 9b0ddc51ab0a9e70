//! Test server management.
//!
//! Spawns an in-process `Gateway` bound to `127.0.0.1:0` backed by a
//! `wiremock` server standing in for the record-oriented HTTP backend, rather
//! than spawning the compiled binary as a subprocess: this bridge has no
//! database or TLS bring-up to justify the out-of-process cost.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tenantircd::backend::BackendClient;
use tenantircd::handlers::{Registry, SharedState};
use tenantircd::network::Gateway;
use tenantircd::state::{TenantAwareRegistry, TenantRegistry};

/// A running test instance: the IRC listener address and the mock backend
/// behind it. Dropping this stops the mock server; the gateway task is
/// detached and simply leaks for the duration of the test process.
pub struct TestServer {
    pub addr: SocketAddr,
    pub backend: MockServer,
}

impl TestServer {
    /// Spawn a gateway and a mock backend that accepts any tenant/username at
    /// `access`, and answers schema reads with an empty result set.
    pub async fn spawn(access: &str) -> Self {
        let backend = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/auth/login$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "token": "test-token", "access": access }
            })))
            .mount(&backend)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/api/data/[^/]+(/[^/]+)?$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&backend)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/api/aggregate/[^/]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "total": 0,
                    "min_created": null,
                    "max_created": null,
                    "max_updated": null,
                }]
            })))
            .mount(&backend)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/api/find/[^/]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&backend)
            .await;

        let client = BackendClient::new(backend.uri(), std::time::Duration::from_secs(5));

        let shared = SharedState {
            server_name: Arc::from("irc.test"),
            network_name: Arc::from("TestNet"),
            tenants: Arc::new(TenantRegistry::new()),
            tenant_aware: Arc::new(TenantAwareRegistry::new()),
            backend: Arc::new(client),
            limits: Arc::new(tenantircd::config::LimitsConfig::default()),
        };

        let registry = Arc::new(Registry::new());

        let gateway = Gateway::bind("127.0.0.1:0".parse().unwrap(), shared, registry)
            .await
            .expect("bind ephemeral port");
        let addr = gateway.local_addr();

        tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        TestServer { addr, backend }
    }
}
