//! Shared integration test plumbing.

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_backend;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cloudevents_gateway::config::{listen_addr, parse_config, validate};
use cloudevents_gateway::lifecycle::Lifecycle;
use cloudevents_gateway::proxy_service::GatewayService;
use cloudevents_gateway::transport::{RouteTable, Server, load_acceptor};
use tokio::task::JoinHandle;

/// A gateway running in the test runtime.
pub struct TestGateway {
    pub addr: SocketAddr,
    scheme: &'static str,
    pub lifecycle: Arc<Lifecycle>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestGateway {
    /// Start a gateway from YAML; `listen` should use port 0. A complete
    /// `tls` section makes the gateway serve HTTPS.
    pub async fn start(yaml: &str) -> Self {
        let config = parse_config(yaml).unwrap();
        validate(&config).unwrap();

        let routes = Arc::new(RouteTable::from_config(&config).unwrap());
        let service = GatewayService::new(routes, &config.limits).unwrap();
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(1)));

        let mut server = Server::bind(listen_addr(&config).unwrap(), service, lifecycle.clone())
            .await
            .unwrap()
            .with_header_read_timeout(config.limits.read_timeout);
        let mut scheme = "http";
        if let Some(tls) = config.tls.as_ref().filter(|tls| tls.is_enabled()) {
            server = server.with_tls(load_acceptor(tls).unwrap());
            scheme = "https";
        }
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.run());

        Self {
            addr,
            scheme,
            lifecycle,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self.addr, path)
    }

    pub async fn shutdown(self) {
        self.lifecycle.begin_shutdown();
        self.handle.await.unwrap().unwrap();
    }
}

/// Plain HTTP client without connection reuse between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// HTTPS client that trusts any certificate, for self-signed listeners.
pub fn tls_client() -> reqwest::Client {
    reqwest::Client::builder()
        .use_rustls_tls()
        .danger_accept_invalid_certs(true)
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
