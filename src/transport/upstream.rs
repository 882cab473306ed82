//! Backend client with connection pooling.
//!
//! One client is shared by every route. It keeps persistent connections to
//! each backend, speaks `http` and `https`, and classifies failures into the
//! gateway's error variants:
//!
//! - elapsed backend timeout → `Timeout` (504)
//! - refused connection → `ConnectionRefused` (502)
//! - anything else on the way to the backend → `Connection` (502)
//!
//! Backend responses are streamed back to the caller unchanged, under the
//! deadlines of [`TimeoutBody`]. No retries: a webhook replayed twice may
//! trigger its side effects twice.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tower::Service;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::timeout::{TimeoutBody, TimeoutConfig};
use crate::transport::tls::install_crypto_provider;

/// Response body handed back to webhook callers.
pub type GatewayBody = BoxBody<Bytes, GatewayError>;

/// Settings for the backend client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Time allowed for the backend to send response headers. The response
    /// body gets the same idle deadline and twice this overall.
    pub timeout: Duration,
    /// TCP connect deadline.
    pub connect_timeout: Duration,
    /// Maximum idle connections kept per backend host
    pub pool_max_idle_per_host: usize,
    /// Idle connection lifetime
    pub pool_idle_timeout: Duration,
    pub tcp_nodelay: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            tcp_nodelay: true,
        }
    }
}

impl UpstreamConfig {
    /// Defaults with the given backend timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Pooled `http`/`https` client for backends.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// # Errors
    ///
    /// `GatewayError::Connection` when the TLS crypto provider cannot be
    /// installed.
    pub fn new(config: UpstreamConfig) -> GatewayResult<Self> {
        install_crypto_provider().map_err(|e| GatewayError::Connection(e.to_string()))?;

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(config.tcp_nodelay);
        http_connector.set_connect_timeout(Some(config.connect_timeout));

        let tls = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!(error = %e, "No native TLS roots available, https backends will fail verification");
                let empty_roots = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(empty_roots)
            }
        };
        let https_connector = tls
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build(https_connector);

        Ok(Self { client, config })
    }

    /// Send one request and stream the response back.
    ///
    /// The request URI must be absolute; the dispatcher sets it.
    pub async fn forward(&self, req: Request<Bytes>) -> GatewayResult<Response<GatewayBody>> {
        let target = req.uri().clone();
        debug!(target = %target, "Forwarding request to backend");

        let pending = self.client.request(req.map(Full::new));
        let response = match tokio::time::timeout(self.config.timeout, pending).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify_error(&e, &target)),
            Err(_) => {
                warn!(
                    target = %target,
                    timeout = ?self.config.timeout,
                    "Backend did not respond in time"
                );
                return Err(GatewayError::Timeout(format!(
                    "{target}: no response within {:?}",
                    self.config.timeout
                )));
            }
        };

        debug!(target = %target, status = %response.status(), "Backend responded");

        let deadlines = TimeoutConfig::for_backend(self.config.timeout);
        Ok(response.map(|body| {
            TimeoutBody::new(body, deadlines)
                .map_err(|e| {
                    if e.is_timeout() {
                        GatewayError::Timeout(e.to_string())
                    } else {
                        GatewayError::Connection(e.to_string())
                    }
                })
                .boxed()
        }))
    }
}

/// Map a client error onto the gateway's connection variants by walking the
/// source chain for the underlying I/O error.
fn classify_error(error: &hyper_util::client::legacy::Error, target: &Uri) -> GatewayError {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    warn!(target = %target, "Backend refused connection");
                    return GatewayError::ConnectionRefused(format!("{target}: {io}"));
                }
                std::io::ErrorKind::TimedOut => {
                    warn!(target = %target, "Backend connect timed out");
                    return GatewayError::Timeout(format!("{target}: {io}"));
                }
                _ => {}
            }
        }
        source = err.source();
    }

    warn!(target = %target, error = %error, "Backend request failed");
    GatewayError::Connection(format!("{target}: {error}"))
}

impl Service<Request<Bytes>> for UpstreamClient {
    type Response = Response<GatewayBody>;
    type Error = GatewayError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.forward(req).await })
    }
}
