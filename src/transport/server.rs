//! Listener and connection handling.
//!
//! One task per accepted connection, each serving HTTP/1.1 or HTTP/2 (chosen
//! by the client preface or ALPN) through the traced [`GatewayService`].
//!
//! # Shutdown
//!
//! When the lifecycle token is cancelled the accept loop stops, every
//! connection is told to finish its in-flight requests and close, and the
//! server waits up to the grace period before aborting what is left.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_READ_TIMEOUT;
use crate::dispatcher::ClientAddr;
use crate::lifecycle::{DrainResult, Lifecycle};
use crate::logging_layer::trace_layer;
use crate::proxy_service::GatewayService;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The gateway listener.
pub struct Server {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    service: GatewayService,
    lifecycle: Arc<Lifecycle>,
    header_read_timeout: Duration,
}

impl Server {
    /// Bind `addr`. Nothing is accepted until [`Server::run`].
    pub async fn bind(
        addr: SocketAddr,
        service: GatewayService,
        lifecycle: Arc<Lifecycle>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            tls: None,
            service,
            lifecycle,
            header_read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Terminate TLS on every accepted connection.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Deadline for a client to send complete request headers.
    pub fn with_header_read_timeout(mut self, timeout: Duration) -> Self {
        self.header_read_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, then drain.
    pub async fn run(self) -> std::io::Result<()> {
        let Self {
            listener,
            tls,
            service,
            lifecycle,
            header_read_timeout,
        } = self;

        let shutdown = lifecycle.shutdown_token();
        let mut connections = JoinSet::new();

        info!(
            addr = %listener.local_addr()?,
            tls = tls.is_some(),
            routes = service.routes().len(),
            "Listening"
        );
        lifecycle.mark_serving();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let Some(guard) = lifecycle.track_connection() else {
                        break;
                    };

                    let tls = tls.clone();
                    let service = service.clone();
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        let _guard = guard;
                        handle_connection(stream, peer, tls, service, shutdown, header_read_timeout)
                            .await;
                    });
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        }

        drop(listener);
        info!(
            active_connections = lifecycle.active_connection_count(),
            "Stopped accepting connections"
        );

        match lifecycle.drain().await {
            DrainResult::Complete => info!("All connections closed"),
            DrainResult::Timeout { remaining } => {
                warn!(remaining, "Aborting connections still open after grace period");
                connections.abort_all();
            }
        }
        while connections.join_next().await.is_some() {}

        lifecycle.mark_stopped();
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    service: GatewayService,
    shutdown: CancellationToken,
    header_read_timeout: Duration,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    match tls {
        None => serve_connection(stream, peer, service, shutdown, header_read_timeout).await,
        Some(acceptor) => {
            match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => {
                    serve_connection(tls_stream, peer, service, shutdown, header_read_timeout)
                        .await
                }
                Ok(Err(e)) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
                Err(_) => debug!(peer = %peer, "TLS handshake timed out"),
            }
        }
    }
}

/// Serve HTTP on one established connection.
async fn serve_connection<I>(
    io: I,
    peer: SocketAddr,
    service: GatewayService,
    shutdown: CancellationToken,
    header_read_timeout: Duration,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Errors become responses inside the traced stack so the trace layer
    // logs the status the caller actually sees.
    let respond = tower::service_fn(move |req: Request<Incoming>| {
        let service = service.clone();
        async move { Ok::<_, Infallible>(service.respond(req).await) }
    });
    let traced = ServiceBuilder::new().layer(trace_layer()).service(respond);

    let hyper_service = hyper::service::service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ClientAddr(peer));
        traced.clone().oneshot(req)
    });

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    let conn = builder.serve_connection(TokioIo::new(io), hyper_service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        }
        _ = shutdown.cancelled() => {
            debug!(peer = %peer, "Closing connection for shutdown");
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!(peer = %peer, error = %e, "Connection closed with error during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::transport::router::RouteTable;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start() -> (SocketAddr, Arc<Lifecycle>, tokio::task::JoinHandle<std::io::Result<()>>) {
        let config = parse_config("dockerhub:\n  backend: http://127.0.0.1:9/\n").unwrap();
        let routes = Arc::new(RouteTable::from_config(&config).unwrap());
        let service = GatewayService::new(routes, &config.limits).unwrap();
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_millis(500)));

        let server = Server::bind("127.0.0.1:0".parse().unwrap(), service, lifecycle.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.run());
        (addr, lifecycle, handle)
    }

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn unknown_path_gets_empty_404() {
        let (addr, lifecycle, handle) = start().await;

        let response = raw_request(
            addr,
            "POST /nowhere HTTP/1.1\r\nHost: gw\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 404"), "got {response}");
        assert!(response.to_ascii_lowercase().contains("content-length: 0"));

        lifecycle.begin_shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_body_gets_400() {
        let (addr, lifecycle, handle) = start().await;

        let response = raw_request(
            addr,
            "POST /dockerhub HTTP/1.1\r\nHost: gw\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400"), "got {response}");

        lifecycle.begin_shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_listener() {
        let (addr, lifecycle, handle) = start().await;

        lifecycle.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server stops within grace period")
            .unwrap()
            .unwrap();

        assert_eq!(lifecycle.state(), crate::lifecycle::LifecycleState::Stopped);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_shutdown() {
        let (addr, lifecycle, handle) = start().await;
        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        lifecycle.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server stops within grace period")
            .unwrap()
            .unwrap();
    }
}
