//! Recording backend for integration tests.
//!
//! Answers every request with a fixed status and body, optionally after a
//! delay, and keeps a copy of each request it received.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Header value as a string, empty when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// Names of all `ce-*` headers, sorted.
    pub fn ce_header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .headers
            .keys()
            .map(|k| k.as_str().to_string())
            .filter(|k| k.starts_with("ce-"))
            .collect();
        names.sort();
        names
    }
}

#[derive(Debug, Clone)]
pub struct MockBackend {
    status: StatusCode,
    body: &'static str,
    delay: Option<Duration>,
}

#[derive(Debug)]
struct MockState {
    status: StatusCode,
    body: &'static str,
    delay: Option<Duration>,
    requests: RwLock<Vec<RecordedRequest>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            body: "accepted",
            delay: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: &'static str) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn start(self) -> MockBackendHandle {
        let state = Arc::new(MockState {
            status: self.status,
            body: self.body,
            delay: self.delay,
            requests: RwLock::new(Vec::new()),
        });

        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockBackendHandle {
            addr,
            state,
            _handle: handle,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockBackendHandle {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockBackendHandle {
    /// `http://<addr><path>`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn request_count(&self) -> usize {
        self.state.requests.read().await.len()
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.read().await.clone()
    }

    /// The only request received. Panics unless exactly one arrived.
    pub async fn single_request(&self) -> RecordedRequest {
        let requests = self.requests().await;
        assert_eq!(requests.len(), 1, "expected exactly one forwarded request");
        requests.into_iter().next().unwrap()
    }
}

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.requests.write().await.push(RecordedRequest {
        method,
        uri,
        headers,
        body,
    });

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    (state.status, state.body)
}
