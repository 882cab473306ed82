//! Forwarding director.
//!
//! For one matched route the dispatcher:
//!
//! 1. buffers the inbound body under a size cap and a read deadline
//! 2. lends the buffered request to the route's parser
//! 3. backfills `id` and `time` on the resulting event
//! 4. retargets the request at the route's backend
//! 5. stamps the `ce-*` headers and logs the accepted event
//!
//! A parse failure stops the pipeline; nothing is forwarded. The body bytes
//! handed to the backend are exactly the bytes received from the client.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, CONNECTION, HOST, HeaderMap, HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{Request, Uri, Version};
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{debug, info, warn};

use crate::config::Limits;
use crate::error::{GatewayError, GatewayResult};
use crate::webhook::Parser;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Peer address of the inbound connection, stored as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Body buffering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounds on reading an inbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    pub max_bytes: usize,
    pub read_timeout: Duration,
}

impl From<&Limits> for BodyLimits {
    fn from(limits: &Limits) -> Self {
        Self {
            max_bytes: limits.max_body_bytes,
            read_timeout: limits.read_timeout,
        }
    }
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self::from(&Limits::default())
    }
}

/// Read a whole body into memory.
///
/// # Errors
///
/// - `PayloadTooLarge` once more than `max_bytes` have been received
/// - `BodyTimeout` when the body is not complete within `read_timeout`
/// - `BodyRead` when the stream fails
pub async fn collect_body<B>(body: B, limits: BodyLimits) -> GatewayResult<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limited = Limited::new(body, limits.max_bytes);

    match tokio::time::timeout(limits.read_timeout, limited.collect()).await {
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
        Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit = limits.max_bytes, "Inbound body exceeds size limit");
            Err(GatewayError::PayloadTooLarge {
                limit: limits.max_bytes,
            })
        }
        Ok(Err(e)) => Err(GatewayError::BodyRead(e.to_string())),
        Err(_) => {
            warn!(timeout = ?limits.read_timeout, "Inbound body read timed out");
            Err(GatewayError::BodyTimeout(limits.read_timeout))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend target
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a route forwards to: scheme, authority and a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    scheme: Scheme,
    authority: Authority,
    path: String,
}

impl Backend {
    /// Parse an absolute `http`/`https` backend URL. Any query on the backend
    /// URL is ignored; the inbound query is forwarded instead.
    pub fn parse(url: &str) -> GatewayResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| GatewayError::InvalidUri(format!("backend '{url}': {e}")))?;

        let scheme = uri
            .scheme()
            .filter(|s| **s == Scheme::HTTP || **s == Scheme::HTTPS)
            .cloned()
            .ok_or_else(|| GatewayError::InvalidUri(format!("backend '{url}': not http(s)")))?;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| GatewayError::InvalidUri(format!("backend '{url}': missing host")))?;
        // The authority becomes the outbound Host header.
        if authority.as_str().contains('@') {
            return Err(GatewayError::InvalidUri(format!(
                "backend '{}://{}': credentials are not allowed",
                scheme,
                authority.host()
            )));
        }
        let path = match uri.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            scheme,
            authority,
            path,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Backend URI for an inbound request: backend path plus inbound query.
    pub fn target(&self, inbound: &Uri) -> GatewayResult<Uri> {
        let path_and_query = match inbound.query() {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        };
        let path_and_query = PathAndQuery::try_from(path_and_query)
            .map_err(|e| GatewayError::InvalidUri(e.to_string()))?;

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GatewayError::InvalidUri(e.to_string()))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalizes and retargets requests for one route.
#[derive(Clone)]
pub struct Dispatcher {
    parser: Arc<dyn Parser>,
    backend: Backend,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("provider", &self.parser.provider())
            .field("backend", &self.backend)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(parser: Arc<dyn Parser>, backend: Backend) -> Self {
        Self { parser, backend }
    }

    pub fn provider(&self) -> &'static str {
        self.parser.provider()
    }

    /// Turn a buffered inbound request into the outbound backend request.
    ///
    /// # Errors
    ///
    /// `GatewayError::Parse` when the parser rejects the request (nothing may
    /// be forwarded), `InvalidUri` when the backend target cannot be built.
    pub fn dispatch(
        &self,
        req: Request<Bytes>,
        received_at: DateTime<Utc>,
    ) -> GatewayResult<Request<Bytes>> {
        let client = req.extensions().get::<ClientAddr>().map(|c| c.0);
        let remote_addr = client.map_or_else(|| "-".to_string(), |a| a.to_string());

        let mut event = match self.parser.parse(&req) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    provider = self.provider(),
                    remote_addr = %remote_addr,
                    error = %e,
                    "Rejected webhook"
                );
                return Err(e.into());
            }
        };
        event.backfill(received_at);

        let (mut parts, body) = req.into_parts();
        parts.uri = self.backend.target(&parts.uri)?;
        parts.version = Version::HTTP_11;

        let headers = &mut parts.headers;
        strip_hop_by_hop_headers(headers);
        let host = HeaderValue::from_str(self.backend.authority.as_str())
            .map_err(|e| GatewayError::InvalidUri(e.to_string()))?;
        headers.insert(HOST, host);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        if let Some(addr) = client {
            append_forwarded_for(headers, addr.ip());
        }
        event.apply_to(headers)?;

        info!(
            provider = self.provider(),
            remote_addr = %remote_addr,
            event_id = event.id().unwrap_or_default(),
            event_type = event.event_type(),
            source = %event.source(),
            "Forwarding event"
        );
        debug!(target_uri = %parts.uri, body_len = body.len(), "Rewrote request");

        Ok(Request::from_parts(parts, body))
    }
}

/// Headers that describe one connection and must not be relayed.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "proxy-connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    // Headers listed in `Connection` are hop-by-hop for this request too.
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    let fixed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop_header(name.as_str()))
        .cloned()
        .collect();
    for name in fixed {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {ip}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
