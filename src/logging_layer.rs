//! Request tracing for the listener.
//!
//! `tower_http::trace::TraceLayer` with gateway callbacks: every request gets
//! a span carrying a `request_id`, one INFO line on arrival and one on
//! completion. Header dumps are DEBUG only and never show credentials or
//! webhook signatures.

use std::fmt;
use std::time::Duration;

use http::HeaderMap;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnFailure, OnRequest, OnResponse, TraceLayer};
use tracing::{Span, debug, info, warn};

/// Headers whose values never reach the log.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-hub-signature",
    "x-hub-signature-256",
];

const MAX_HEADERS_TO_LOG: usize = 50;
const MAX_VALUE_LEN: usize = 1024;

pub type GatewayTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestSpan,
    LogRequest,
    LogResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    LogFailure,
>;

pub fn trace_layer() -> GatewayTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_request(LogRequest)
        .on_response(LogResponse)
        .on_failure(LogFailure)
}

/// Opens the per-request span. `request_id` comes from `x-request-id` when
/// the caller sent one, otherwise a fresh UUID.
#[derive(Clone, Debug)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracing::info_span!(
            "webhook",
            method = %request.method(),
            path = %request.uri().path(),
            version = ?request.version(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone, Debug)]
pub struct LogRequest;

impl<B> OnRequest<B> for LogRequest {
    fn on_request(&mut self, request: &http::Request<B>, _span: &Span) {
        info!(method = %request.method(), uri = %request.uri(), "Webhook received");

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(headers = ?RedactedHeaders(request.headers()), "Request headers");
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogResponse;

impl<B> OnResponse<B> for LogResponse {
    fn on_response(self, response: &http::Response<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis(),
            "Response sent"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(headers = ?RedactedHeaders(response.headers()), "Response headers");
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogFailure;

impl OnFailure<ServerErrorsFailureClass> for LogFailure {
    fn on_failure(&mut self, failure: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
        warn!(
            classification = %failure,
            latency_ms = latency.as_millis(),
            "Request failed"
        );
    }
}

/// `Debug` view of a header map with sensitive values masked and long
/// values truncated.
pub struct RedactedHeaders<'a>(pub &'a HeaderMap);

fn is_sensitive(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
}

impl fmt::Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();

        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx >= MAX_HEADERS_TO_LOG {
                map.entry(&"...", &format!("({} more headers)", self.0.len() - idx));
                break;
            }

            let name = name.as_str();
            if is_sensitive(name) {
                map.entry(&name, &"[REDACTED]");
                continue;
            }

            // `to_str` only accepts visible ASCII, so byte slicing is safe.
            match value.to_str() {
                Ok(v) if v.len() <= MAX_VALUE_LEN => map.entry(&name, &v),
                Ok(v) => map.entry(
                    &name,
                    &format!("{}... ({} bytes)", &v[..MAX_VALUE_LEN], v.len()),
                ),
                Err(_) => map.entry(&name, &format!("<binary: {} bytes>", value.len())),
            };
        }

        map.finish()
    }
}
