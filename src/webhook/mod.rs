//! Provider parsers.
//!
//! Every webhook provider implements [`Parser`]. The dispatcher owns the
//! buffered body and lends the parser a fully-read request, so a parser never
//! touches the bytes that are forwarded to the backend.
//!
//! ```text
//! Request<Bytes> ──▶ Parser::parse ──▶ CanonicalEvent ──▶ ce-* headers
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Request, header::CONTENT_TYPE};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::cloudevents::CanonicalEvent;

pub mod alertmanager;
pub mod anchore_engine;
pub mod clair;
pub mod dockerhub;
pub mod github;
pub mod slack;

pub use alertmanager::AlertmanagerParser;
pub use anchore_engine::AnchoreEngineParser;
pub use clair::ClairParser;
pub use dockerhub::DockerHubParser;
pub use github::GitHubParser;
pub use slack::SlackParser;

pub const APPLICATION_JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Reasons a provider payload could not be turned into an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Turns one provider's webhook request into a [`CanonicalEvent`].
///
/// Implementations are stateless apart from configuration (secrets) and are
/// shared across all in-flight requests.
pub trait Parser: Send + Sync {
    /// Short provider name used in logs.
    fn provider(&self) -> &'static str;

    /// Parse a fully buffered request.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the request is empty, malformed, of an
    /// unmapped kind, missing a required field or fails authentication.
    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError>;
}

/// The request body, or `EmptyPayload` when there is none.
pub(crate) fn require_body(req: &Request<Bytes>) -> Result<&Bytes, ParseError> {
    let body = req.body();
    if body.is_empty() {
        return Err(ParseError::EmptyPayload);
    }
    Ok(body)
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ParseError> {
    serde_json::from_slice(body).map_err(|e| ParseError::MalformedPayload(e.to_string()))
}

/// Decode an `application/x-www-form-urlencoded` body. Repeated keys keep
/// their first value.
pub(crate) fn decode_form(body: &[u8]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        fields
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    fields
}

/// Lower-cased media type of the request without parameters.
pub(crate) fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    Some(essence.to_ascii_lowercase())
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// A required string field, failing with `MissingField` when absent or empty.
pub(crate) fn required<'a>(
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ParseError::MissingField(field)),
    }
}
