//! Error types for the request pipeline.
//!
//! Every variant maps to exactly one status code. Error responses never carry
//! a body; details go to the log only.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use thiserror::Error;

use crate::webhook::ParseError;

/// Errors that can occur while handling one inbound webhook.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The provider parser rejected the payload (400, or 401 for signatures)
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// No route is registered for the request path (404)
    #[error("No route for path: {0}")]
    NoRoute(String),

    /// Inbound body exceeded the configured limit (413)
    #[error("Payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Reading the inbound body failed (400)
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// The client did not finish sending the body in time (408)
    #[error("Body read timed out after {0:?}")]
    BodyTimeout(std::time::Duration),

    /// An outbound request reached the egress guard without `ce-id` (500)
    #[error("Outbound request is missing the ce-id header")]
    MissingEventId,

    /// Invalid URI or target (500, the backend URI is ours)
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Connection error to the backend (502)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection refused by the backend (502)
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Backend did not answer in time (504)
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// Status code sent to the webhook caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Parse(ParseError::InvalidSignature(_)) => StatusCode::UNAUTHORIZED,
            GatewayError::Parse(_) => StatusCode::BAD_REQUEST,
            GatewayError::NoRoute(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            GatewayError::MissingEventId | GatewayError::InvalidUri(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::ConnectionRefused(_) | GatewayError::Connection(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Convert error to an empty-bodied HTTP response.
    pub fn to_response(&self) -> Response<Full<Bytes>> {
        let mut resp = Response::new(Full::new(Bytes::new()));
        *resp.status_mut() = self.status();
        resp
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
