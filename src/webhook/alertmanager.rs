//! Prometheus Alertmanager webhook receiver.
//!
//! Alertmanager payloads carry neither an id nor a timestamp for the
//! notification itself, so both are always backfilled by the dispatcher.

use bytes::Bytes;
use http::Request;
use serde::Deserialize;

use super::{APPLICATION_JSON, ParseError, Parser, decode_json, require_body};
use crate::cloudevents::CanonicalEvent;

const TYPE_PREFIX: &str = "io.prometheus.alertmanager";

/// Subset of the Alertmanager webhook message (`version: "4"`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "externalURL")]
    external_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertmanagerParser;

impl Parser for AlertmanagerParser {
    fn provider(&self) -> &'static str {
        "alertmanager"
    }

    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError> {
        let msg: Message = decode_json(require_body(req)?)?;

        let status = msg
            .status
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::UnsupportedEventType("alert without status".to_string()))?;
        let source = msg
            .external_url
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::MalformedPayload("empty externalURL".to_string()))?;

        Ok(
            CanonicalEvent::new(format!("{TYPE_PREFIX}.{status}"), &source)?
                .with_data_content_type(APPLICATION_JSON),
        )
    }
}
