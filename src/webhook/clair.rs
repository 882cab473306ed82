//! Clair vulnerability notifications.
//!
//! Clair only sends the notification name; receivers page through the
//! details with `GET /notifications/<name>`, which is what `ce-source` points at.

use bytes::Bytes;
use http::Request;
use serde::Deserialize;

use super::{APPLICATION_JSON, ParseError, Parser, decode_json, require_body, required};
use crate::cloudevents::CanonicalEvent;

pub const EVENT_TYPE: &str = "com.coreos.clair.notify";

#[derive(Debug, Deserialize)]
struct Webhook {
    #[serde(default, rename = "Notification")]
    notification: Option<Notification>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(default, rename = "Name")]
    name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClairParser;

impl Parser for ClairParser {
    fn provider(&self) -> &'static str {
        "clair"
    }

    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError> {
        let webhook: Webhook = decode_json(require_body(req)?)?;
        let name = webhook.notification.and_then(|n| n.name);
        let name = required(name.as_deref(), "Notification.Name")?;

        let source = format!("/notifications/{name}");
        Ok(CanonicalEvent::new(EVENT_TYPE, &source)?.with_data_content_type(APPLICATION_JSON))
    }
}
