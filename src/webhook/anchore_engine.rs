//! Anchore Engine subscription notifications.

use bytes::Bytes;
use http::Request;
use serde::Deserialize;

use super::{APPLICATION_JSON, ParseError, Parser, decode_json, require_body, required};
use crate::cloudevents::CanonicalEvent;

const TYPE_PREFIX: &str = "com.anchore.anchore-engine";

#[derive(Debug, Default, Deserialize)]
struct Webhook {
    #[serde(default)]
    data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    #[serde(default)]
    notification_type: Option<String>,
    #[serde(default)]
    notification_payload: NotificationPayload,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPayload {
    #[serde(default, rename = "notificationId")]
    notification_id: Option<String>,
    #[serde(default)]
    subscription_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnchoreEngineParser;

impl Parser for AnchoreEngineParser {
    fn provider(&self) -> &'static str {
        "anchore-engine"
    }

    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError> {
        let webhook: Webhook = decode_json(require_body(req)?)?;
        let data = webhook.data;

        let notification_type = data
            .notification_type
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ParseError::UnsupportedEventType("notification without type".to_string())
            })?;
        let payload = data.notification_payload;
        let key = required(
            payload.subscription_key.as_deref(),
            "data.notification_payload.subscription_key",
        )?;

        let source = format!("/v1/subscriptions?subscription_key={key}");
        let event = CanonicalEvent::new(format!("{TYPE_PREFIX}.{notification_type}"), &source)?
            .with_id(payload.notification_id.unwrap_or_default())
            .with_data_content_type(APPLICATION_JSON);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::test_support::json_request;
    use serde_json::json;

    fn notification(kind: &str) -> serde_json::Value {
        json!({
            "data": {
                "notification_user": "admin",
                "notification_user_email": "admin@example.com",
                "notification_type": kind,
                "notification_payload": {
                    "userId": "admin",
                    "subscription_key": "docker.io/dnurmi/testrepo:latest",
                    "subscription_type": kind,
                    "notificationId": "bc6e8d6c-7d4f-4b6f-9b2b-19ab3f4b3b1e"
                }
            }
        })
    }

    #[test]
    fn notification_types_map_to_event_types() {
        for kind in ["analysis_update", "tag_update", "policy_eval", "vuln_update"] {
            let event = AnchoreEngineParser
                .parse(&json_request(notification(kind)))
                .unwrap();

            assert_eq!(
                event.event_type(),
                format!("com.anchore.anchore-engine.{kind}")
            );
            assert_eq!(
                event.source().as_str(),
                "/v1/subscriptions?subscription_key=docker.io/dnurmi/testrepo:latest"
            );
            assert_eq!(event.id(), Some("bc6e8d6c-7d4f-4b6f-9b2b-19ab3f4b3b1e"));
        }
    }

    #[test]
    fn missing_notification_id_is_left_for_backfill() {
        let mut body = notification("tag_update");
        body["data"]["notification_payload"]
            .as_object_mut()
            .unwrap()
            .remove("notificationId");

        let event = AnchoreEngineParser.parse(&json_request(body)).unwrap();
        assert_eq!(event.id(), None);
    }

    #[test]
    fn missing_type_or_key_is_rejected() {
        let no_type = json!({ "data": { "notification_payload": { "subscription_key": "k" } } });
        assert!(matches!(
            AnchoreEngineParser.parse(&json_request(no_type)),
            Err(ParseError::UnsupportedEventType(_))
        ));

        let no_key = json!({ "data": { "notification_type": "tag_update" } });
        assert_eq!(
            AnchoreEngineParser.parse(&json_request(no_key)),
            Err(ParseError::MissingField(
                "data.notification_payload.subscription_key"
            ))
        );
    }
}
