//! Docker Hub repository push webhooks.

use bytes::Bytes;
use http::Request;
use serde::Deserialize;

use super::{APPLICATION_JSON, ParseError, Parser, decode_json, require_body, required};
use crate::cloudevents::CanonicalEvent;

pub const EVENT_TYPE: &str = "com.docker.hub.push";

#[derive(Debug, Deserialize)]
struct Webhook {
    #[serde(default)]
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    #[serde(default)]
    repo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DockerHubParser;

impl Parser for DockerHubParser {
    fn provider(&self) -> &'static str {
        "dockerhub"
    }

    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError> {
        let webhook: Webhook = decode_json(require_body(req)?)?;
        let repo_url = webhook.repository.and_then(|r| r.repo_url);
        let source = required(repo_url.as_deref(), "repository.repo_url")?;

        Ok(CanonicalEvent::new(EVENT_TYPE, source)?.with_data_content_type(APPLICATION_JSON))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::test_support::json_request;
    use serde_json::json;

    #[test]
    fn push_uses_repository_url() {
        let req = json_request(json!({
            "callback_url": "https://registry.hub.docker.com/u/svendowideit/testhook/hook/2141b5bi5i5b02bec211i4eeih0242eg11000a/",
            "push_data": { "pusher": "trustedbuilder", "tag": "latest" },
            "repository": { "repo_url": "https://example.org/repo", "name": "testhook" }
        }));

        let event = DockerHubParser.parse(&req).unwrap();
        assert_eq!(event.event_type(), "com.docker.hub.push");
        assert_eq!(event.source().as_str(), "https://example.org/repo");
        assert_eq!(event.id(), None);
        assert_eq!(event.data_content_type(), Some("application/json"));
    }

    #[test]
    fn missing_repository_url_is_reported() {
        let req = json_request(json!({ "repository": { "name": "testhook" } }));
        assert_eq!(
            DockerHubParser.parse(&req),
            Err(ParseError::MissingField("repository.repo_url"))
        );
    }

    #[test]
    fn invalid_repository_url_is_malformed() {
        let req = json_request(json!({ "repository": { "repo_url": "http://exa mple.org/" } }));
        assert!(matches!(
            DockerHubParser.parse(&req),
            Err(ParseError::MalformedPayload(_))
        ));
    }
}
