//! GitHub webhooks.
//!
//! Deliveries are authenticated with an HMAC of the raw body keyed by the
//! webhook secret. GitHub sends the SHA-1 digest in `X-Hub-Signature` and,
//! on newer installations, a SHA-256 digest in `X-Hub-Signature-256`; the
//! stronger one is checked whenever it is present.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use http::{HeaderMap, Request};
use serde_json::Value;
use sha1::Sha1;
use sha2::Sha256;

use super::{
    APPLICATION_JSON, FORM_URLENCODED, ParseError, Parser, decode_form, decode_json, header_str,
    media_type, require_body,
};
use crate::cloudevents::CanonicalEvent;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

/// JSON pointer of the resource URL used as `ce-source`, per event kind.
const EVENT_SOURCES: &[(&str, &str)] = &[
    ("check_run", "/check_run/url"),
    ("check_suite", "/check_suite/url"),
    ("commit_comment", "/comment/url"),
    ("create", "/repository/url"),
    ("delete", "/repository/url"),
    ("deployment", "/deployment/url"),
    ("deployment_status", "/deployment/url"),
    ("fork", "/forkee/url"),
    ("gollum", "/repository/url"),
    ("installation", "/installation/html_url"),
    ("installation_repositories", "/installation/html_url"),
    ("issue_comment", "/comment/url"),
    ("issues", "/issue/url"),
    ("label", "/label/url"),
    ("marketplace_purchase", "/sender/url"),
    ("member", "/member/url"),
    ("membership", "/team/url"),
    ("milestone", "/milestone/url"),
    ("organization", "/organization/url"),
    ("org_block", "/organization/url"),
    ("page_build", "/build/url"),
    ("ping", "/hook/url"),
    ("project_card", "/project_card/url"),
    ("project_column", "/project_column/url"),
    ("project", "/project/url"),
    ("public", "/repository/url"),
    ("pull_request_review_comment", "/comment/url"),
    ("pull_request_review", "/pull_request/url"),
    ("pull_request", "/pull_request/url"),
    ("release", "/release/url"),
    ("repository", "/repository/url"),
    ("status", "/commit/url"),
    ("team", "/team/url"),
    ("team_add", "/team/url"),
    ("watch", "/repository/url"),
];

/// Parser for GitHub repository and organization webhooks.
#[derive(Clone, Default)]
pub struct GitHubParser {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for GitHubParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubParser")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl GitHubParser {
    /// Create a parser. An empty or absent secret disables signature checks.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
        }
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), ParseError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        if let Some(signature) = header_str(headers, SIGNATURE_256_HEADER) {
            let digest = decode_signature(signature, "sha256=")?;
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|e| ParseError::InvalidSignature(e.to_string()))?;
            mac.update(body);
            return mac
                .verify_slice(&digest)
                .map_err(|_| ParseError::InvalidSignature("sha256 digest mismatch".to_string()));
        }

        let signature = header_str(headers, SIGNATURE_HEADER).ok_or_else(|| {
            ParseError::InvalidSignature("missing X-Hub-Signature header".to_string())
        })?;
        let digest = decode_signature(signature, "sha1=")?;
        let mut mac = Hmac::<Sha1>::new_from_slice(secret)
            .map_err(|e| ParseError::InvalidSignature(e.to_string()))?;
        mac.update(body);
        mac.verify_slice(&digest)
            .map_err(|_| ParseError::InvalidSignature("sha1 digest mismatch".to_string()))
    }
}

fn decode_signature(signature: &str, prefix: &str) -> Result<Vec<u8>, ParseError> {
    let hex_digest = signature.strip_prefix(prefix).ok_or_else(|| {
        ParseError::InvalidSignature(format!("signature does not start with {prefix}"))
    })?;
    hex::decode(hex_digest)
        .map_err(|e| ParseError::InvalidSignature(format!("signature is not hex: {e}")))
}

/// The JSON document, either the raw body or the `payload` form field.
fn decode_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, ParseError> {
    match media_type(headers).as_deref() {
        Some(APPLICATION_JSON) => decode_json(body),
        Some(FORM_URLENCODED) => {
            let form = decode_form(body);
            let payload = form.get("payload").ok_or_else(|| {
                ParseError::MalformedPayload("form body has no payload field".to_string())
            })?;
            decode_json(payload.as_bytes())
        }
        other => Err(ParseError::MalformedPayload(format!(
            "unsupported content type: {}",
            other.unwrap_or("none")
        ))),
    }
}

/// Source URL for `kind`, or `None` when the kind is unmapped or the payload
/// lacks the field.
fn event_source(kind: &str, payload: &Value) -> Option<String> {
    if kind == "push" {
        // `repository.url` on push events is the HTML URL, so the git ref API
        // URL is derived from the statuses endpoint instead.
        let statuses = payload.pointer("/repository/statuses_url")?.as_str()?;
        let git_ref = payload.pointer("/ref")?.as_str()?;
        let base = url::Url::parse(statuses).ok()?;
        return base
            .join(&format!("../git/{git_ref}"))
            .ok()
            .map(String::from);
    }

    let (_, pointer) = EVENT_SOURCES.iter().find(|(k, _)| *k == kind)?;
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Parser for GitHubParser {
    fn provider(&self) -> &'static str {
        "github"
    }

    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError> {
        let body = require_body(req)?;
        let headers = req.headers();

        self.verify_signature(headers, body)?;

        let kind = header_str(headers, EVENT_HEADER)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ParseError::MalformedPayload("missing X-GitHub-Event header".to_string())
            })?;
        let payload = decode_payload(headers, body)?;

        let source = event_source(kind, &payload)
            .ok_or_else(|| ParseError::UnsupportedEventType(kind.to_string()))?;

        let event_type = match payload.get("action").and_then(Value::as_str) {
            Some(action) if !action.is_empty() => format!("com.github.{kind}.{action}"),
            _ => format!("com.github.{kind}"),
        };

        let event = CanonicalEvent::new(event_type, &source)?
            .with_id(header_str(headers, DELIVERY_HEADER).unwrap_or_default())
            .with_data_content_type(APPLICATION_JSON);
        Ok(event)
    }
}
