//! Canonical event envelope and its binary-mode HTTP header encoding.
//!
//! A [`CanonicalEvent`] is produced by exactly one provider parser per
//! request. It is immutable apart from [`CanonicalEvent::backfill`], which
//! fills in `id` and `time` when the provider payload carried neither, and it
//! is consumed once to stamp `ce-*` headers onto the outbound request.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::uri::PathAndQuery;
use uuid::Uuid;

use crate::webhook::ParseError;

/// CloudEvents specification version stamped on every event.
pub const SPEC_VERSION: &str = "1.0";

pub const CE_SPECVERSION: HeaderName = HeaderName::from_static("ce-specversion");
pub const CE_ID: HeaderName = HeaderName::from_static("ce-id");
pub const CE_TYPE: HeaderName = HeaderName::from_static("ce-type");
pub const CE_SOURCE: HeaderName = HeaderName::from_static("ce-source");
pub const CE_TIME: HeaderName = HeaderName::from_static("ce-time");
pub const CE_SUBJECT: HeaderName = HeaderName::from_static("ce-subject");
pub const CE_DATASCHEMA: HeaderName = HeaderName::from_static("ce-dataschema");

const CE_PREFIX: &str = "ce-";

/// A URI reference identifying where an event originated.
///
/// Either an absolute URL (`https://api.github.com/repos/o/r`) or a relative
/// reference (`/notifications/abc`). The text is kept exactly as produced so
/// the emitted `ce-source` is not re-normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source(String);

impl Source {
    /// Validate a URI reference.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` if the value is empty, contains whitespace
    /// or control characters, or is neither an absolute URL nor a valid
    /// relative reference.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        if value.is_empty() {
            return Err(ParseError::MalformedPayload("empty source".to_string()));
        }
        // The URL parser strips or escapes these, but the raw text is what
        // gets emitted.
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ParseError::MalformedPayload(format!(
                "source URI contains whitespace or control characters: {value:?}"
            )));
        }

        let valid = match url::Url::parse(value) {
            Ok(_) => true,
            Err(url::ParseError::RelativeUrlWithoutBase) => PathAndQuery::from_str(value).is_ok(),
            Err(_) => false,
        };
        if !valid || HeaderValue::from_str(value).is_err() {
            return Err(ParseError::MalformedPayload(format!(
                "invalid source URI: {value}"
            )));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized envelope for one accepted webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    id: Option<String>,
    source: Source,
    event_type: String,
    data_content_type: Option<String>,
    data_schema: Option<Source>,
    subject: Option<String>,
    time: Option<DateTime<Utc>>,
}

impl CanonicalEvent {
    /// Create an envelope with the two attributes every provider must supply.
    ///
    /// # Errors
    ///
    /// `UnsupportedEventType` when `event_type` is empty, `MalformedPayload`
    /// when `source` is not a valid URI reference.
    pub fn new(event_type: impl Into<String>, source: &str) -> Result<Self, ParseError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(ParseError::UnsupportedEventType(
                "empty event type".to_string(),
            ));
        }

        Ok(Self {
            id: None,
            source: Source::parse(source)?,
            event_type,
            data_content_type: None,
            data_schema: None,
            subject: None,
            time: None,
        })
    }

    /// Set the provider-supplied identifier. An empty string leaves it unset.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.id = (!id.is_empty()).then_some(id);
        self
    }

    pub fn with_data_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.data_content_type = Some(content_type.into());
        self
    }

    /// # Errors
    ///
    /// `MalformedPayload` when `schema` is not a valid URI reference.
    pub fn with_data_schema(mut self, schema: &str) -> Result<Self, ParseError> {
        self.data_schema = Some(Source::parse(schema)?);
        Ok(self)
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        self.subject = (!subject.is_empty()).then_some(subject);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data_content_type(&self) -> Option<&str> {
        self.data_content_type.as_deref()
    }

    pub fn data_schema(&self) -> Option<&Source> {
        self.data_schema.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// Fill `id` with a fresh UUID v4 and `time` with `received_at`, each only
    /// when the parser left it unset.
    pub fn backfill(&mut self, received_at: DateTime<Utc>) {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
        if self.time.is_none() {
            self.time = Some(received_at);
        }
    }

    /// Stamp the envelope onto `headers` as CloudEvents binary-mode headers.
    ///
    /// Every inbound `ce-*` header is removed first, so the result carries
    /// exactly the headers implied by the populated attributes. `ce-id` is
    /// only written when an id is set; the egress guard rejects requests
    /// without one.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` when a provider-supplied value cannot be encoded
    /// as a header value.
    pub fn apply_to(&self, headers: &mut HeaderMap) -> Result<(), ParseError> {
        let stale: Vec<HeaderName> = headers
            .keys()
            .filter(|name| name.as_str().starts_with(CE_PREFIX))
            .cloned()
            .collect();
        for name in stale {
            headers.remove(&name);
        }

        headers.insert(CE_SPECVERSION, HeaderValue::from_static(SPEC_VERSION));
        headers.insert(CE_TYPE, header_value("type", &self.event_type)?);
        headers.insert(CE_SOURCE, header_value("source", self.source.as_str())?);

        if let Some(id) = &self.id {
            headers.insert(CE_ID, header_value("id", id)?);
        }
        if let Some(time) = self.time {
            let formatted = time.to_rfc3339_opts(SecondsFormat::Secs, true);
            headers.insert(CE_TIME, header_value("time", &formatted)?);
        }
        if let Some(subject) = &self.subject {
            headers.insert(CE_SUBJECT, header_value("subject", subject)?);
        }
        if let Some(schema) = &self.data_schema {
            headers.insert(CE_DATASCHEMA, header_value("dataschema", schema.as_str())?);
        }
        if let Some(content_type) = &self.data_content_type {
            headers.insert(CONTENT_TYPE, header_value("datacontenttype", content_type)?);
        }

        Ok(())
    }
}

fn header_value(attribute: &str, value: &str) -> Result<HeaderValue, ParseError> {
    HeaderValue::from_str(value).map_err(|_| {
        ParseError::MalformedPayload(format!("{attribute} is not a valid header value"))
    })
}
