//! Slack slash commands.
//!
//! Slash commands arrive form-encoded. `team_domain`, `channel_id` and
//! `trigger_id` are required, checked in that order; the source is the
//! channel the command was typed in.

use std::collections::HashMap;

use bytes::Bytes;
use http::Request;

use super::{FORM_URLENCODED, ParseError, Parser, decode_form, required};
use crate::cloudevents::CanonicalEvent;

pub const EVENT_TYPE: &str = "com.slack.slash_command";

#[derive(Debug, Clone, Copy, Default)]
pub struct SlackParser;

fn field<'a>(form: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, ParseError> {
    required(form.get(name).map(String::as_str), name)
}

impl Parser for SlackParser {
    fn provider(&self) -> &'static str {
        "slack"
    }

    fn parse(&self, req: &Request<Bytes>) -> Result<CanonicalEvent, ParseError> {
        let form = decode_form(req.body());

        let team_domain = field(&form, "team_domain")?;
        let channel_id = field(&form, "channel_id")?;
        let trigger_id = field(&form, "trigger_id")?;

        let source = format!("https://{team_domain}.slack.com/messages/{channel_id}");
        let event = CanonicalEvent::new(EVENT_TYPE, &source)?
            .with_id(trigger_id)
            .with_data_content_type(FORM_URLENCODED);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::test_support::request;

    const SLASH_COMMAND: &str = "token=gIkuvaNzQIHg97ATvDxqgjtO&team_id=T0001&team_domain=example\
        &enterprise_id=E0001&enterprise_name=Globular%20Construct%20Inc&channel_id=C2147483705\
        &channel_name=test&user_id=U2147483697&user_name=Steve&command=/weather&text=94070\
        &response_url=https://hooks.slack.com/commands/1234/5678\
        &trigger_id=13345224609.738474920.8088930838d88f008e0";

    #[test]
    fn slash_command_maps_to_channel_source() {
        let event = SlackParser
            .parse(&request(FORM_URLENCODED, SLASH_COMMAND))
            .unwrap();

        assert_eq!(event.event_type(), "com.slack.slash_command");
        assert_eq!(
            event.source().as_str(),
            "https://example.slack.com/messages/C2147483705"
        );
        assert_eq!(event.id(), Some("13345224609.738474920.8088930838d88f008e0"));
        assert_eq!(event.data_content_type(), Some(FORM_URLENCODED));
    }

    #[test]
    fn each_missing_field_is_reported_distinctly() {
        let cases = [
            ("channel_id=C1&trigger_id=t", "team_domain"),
            ("team_domain=example&trigger_id=t", "channel_id"),
            ("team_domain=example&channel_id=C1&trigger_id=", "trigger_id"),
        ];

        for (body, field) in cases {
            assert_eq!(
                SlackParser.parse(&request(FORM_URLENCODED, body)),
                Err(ParseError::MissingField(field))
            );
        }
    }

    #[test]
    fn empty_body_reports_first_required_field() {
        assert_eq!(
            SlackParser.parse(&request(FORM_URLENCODED, "")),
            Err(ParseError::MissingField("team_domain"))
        );
    }
}
