#![no_main]

//! Feeds arbitrary bodies and headers to every provider parser.
//!
//! A parser may reject any input, but must never panic, and an accepted
//! event must always render to valid `ce-*` headers.

use arbitrary::Arbitrary;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Request};
use libfuzzer_sys::fuzz_target;

use cloudevents_gateway::cloudevents::CE_ID;
use cloudevents_gateway::webhook::{
    AlertmanagerParser, AnchoreEngineParser, ClairParser, DockerHubParser, GitHubParser, Parser,
    SlackParser,
};

#[derive(Arbitrary, Debug)]
struct FuzzRequest {
    provider: u8,
    content_type: Option<String>,
    github_event: Option<String>,
    signature: Option<String>,
    body: Vec<u8>,
}

fn header(builder: http::request::Builder, name: &'static str, value: Option<&str>) -> http::request::Builder {
    match value.and_then(|v| HeaderValue::from_str(v).ok()) {
        Some(v) => builder.header(HeaderName::from_static(name), v),
        None => builder,
    }
}

fuzz_target!(|input: FuzzRequest| {
    let parser: Box<dyn Parser> = match input.provider % 7 {
        0 => Box::new(GitHubParser::new(None)),
        1 => Box::new(GitHubParser::new(Some("fuzz-secret"))),
        2 => Box::new(DockerHubParser),
        3 => Box::new(AlertmanagerParser),
        4 => Box::new(AnchoreEngineParser),
        5 => Box::new(ClairParser),
        _ => Box::new(SlackParser),
    };

    let mut builder = Request::post("/");
    builder = header(builder, "content-type", input.content_type.as_deref());
    builder = header(builder, "x-github-event", input.github_event.as_deref());
    builder = header(builder, "x-hub-signature", input.signature.as_deref());
    let Ok(req) = builder.body(Bytes::from(input.body)) else {
        return;
    };

    if let Ok(mut event) = parser.parse(&req) {
        event.backfill(chrono::Utc::now());
        let mut headers = HeaderMap::new();
        if event.apply_to(&mut headers).is_ok() {
            assert!(headers.contains_key(CE_ID));
            assert_eq!(headers["ce-specversion"], "1.0");
        }
    }
});
