#![no_main]

//! Header redaction must never panic and never print a sensitive value.

use arbitrary::Arbitrary;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use libfuzzer_sys::fuzz_target;

use cloudevents_gateway::logging_layer::{RedactedHeaders, SENSITIVE_HEADERS};

#[derive(Arbitrary, Debug)]
struct FuzzHeaders {
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    secret: u8,
}

fuzz_target!(|input: FuzzHeaders| {
    let marker = "fuzz-marker-0123456789";
    let mut map = HeaderMap::new();
    for (name, value) in input.headers.iter().take(100) {
        let has_marker = |bytes: &[u8]| bytes.to_ascii_lowercase().windows(marker.len()).any(|w| w == marker.as_bytes());
        if has_marker(name) || has_marker(value) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name), HeaderValue::from_bytes(value)) {
            map.append(name, value);
        }
    }

    let sensitive = SENSITIVE_HEADERS[usize::from(input.secret) % SENSITIVE_HEADERS.len()];
    map.insert(HeaderName::from_static(sensitive), HeaderValue::from_static(marker));

    let rendered = format!("{:?}", RedactedHeaders(&map));
    assert!(!rendered.contains(marker));
});
