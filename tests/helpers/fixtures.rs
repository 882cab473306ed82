//! Provider payloads and signing helpers.

#![allow(dead_code)]

use std::io::Write;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha1::Sha1;
use tempfile::NamedTempFile;

pub const GITHUB_SECRET: &str = "It's a Secret to Everybody";
pub const GITHUB_DELIVERY: &str = "72d3162e-cc78-11e3-81ab-4c9367dc0958";

/// `sha1=<hex>` signature of `body` as GitHub computes it.
#[must_use]
pub fn github_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

#[must_use]
pub fn github_push() -> String {
    json!({
        "ref": "refs/heads/main",
        "before": "6113728f27ae82c7b1a177c8d03f9e96e0adf246",
        "after": "0000000000000000000000000000000000000000",
        "repository": {
            "full_name": "Codertocat/Hello-World",
            "url": "https://github.com/Codertocat/Hello-World",
            "statuses_url": "https://api.github.com/repos/Codertocat/Hello-World/statuses/{sha}"
        },
        "pusher": {"name": "Codertocat"}
    })
    .to_string()
}

#[must_use]
pub fn github_issue_opened() -> String {
    json!({
        "action": "opened",
        "issue": {
            "url": "https://api.github.com/repos/Codertocat/Hello-World/issues/1",
            "number": 1
        },
        "repository": {"url": "https://api.github.com/repos/Codertocat/Hello-World"}
    })
    .to_string()
}

#[must_use]
pub fn dockerhub_push() -> String {
    json!({
        "callback_url": "https://registry.hub.docker.com/u/svendowideit/testhook/hook/2141b5bi5i5b02bec211i4eeih0242eg11000a/",
        "push_data": {
            "pushed_at": 1417566161,
            "pusher": "trustedbuilder",
            "tag": "latest"
        },
        "repository": {
            "name": "testhook",
            "namespace": "svendowideit",
            "repo_name": "svendowideit/testhook",
            "repo_url": "https://example.org/repo"
        }
    })
    .to_string()
}

#[must_use]
pub fn alertmanager_firing() -> String {
    json!({
        "version": "4",
        "groupKey": "{}:{alertname=\"HighLatency\"}",
        "status": "firing",
        "receiver": "gateway",
        "externalURL": "http://alertmanager.internal:9093",
        "alerts": [{
            "status": "firing",
            "labels": {"alertname": "HighLatency"},
            "startsAt": "2019-01-02T03:04:05Z"
        }]
    })
    .to_string()
}

#[must_use]
pub fn anchore_policy_eval() -> String {
    json!({
        "data": {
            "notification_type": "policy_eval",
            "notification_payload": {
                "notificationId": "09b9f6c7-bb1c-4d3c-8c44-a5b0c1b5e8a2",
                "subscription_key": "docker.io/library/alpine:latest",
                "userId": "admin"
            }
        }
    })
    .to_string()
}

#[must_use]
pub fn clair_notification() -> String {
    json!({"Notification": {"Name": "6e4ad270-4957-4242-b5ad-dad851379e62"}}).to_string()
}

#[must_use]
pub fn slack_command() -> &'static str {
    "token=gIkuvaNzQIHg97ATvDxqgjtO&team_id=T0001&team_domain=example&channel_id=C2147483705&channel_name=test&user_id=U2147483697&user_name=Steve&command=%2Fweather&text=94070&trigger_id=13345224609.738474920.8088930838d88f008e0"
}

/// Configuration routing the given providers to `backend`.
#[must_use]
pub fn config_yaml(backend: &str, providers: &[&str]) -> String {
    let mut yaml = String::from("listen: 127.0.0.1:0\n");
    for provider in providers {
        yaml.push_str(&format!("{provider}:\n  backend: {backend}\n"));
        if *provider == "github" {
            yaml.push_str(&format!("  secret: \"{GITHUB_SECRET}\"\n"));
        }
    }
    yaml
}

/// Self-signed `localhost` certificate and key as PEM files. The files are
/// removed when this is dropped.
pub struct SelfSignedPem {
    pub cert: NamedTempFile,
    pub key: NamedTempFile,
}

impl SelfSignedPem {
    #[must_use]
    pub fn generate() -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(cert.pem().as_bytes()).unwrap();
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(key_pair.serialize_pem().as_bytes()).unwrap();

        Self {
            cert: cert_file,
            key: key_file,
        }
    }

    /// `tls` section pointing at the generated files.
    #[must_use]
    pub fn tls_yaml(&self) -> String {
        format!(
            "tls:\n  certFile: {}\n  keyFile: {}\n",
            self.cert.path().display(),
            self.key.path().display()
        )
    }
}
