//! Configuration schema type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::duration_format;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:24381";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-Level Schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Root configuration structure.
///
/// # Example
/// ```yaml
/// listen: 0.0.0.0:24381
///
/// github:
///   path: /github
///   backend: http://ci.internal:8080/events
///   secret: ${GITHUB_WEBHOOK_SECRET}
///
/// dockerhub:
///   backend: http://registry-hooks.internal/
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Socket address the gateway listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Optional listener TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerhub: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager: Option<ProviderConfig>,

    #[serde(
        default,
        rename = "anchore-engine",
        skip_serializing_if = "Option::is_none"
    )]
    pub anchore_engine: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clair: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<ProviderConfig>,

    /// Request size and time limits.
    #[serde(default)]
    pub limits: Limits,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Config {
    /// Configuration section for `provider`, if present in the file.
    pub fn provider(&self, provider: Provider) -> Option<&ProviderConfig> {
        match provider {
            Provider::GitHub => self.github.as_ref(),
            Provider::DockerHub => self.dockerhub.as_ref(),
            Provider::Alertmanager => self.alertmanager.as_ref(),
            Provider::AnchoreEngine => self.anchore_engine.as_ref(),
            Provider::Clair => self.clair.as_ref(),
            Provider::Slack => self.slack.as_ref(),
        }
    }

    /// Providers that will get a route: those with a non-empty backend.
    pub fn enabled_providers(&self) -> impl Iterator<Item = (Provider, &ProviderConfig)> {
        Provider::ALL.into_iter().filter_map(|p| {
            self.provider(p)
                .filter(|cfg| cfg.backend().is_some())
                .map(|cfg| (p, cfg))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TLS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// PEM certificate chain and private key for the listener.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl TlsConfig {
    /// TLS is on only when both files are named; an empty section means
    /// plaintext.
    pub fn is_enabled(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Webhook providers the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    GitHub,
    DockerHub,
    Alertmanager,
    AnchoreEngine,
    Clair,
    Slack,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::GitHub,
        Provider::DockerHub,
        Provider::Alertmanager,
        Provider::AnchoreEngine,
        Provider::Clair,
        Provider::Slack,
    ];

    /// Key of the provider's section in the configuration file.
    pub fn config_key(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::DockerHub => "dockerhub",
            Provider::Alertmanager => "alertmanager",
            Provider::AnchoreEngine => "anchore-engine",
            Provider::Clair => "clair",
            Provider::Slack => "slack",
        }
    }

    /// Route path used when the section does not set `path`.
    pub fn default_path(self) -> &'static str {
        match self {
            Provider::GitHub => "/github",
            Provider::DockerHub => "/dockerhub",
            Provider::Alertmanager => "/alertmanager",
            Provider::AnchoreEngine => "/anchore-engine",
            Provider::Clair => "/clair",
            Provider::Slack => "/slack",
        }
    }

    /// Whether the provider authenticates deliveries with the shared secret.
    pub fn verifies_signatures(self) -> bool {
        matches!(self, Provider::GitHub)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.config_key())
    }
}

/// One provider's route.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Route path; the provider's default path when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Absolute `http`/`https` URL events are forwarded to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Shared secret for signature verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl ProviderConfig {
    pub fn path_or_default(&self, provider: Provider) -> &str {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(provider.default_path())
    }

    /// The backend URL, treating an empty string as unset.
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref().filter(|b| !b.is_empty())
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounds applied to every request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Limits {
    /// Largest inbound body accepted, in bytes.
    pub max_body_bytes: usize,

    /// Time allowed for the client to send the whole body.
    #[serde(with = "duration_format")]
    pub read_timeout: Duration,

    /// Time allowed for the backend to answer, and to stream its response.
    #[serde(with = "duration_format")]
    pub backend_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}
