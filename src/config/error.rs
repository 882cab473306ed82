//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors. All of them are fatal at
/// startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    // ─────────────────────────────────────────────────────────────────────────
    // Listener
    // ─────────────────────────────────────────────────────────────────────────
    /// `listen` is not a socket address.
    #[error("invalid listen address '{value}': {message}")]
    InvalidListenAddress { value: String, message: String },

    /// Only one of `tls.certFile` / `tls.keyFile` is set.
    #[error("tls requires both certFile and keyFile, missing {missing}")]
    IncompleteTls { missing: &'static str },

    // ─────────────────────────────────────────────────────────────────────────
    // Providers
    // ─────────────────────────────────────────────────────────────────────────
    /// Backend is not an absolute http(s) URL with a host.
    #[error("invalid backend URL '{url}' for {provider}: {message}")]
    InvalidBackend {
        provider: String,
        url: String,
        message: String,
    },

    /// Route path does not start with `/`.
    #[error("route path '{path}' for {provider} must start with '/'")]
    InvalidPath { provider: String, path: String },

    /// Two providers share a route path.
    #[error("duplicate route path '{path}' used by {first} and {second}")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Limits
    // ─────────────────────────────────────────────────────────────────────────
    #[error("invalid limit {field}: {message}")]
    InvalidLimit {
        field: &'static str,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // I/O and parsing errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Required environment variable not set.
    #[error("environment variable '{var}' not set (referenced on line {line})")]
    MissingEnvVar { var: String, line: usize },

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Config file does not exist.
    #[error("configuration file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    /// Empty configuration file.
    #[error("configuration file is empty")]
    EmptyConfigFile,
}

/// Validation warnings (non-fatal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// A secret is configured for a provider that never checks it.
    SecretIgnored { provider: String },

    /// A provider section exists but has no backend, so it gets no route.
    ProviderWithoutBackend { provider: String },

    /// No provider has a backend; every request will be answered 404.
    NoProvidersConfigured,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecretIgnored { provider } => {
                write!(f, "{provider} does not verify signatures, secret is ignored")
            }
            Self::ProviderWithoutBackend { provider } => {
                write!(f, "{provider} has no backend and will not be routed")
            }
            Self::NoProvidersConfigured => write!(f, "no provider has a backend configured"),
        }
    }
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings encountered during validation.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Check if validation passed with no warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
