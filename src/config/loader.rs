//! Configuration loading and validation.
//!
//! Loading flow: read file → reject empty → substitute `${VAR}` references →
//! parse YAML → validate. Anything that fails is fatal; the gateway never
//! starts listening with a configuration it could not fully check.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::LazyLock;

use super::error::{ConfigError, ValidationResult, ValidationWarning};
use super::schema::{Config, Provider};

/// Load configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigFileNotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse configuration text (after environment substitution).
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }

    let contents = substitute_env_vars(contents)?;
    let config: Config = serde_saphyr::from_str(&contents)?;
    Ok(config)
}

/// Load and validate configuration.
pub fn load_and_validate(path: &Path) -> Result<(Config, ValidationResult), ConfigError> {
    let config = load_config(path)?;
    let result = validate(&config)?;
    Ok((config, result))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment Variable Substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// ${VAR} and ${VAR:-default}
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// Substitute environment variables in configuration text.
///
/// # Syntax
/// - `${VAR}` - Required, fail if not set
/// - `${VAR:-default}` - Optional with default
///
/// The first unresolved required variable is reported with its line number.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing: Option<(String, usize)> = None;

    let substituted = ENV_VAR_PATTERN.replace_all(content, |cap: &Captures<'_>| {
        let var = &cap[1];
        match (std::env::var(var), cap.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                if missing.is_none() {
                    let offset = cap.get(0).map_or(0, |m| m.start());
                    let line = content[..offset].matches('\n').count() + 1;
                    missing = Some((var.to_string(), line));
                }
                String::new()
            }
        }
    });

    if let Some((var, line)) = missing {
        return Err(ConfigError::MissingEnvVar { var, line });
    }

    Ok(substituted.into_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a configuration.
pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
    let mut warnings = Vec::new();

    listen_addr(config)?;

    if let Some(tls) = &config.tls {
        match (&tls.cert_file, &tls.key_file) {
            (Some(_), None) => return Err(ConfigError::IncompleteTls { missing: "keyFile" }),
            (None, Some(_)) => return Err(ConfigError::IncompleteTls { missing: "certFile" }),
            _ => {}
        }
    }

    let mut seen_paths: HashMap<&str, Provider> = HashMap::new();
    for provider in Provider::ALL {
        let Some(section) = config.provider(provider) else {
            continue;
        };

        if section.secret().is_some() && !provider.verifies_signatures() {
            warnings.push(ValidationWarning::SecretIgnored {
                provider: provider.to_string(),
            });
        }

        let Some(backend) = section.backend() else {
            warnings.push(ValidationWarning::ProviderWithoutBackend {
                provider: provider.to_string(),
            });
            continue;
        };
        validate_backend(provider, backend)?;

        let path = section.path_or_default(provider);
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPath {
                provider: provider.to_string(),
                path: path.to_string(),
            });
        }
        if let Some(first) = seen_paths.insert(path, provider) {
            return Err(ConfigError::DuplicatePath {
                path: path.to_string(),
                first: first.to_string(),
                second: provider.to_string(),
            });
        }
    }

    if seen_paths.is_empty() {
        warnings.push(ValidationWarning::NoProvidersConfigured);
    }

    let limits = &config.limits;
    if limits.max_body_bytes == 0 {
        return Err(ConfigError::InvalidLimit {
            field: "maxBodyBytes",
            message: "must be greater than zero".to_string(),
        });
    }
    if limits.read_timeout.is_zero() {
        return Err(ConfigError::InvalidLimit {
            field: "readTimeout",
            message: "must be greater than zero".to_string(),
        });
    }
    if limits.backend_timeout.is_zero() {
        return Err(ConfigError::InvalidLimit {
            field: "backendTimeout",
            message: "must be greater than zero".to_string(),
        });
    }

    Ok(ValidationResult { warnings })
}

/// The parsed `listen` address.
pub fn listen_addr(config: &Config) -> Result<SocketAddr, ConfigError> {
    config
        .listen
        .parse()
        .map_err(|e: std::net::AddrParseError| ConfigError::InvalidListenAddress {
            value: config.listen.clone(),
            message: e.to_string(),
        })
}

fn validate_backend(provider: Provider, backend: &str) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidBackend {
        provider: provider.to_string(),
        url: backend.to_string(),
        message: message.to_string(),
    };

    let url = url::Url::parse(backend).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        let mut redacted = url.clone();
        let _ = redacted.set_username("");
        let _ = redacted.set_password(None);
        return Err(ConfigError::InvalidBackend {
            provider: provider.to_string(),
            url: redacted.to_string(),
            message: "credentials are not allowed".to_string(),
        });
    }
    Ok(())
}
