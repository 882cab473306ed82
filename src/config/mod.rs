//! Gateway configuration.
//!
//! This module provides:
//! - YAML configuration parsing
//! - Environment variable substitution
//! - Validation (fatal errors and non-fatal warnings)
//!
//! # Example
//!
//! ```ignore
//! use cloudevents_gateway::config::load_and_validate;
//!
//! let (config, result) = load_and_validate(Path::new("config.yml"))?;
//! for warning in &result.warnings {
//!     tracing::warn!(%warning, "configuration warning");
//! }
//! ```

mod duration_format;
mod error;
mod loader;
mod schema;

pub use duration_format::parse_duration;
pub use error::{ConfigError, ValidationResult, ValidationWarning};
pub use loader::{
    listen_addr, load_and_validate, load_config, parse_config, substitute_env_vars, validate,
};
pub use schema::{
    Config, DEFAULT_BACKEND_TIMEOUT, DEFAULT_LISTEN, DEFAULT_MAX_BODY_BYTES, DEFAULT_READ_TIMEOUT,
    Limits, Provider, ProviderConfig, TlsConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Integration test: full loading flow from text to enabled routes.
    #[test]
    fn test_full_loading_flow() {
        let yaml = r##"
listen: 0.0.0.0:24381

github:
  backend: http://ci.internal:8080/events
  secret: test

dockerhub:
  backend: http://registry-hooks.internal/

alertmanager:
  path: /alerts
  backend: http://alerts.internal/
"##;

        let config = parse_config(yaml).unwrap();
        let result = validate(&config).unwrap();
        assert!(result.is_clean());

        let routes: Vec<_> = config
            .enabled_providers()
            .map(|(p, cfg)| (p, cfg.path_or_default(p).to_string()))
            .collect();
        assert_eq!(
            routes,
            vec![
                (Provider::GitHub, "/github".to_string()),
                (Provider::DockerHub, "/dockerhub".to_string()),
                (Provider::Alertmanager, "/alerts".to_string()),
            ]
        );
        assert_eq!(listen_addr(&config).unwrap().port(), 24381);
    }
}
