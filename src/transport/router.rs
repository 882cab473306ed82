//! Static route table.
//!
//! Built once at startup from the enabled provider sections and never
//! mutated afterwards, so concurrent requests read it without locking.
//!
//! # Matching
//!
//! The longest configured path wins among those that:
//! - equal the request path, or
//! - are a segment-boundary prefix of it (`/github` matches `/github/x`,
//!   not `/githubx`), or
//! - end in `/` and prefix the request path.

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, ConfigError, Provider, ProviderConfig};
use crate::dispatcher::{Backend, Dispatcher};
use crate::webhook::{
    AlertmanagerParser, AnchoreEngineParser, ClairParser, DockerHubParser, GitHubParser, Parser,
    SlackParser,
};

/// One provider endpoint.
#[derive(Debug, Clone)]
pub struct Route {
    pub provider: Provider,
    pub path: String,
    pub dispatcher: Dispatcher,
}

impl Route {
    fn matches(&self, request_path: &str) -> bool {
        if self.path.ends_with('/') {
            return request_path.starts_with(&self.path);
        }
        match request_path.strip_prefix(self.path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Immutable path → dispatcher mapping.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    // Longest path first, so the first match is the most specific one.
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build one route per provider with a non-empty backend.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidBackend` when a backend URL cannot be used as a
    /// request target. `validate` normally catches this first.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut routes = Vec::new();

        for (provider, section) in config.enabled_providers() {
            let url = section.backend().unwrap_or_default();
            let backend = Backend::parse(url).map_err(|e| ConfigError::InvalidBackend {
                provider: provider.to_string(),
                url: url.to_string(),
                message: e.to_string(),
            })?;
            let path = section.path_or_default(provider).to_string();

            info!(
                provider = %provider,
                path = %path,
                backend = %backend,
                "Registered route"
            );
            routes.push(Route {
                provider,
                path,
                dispatcher: Dispatcher::new(parser_for(provider, section), backend),
            });
        }

        Ok(Self::new(routes))
    }

    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Self { routes }
    }

    /// Most specific route for `path`.
    pub fn route(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The parser instance serving `provider`, configured from its section.
pub fn parser_for(provider: Provider, section: &ProviderConfig) -> Arc<dyn Parser> {
    match provider {
        Provider::GitHub => Arc::new(GitHubParser::new(section.secret())),
        Provider::DockerHub => Arc::new(DockerHubParser),
        Provider::Alertmanager => Arc::new(AlertmanagerParser),
        Provider::AnchoreEngine => Arc::new(AnchoreEngineParser),
        Provider::Clair => Arc::new(ClairParser),
        Provider::Slack => Arc::new(SlackParser),
    }
}
