//! Source configuration.
//!
//! One `SourceConfig` describes one configured repository: where it lives,
//! how to clone it, whether it is read through a mirror, and which pull
//! requests to build. It is read from TOML, with `HEADSYNC_*` environment
//! variables layered on top (`__` separates nested keys, e.g.
//! `HEADSYNC_PULL_REQUESTS__DISCOVER=false`).
//!
//! ```toml
//! server-url = "https://bitbucket.example.com"
//! owner = "PROJ"
//! repository = "service"
//! mirror-id = "mirror-eu"
//! protocol = "ssh"
//!
//! [pull-requests]
//! fork-strategies = ["merge", "head"]
//!
//! [auth]
//! token-env = "BITBUCKET_TOKEN"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::git::{CheckoutStrategy, CloneUrl, HeadOrigin, RepositoryProtocol};
use crate::provider::{Authenticator, BearerAuthenticator, TokenAuthenticator};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "HEADSYNC_CONFIG_PATH";

/// Host whose repositories use the cloud URL layout unless configured otherwise.
pub const CLOUD_HOST: &str = "bitbucket.org";

const ENV_PREFIX: &str = "HEADSYNC";

fn default_remote_name() -> String {
    "origin".to_string()
}

fn default_event_delay_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_strategies() -> Vec<CheckoutStrategy> {
    vec![CheckoutStrategy::Merge]
}

/// Pull request discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PullRequestConfig {
    /// Whether pushes should be correlated with open pull requests.
    #[serde(default = "default_true")]
    pub discover: bool,

    /// Strategies for pull requests from the configured repository itself.
    #[serde(default = "default_strategies", alias = "origin_strategies")]
    pub origin_strategies: Vec<CheckoutStrategy>,

    /// Strategies for pull requests from forks.
    #[serde(default = "default_strategies", alias = "fork_strategies")]
    pub fork_strategies: Vec<CheckoutStrategy>,
}

impl Default for PullRequestConfig {
    fn default() -> Self {
        Self {
            discover: true,
            origin_strategies: default_strategies(),
            fork_strategies: default_strategies(),
        }
    }
}

impl PullRequestConfig {
    /// Distinct strategies configured for `origin`, in configured order.
    pub fn strategies(&self, origin: HeadOrigin) -> Vec<CheckoutStrategy> {
        let configured = match origin {
            HeadOrigin::Default => &self.origin_strategies,
            HeadOrigin::Fork => &self.fork_strategies,
        };
        configured
            .iter()
            .copied()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Credentials for API calls and clone links. At most one is used, in field
/// order.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    #[serde(default)]
    pub token: Option<String>,
    /// Name of an environment variable holding the token.
    #[serde(default, alias = "token_env")]
    pub token_env: Option<String>,
    /// Bearer token used for API calls only.
    #[serde(default)]
    pub bearer: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("token_env", &self.token_env)
            .field("bearer", &self.bearer.as_ref().map(|_| "***"))
            .finish()
    }
}

/// One configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    #[serde(alias = "server_url")]
    pub server_url: String,
    pub owner: String,
    pub repository: String,

    /// Mirror the repository is read through, if any.
    #[serde(default, alias = "mirror_id")]
    pub mirror_id: Option<String>,

    /// Identifies the credentials in use; part of the pull request cache key.
    #[serde(default, alias = "credentials_id")]
    pub credentials_id: Option<String>,

    #[serde(default)]
    pub protocol: RepositoryProtocol,

    #[serde(default = "default_remote_name", alias = "remote_name")]
    pub remote_name: String,

    /// Cloud URL layout for forks. Defaults to whether the server is the cloud host.
    #[serde(default)]
    pub cloud: Option<bool>,

    /// Quiet period before a batch of head updates fires.
    #[serde(default = "default_event_delay_secs", alias = "event_delay_secs")]
    pub event_delay_secs: u64,

    #[serde(default, alias = "pull_requests")]
    pub pull_requests: PullRequestConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl SourceConfig {
    /// Load from a TOML file, applying `HEADSYNC_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        log::debug!("Loading source config from {}", path.display());
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without environment overrides.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("server-url", &self.server_url),
            ("owner", &self.owner),
            ("repository", &self.repository),
            ("remote-name", &self.remote_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("`{key}` must not be empty")));
            }
        }
        if !CloneUrl::parse(&self.server_url).is_some_and(|u| u.is_http()) {
            return Err(ConfigError::Message(format!(
                "`server-url` must be an http(s) URL, got `{}`",
                self.server_url
            )));
        }
        Ok(())
    }

    /// Host of the server URL.
    pub fn server_host(&self) -> Option<String> {
        CloneUrl::parse(&self.server_url).map(|u| u.host().to_ascii_lowercase())
    }

    /// Whether fork clone URLs use the cloud layout.
    pub fn is_cloud(&self) -> bool {
        self.cloud
            .unwrap_or_else(|| self.server_host().as_deref() == Some(CLOUD_HOST))
    }

    pub fn event_delay(&self) -> Duration {
        Duration::from_secs(self.event_delay_secs)
    }

    /// Build the configured authenticator, if any.
    pub fn authenticator(&self) -> Result<Option<Arc<dyn Authenticator>>, ConfigError> {
        let auth = &self.auth;
        if let Some(token) = &auth.token {
            return Ok(Some(Arc::new(TokenAuthenticator::new(token))));
        }
        if let Some(var) = &auth.token_env {
            let token = std::env::var(var).map_err(|_| {
                ConfigError::Message(format!("`auth.token-env` names unset variable {var}"))
            })?;
            return Ok(Some(Arc::new(TokenAuthenticator::new(token))));
        }
        if let Some(token) = &auth.bearer {
            return Ok(Some(Arc::new(BearerAuthenticator::new(token))));
        }
        Ok(None)
    }
}

/// The config file path.
///
/// Priority:
/// 1. `explicit` (the `--config` flag)
/// 2. `HEADSYNC_CONFIG_PATH`
/// 3. `<config dir>/headsync/source.toml`
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};
    // XDG on Linux and macOS, %APPDATA% on Windows
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("headsync").join("source.toml"))
}
