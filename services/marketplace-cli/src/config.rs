//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password is read from a password file or MARKETPLACE_PASSWORD,
//! never from the TOML, to keep it out of config checked into dotfiles.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use marketplace_auth::DEFAULT_API_BASE;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "marketplace.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub credentials: CredentialsConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where tokens live between runs. No path keeps them in memory only.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file at the default location means
    /// "use defaults". An explicitly chosen path must exist.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
            return Config::default().finish();
        }
        Self::load(path)
    }

    /// Apply env overrides and validate.
    fn finish(mut self) -> common::Result<Self> {
        if let Ok(base) = std::env::var("MARKETPLACE_API_BASE") {
            if !base.trim().is_empty() {
                self.api.base_url = base.trim().to_string();
            }
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

/// Login password: the first line of `password_file` when one is given,
/// else the MARKETPLACE_PASSWORD env var.
pub fn resolve_password(password_file: Option<&Path>) -> common::Result<Secret<String>> {
    if let Some(file) = password_file {
        let contents = std::fs::read_to_string(file).map_err(|e| {
            common::Error::Config(format!(
                "failed to read password file {}: {e}",
                file.display()
            ))
        })?;
        let password = contents.lines().next().unwrap_or_default().to_string();
        return Secret::<String>::non_empty(password).ok_or_else(|| {
            common::Error::Config(format!("password file {} is empty", file.display()))
        });
    }

    std::env::var("MARKETPLACE_PASSWORD")
        .ok()
        .and_then(Secret::<String>::non_empty)
        .ok_or_else(|| {
            common::Error::Config(
                "no password given; pass --password-file or set MARKETPLACE_PASSWORD".into(),
            )
        })
}
