//! Application configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file at
//! `CONFIG_PATH` (default `config.toml`), then environment variables.

pub mod env_config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::risk::trainer::{TrainerConfig, DEFAULT_MIN_ROWS};

pub use env_config::apply_env_overrides;

/// Default path of the optional TOML file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Service configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Shared secret code checked by the gate
    #[serde(default = "AppConfig::default_static_pin")]
    pub static_pin: String,

    /// Training dataset location
    #[serde(default = "AppConfig::default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Amount at or above which the rule says FRAUD
    #[serde(default = "AppConfig::default_fallback_threshold")]
    pub fallback_amount_threshold: f64,

    /// HMAC key for the session cookie
    #[serde(default = "AppConfig::default_secret_key")]
    pub secret_key: String,

    #[serde(default = "AppConfig::default_host")]
    pub host: String,

    #[serde(default = "AppConfig::default_port")]
    pub port: u16,

    #[serde(default)]
    pub debug: bool,

    /// Idle session lifetime (seconds)
    #[serde(default = "AppConfig::default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "AppConfig::default_min_training_rows")]
    pub min_training_rows: usize,

    /// Pause after a failed training run (seconds, 0 = retry on every cold call)
    #[serde(default)]
    pub retrain_cooldown_secs: u64,
}

impl AppConfig {
    fn default_static_pin() -> String { "336333".to_string() }
    fn default_dataset_path() -> PathBuf { PathBuf::from("synthetic_fraud_dataset_balanced.csv") }
    fn default_fallback_threshold() -> f64 { 10_000.0 }
    fn default_secret_key() -> String { "dev-secret-change-me".to_string() }
    fn default_host() -> String { "0.0.0.0".to_string() }
    fn default_port() -> u16 { 5000 }
    fn default_session_ttl_secs() -> u64 { 3600 }
    fn default_min_training_rows() -> usize { DEFAULT_MIN_ROWS }

    /// Load from `CONFIG_PATH` and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with an arbitrary variable source.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("CONFIG_PATH").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_toml_file(Path::new(&path))?
        } else {
            Self::default()
        };

        apply_env_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// `CONFIG_PATH` when it is set but names no file. Loading falls back
    /// to defaults in that case; the caller reports it once logging is up.
    pub fn missing_config_path<F>(lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("CONFIG_PATH").filter(|path| !Path::new(path).exists())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.static_pin.trim().is_empty() {
            bail!("static_pin must not be empty");
        }
        if self.secret_key.is_empty() {
            bail!("secret_key must not be empty");
        }
        if !self.fallback_amount_threshold.is_finite() || self.fallback_amount_threshold < 0.0 {
            bail!(
                "fallback_amount_threshold must be a non-negative number, got {}",
                self.fallback_amount_threshold
            );
        }
        if self.session_ttl_secs == 0 {
            bail!("session_ttl_secs must be positive");
        }
        if self.min_training_rows == 0 {
            bail!("min_training_rows must be positive");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn retrain_cooldown(&self) -> Duration {
        Duration::from_secs(self.retrain_cooldown_secs)
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            min_rows: self.min_training_rows,
            ..TrainerConfig::default()
        }
    }

    /// True while the signing key is still the shipped default
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == Self::default_secret_key()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            static_pin: Self::default_static_pin(),
            dataset_path: Self::default_dataset_path(),
            fallback_amount_threshold: Self::default_fallback_threshold(),
            secret_key: Self::default_secret_key(),
            host: Self::default_host(),
            port: Self::default_port(),
            debug: false,
            session_ttl_secs: Self::default_session_ttl_secs(),
            min_training_rows: Self::default_min_training_rows(),
            retrain_cooldown_secs: 0,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("static_pin", &"<redacted>")
            .field("dataset_path", &self.dataset_path)
            .field("fallback_amount_threshold", &self.fallback_amount_threshold)
            .field("secret_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("min_training_rows", &self.min_training_rows)
            .field("retrain_cooldown_secs", &self.retrain_cooldown_secs)
            .finish()
    }
}
