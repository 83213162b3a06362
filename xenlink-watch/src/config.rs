//! Configuration management for the event tail.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use xenlink_client::ClientConfig;
use xenlink_common::LogFormat;

use crate::cli::Args;

/// Location tried when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/xenlink/watch.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection to the pool master
    pub server: ServerConfig,
    /// What to follow
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref url) = args.url {
            self.server.url = url.clone();
        }

        if let Some(ref username) = args.username {
            self.server.username = username.clone();
        }

        if let Some(ref password) = args.password {
            self.server.password = Some(password.clone());
        }

        if args.insecure {
            self.server.accept_invalid_certs = true;
        }

        if !args.classes.is_empty() {
            self.watch.classes = args.classes.clone();
        }

        if let Some(timeout) = args.timeout {
            self.watch.timeout_secs = timeout;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.json_logs {
            self.logging.format = LogFormat::Json;
        }

        self
    }

    /// Defaults with CLI overrides, used when no config file exists.
    pub fn default_with_cli(args: &Args) -> Self {
        Self::default().with_cli_overrides(args)
    }
}

/// Pool master connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub username: String,
    /// Usually supplied through `XENLINK_PASSWORD` instead
    pub password: Option<String>,
    pub request_timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            url: client.url,
            username: "root".to_string(),
            password: None,
            request_timeout_secs: client.request_timeout_secs,
            accept_invalid_certs: client.accept_invalid_certs,
        }
    }
}

impl ServerConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.clone(),
            request_timeout_secs: self.request_timeout_secs,
            accept_invalid_certs: self.accept_invalid_certs,
            ..ClientConfig::default()
        }
    }
}

/// Event subscription settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Class names, `*` for all
    pub classes: Vec<String>,
    pub timeout_secs: f64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            classes: vec!["VM".to_string(), "host".to_string()],
            timeout_secs: 30.0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
