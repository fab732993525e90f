use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::client::ApiBase;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Backend origin, optionally with a path prefix (e.g. `https://host:5000/api`).
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Bearer,
    Cookie,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Session token. When absent, `CAMVAULT_TOKEN` is consulted.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub scheme: AuthScheme,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub user: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            scheme: AuthScheme::Bearer,
            cookie_name: default_cookie_name(),
            user: None,
        }
    }
}

fn default_cookie_name() -> String {
    "token".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Accept self-signed certificates (the backend's local HTTPS setup).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_discard_stale")]
    pub discard_stale: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            discard_stale: default_discard_stale(),
        }
    }
}

fn default_discard_stale() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamEndpoint {
    /// `/video/{id}`
    #[default]
    Raw,
    /// `/video/decrypted/{id}`
    Decrypted,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub endpoint: StreamEndpoint,
    #[serde(default = "default_skip_seconds")]
    pub skip_seconds: f64,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            endpoint: StreamEndpoint::Raw,
            skip_seconds: default_skip_seconds(),
            autoplay: default_autoplay(),
        }
    }
}

fn default_skip_seconds() -> f64 {
    5.0
}
fn default_autoplay() -> bool {
    true
}

impl Config {
    /// Configuration pointing at `base_url` with every other section defaulted.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            server: ServerConfig {
                base_url: base_url.to_string(),
            },
            auth: AuthConfig::default(),
            http: HttpConfig::default(),
            search: SearchConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }

    pub fn api_base(&self) -> Result<ApiBase> {
        ApiBase::parse(&self.server.base_url)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    config
        .api_base()
        .with_context(|| format!("server.base_url is invalid: '{}'", config.server.base_url))?;

    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    let skip = config.playback.skip_seconds;
    if !skip.is_finite() || skip <= 0.0 {
        anyhow::bail!("playback.skip_seconds must be a positive number of seconds");
    }

    if config.auth.scheme == AuthScheme::Cookie && config.auth.cookie_name.trim().is_empty() {
        anyhow::bail!("auth.cookie_name must be set when auth.scheme is 'cookie'");
    }

    Ok(())
}
