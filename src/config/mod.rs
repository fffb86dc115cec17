pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Seconds to wait for the backend's response headers.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Longest silence, in seconds, tolerated between two body reads of a
    /// backend stream. The stream as a whole has no deadline.
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_stream_idle_timeout() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            stream_idle_timeout: default_stream_idle_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// The Responses API backend (an Azure OpenAI resource).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL up to and including `/openai` or `/openai/v1`; `/responses`
    /// is appended when requests are sent.
    pub base_url: String,
    pub api_key: String,
    /// Deployment name sent as the outbound `model`.
    #[serde(default)]
    pub deployment: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Client authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    pub allowed_keys: Vec<String>,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
