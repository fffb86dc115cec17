use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_allowed_keys(config)?;
    validate_backend(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.stream_idle_timeout == 0 {
        return Err(validation_err(
            "server.stream_idle_timeout must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_allowed_keys(config: &AppConfig) -> Result<(), ConfigError> {
    if config.client_authentication.allowed_keys.is_empty() {
        return Err(validation_err("allowed_keys cannot be empty"));
    }
    for key in &config.client_authentication.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err("allowed_keys contains an empty key"));
        }
    }
    Ok(())
}

fn validate_backend(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    let parsed = url::Url::parse(&backend.base_url)
        .map_err(|err| validation_err(format!("backend.base_url is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "backend.base_url must start with http:// or https://",
        ));
    }
    if backend.api_key.trim().is_empty() {
        return Err(validation_err("backend.api_key cannot be empty"));
    }
    if backend.deployment.trim().is_empty() {
        return Err(validation_err("backend.deployment cannot be empty"));
    }
    if let Some(version) = backend.api_version.as_deref() {
        if version.trim().is_empty() {
            return Err(validation_err(
                "backend.api_version cannot be empty when set",
            ));
        }
    }
    validate_proxy_url(backend.proxy.as_deref())
}

fn validate_proxy_url(proxy: Option<&str>) -> Result<(), ConfigError> {
    let Some(proxy) = proxy.map(str::trim) else {
        return Ok(());
    };
    if proxy.is_empty() {
        return Err(validation_err("backend.proxy cannot be empty when set"));
    }
    let parsed = url::Url::parse(proxy)
        .map_err(|err| validation_err(format!("backend.proxy is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "backend.proxy must use http:// or https://",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
