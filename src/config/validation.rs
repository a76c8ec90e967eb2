use crate::config::types::{
    Config, HttpConfig, NotifyConfig, RunnerConfig, StorageConfig, WalkerConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_http_config(&config.http)?;
    validate_walker_config(&config.walker)?;
    validate_runner_config(&config.runner)?;
    validate_storage_config(&config.storage)?;
    validate_notify_config(&config.notify)?;
    Ok(())
}

/// Validates HTTP configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "http.timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "http.max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_base_ms > config.backoff_cap_ms {
        return Err(ConfigError::Validation(format!(
            "http.backoff-base-ms ({}) cannot exceed http.backoff-cap-ms ({})",
            config.backoff_base_ms, config.backoff_cap_ms
        )));
    }

    if let Some(agent) = &config.default_user_agent {
        validate_user_agent(agent)?;
    }

    for agent in &config.user_agents {
        validate_user_agent(agent)?;
    }

    Ok(())
}

/// User agents end up in a request header, so they must be non-empty and
/// free of control characters
fn validate_user_agent(agent: &str) -> Result<(), ConfigError> {
    if agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user agent strings cannot be empty".to_string(),
        ));
    }

    if agent.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(format!(
            "user agent contains control characters: {:?}",
            agent
        )));
    }

    Ok(())
}

fn validate_walker_config(config: &WalkerConfig) -> Result<(), ConfigError> {
    if config.max_sitemaps < 1 {
        return Err(ConfigError::Validation(
            "walker.max-sitemaps must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_runner_config(config: &RunnerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_sites < 1 || config.max_concurrent_sites > 64 {
        return Err(ConfigError::Validation(format!(
            "runner.max-concurrent-sites must be between 1 and 64, got {}",
            config.max_concurrent_sites
        )));
    }

    if config.cycle_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "runner.cycle-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "storage.database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_notify_config(config: &NotifyConfig) -> Result<(), ConfigError> {
    if let Some(webhook) = &config.webhook_url {
        let url = Url::parse(webhook)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid notify.webhook-url: {}", e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "notify.webhook-url must use http or https, got '{}'",
                url.scheme()
            )));
        }
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "notify.timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}
