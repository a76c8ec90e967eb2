use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `notify.webhook-url`
pub const WEBHOOK_URL_ENV: &str = "SITEMAP_WATCH_WEBHOOK_URL";

/// Environment variable overriding `notify.secret`
pub const WEBHOOK_SECRET_ENV: &str = "SITEMAP_WATCH_WEBHOOK_SECRET";

/// Loads and parses a configuration file from the given path
///
/// Webhook settings may be overridden from the environment so secrets do not
/// have to live in the file.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sitemap_watch::config::load_config;
///
/// let config = load_config(Path::new("sitemap-watch.toml")).unwrap();
/// println!("Database: {}", config.storage.database_path);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Parses configuration from a TOML string without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Applies environment overrides using the given lookup
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(WEBHOOK_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.notify.webhook_url = Some(url);
    }

    if let Some(secret) = lookup(WEBHOOK_SECRET_ENV).filter(|v| !v.trim().is_empty()) {
        config.notify.secret = Some(secret);
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
