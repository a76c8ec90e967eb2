//! Configuration module for Sitemap-Watch
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every section has defaults, so an empty file is a valid config.
//!
//! # Example
//!
//! ```no_run
//! use sitemap_watch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitemap-watch.toml")).unwrap();
//! println!("Politeness delay: {}ms", config.http.politeness_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DiffConfig, HttpConfig, NotifyConfig, RunnerConfig, StorageConfig, UrlIdentity,
    WalkerConfig, BUILTIN_USER_AGENT,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
    WEBHOOK_SECRET_ENV, WEBHOOK_URL_ENV,
};
pub use validation::validate;
