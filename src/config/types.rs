use serde::Deserialize;
use std::time::Duration;

/// Identifier sent when neither a site override, a configured default, nor a
/// rotation pool supplies a user agent.
pub const BUILTIN_USER_AGENT: &str = concat!(
    "sitemap-watch/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/sitemap-watch/sitemap-watch)"
);

/// Main configuration structure for Sitemap-Watch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub walker: WalkerConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// HTTP fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// User agent used when a site has no override
    #[serde(rename = "default-user-agent")]
    pub default_user_agent: Option<String>,

    /// Pool drawn from when no explicit user agent is given
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// Pause before every request attempt (milliseconds)
    #[serde(rename = "politeness-delay-ms")]
    pub politeness_delay_ms: u64,

    /// Attempt ceiling for idempotent requests
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds), doubled per retry
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single retry delay (milliseconds)
    #[serde(rename = "backoff-cap-ms")]
    pub backoff_cap_ms: u64,

    /// Randomize retry delays
    pub jitter: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            default_user_agent: None,
            user_agents: default_user_agents(),
            politeness_delay_ms: 1000,
            max_attempts: 3,
            backoff_base_ms: 2000,
            backoff_cap_ms: 10_000,
            jitter: false,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Limits for the recursive sitemap walk
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Maximum number of distinct sitemap documents fetched per cycle
    #[serde(rename = "max-sitemaps")]
    pub max_sitemaps: usize,

    /// Maximum index nesting below the root sitemap
    #[serde(rename = "max-depth")]
    pub max_depth: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_sitemaps: 500,
            max_depth: 5,
        }
    }
}

/// How two sitemap URLs are judged to be the same page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UrlIdentity {
    /// Byte-for-byte string equality
    #[default]
    Exact,
    /// Equality after scheme/host case folding, default port, fragment and
    /// trailing slash removal
    Normalized,
}

/// Diff behavior
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    #[serde(rename = "url-identity")]
    pub url_identity: UrlIdentity,
}

/// Multi-site run behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Number of sites processed at the same time
    #[serde(rename = "max-concurrent-sites")]
    pub max_concurrent_sites: u32,

    /// Pause after each site before its slot is released (milliseconds)
    #[serde(rename = "site-delay-ms")]
    pub site_delay_ms: u64,

    /// Deadline for one site cycle, fetch through commit (seconds)
    #[serde(rename = "cycle-timeout-secs")]
    pub cycle_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sites: 1,
            site_delay_ms: 1000,
            cycle_timeout_secs: 600,
        }
    }
}

impl RunnerConfig {
    pub fn site_delay(&self) -> Duration {
        Duration::from_millis(self.site_delay_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./sitemap-watch.db".to_string(),
        }
    }
}

/// Webhook notification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook endpoint; notifications are disabled when unset
    #[serde(rename = "webhook-url")]
    pub webhook_url: Option<String>,

    /// Signing secret; requests are sent unsigned when unset
    pub secret: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            secret: None,
            timeout_secs: 10,
        }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
