//! Crawler module for sitemap monitoring
//!
//! This module contains the core monitoring logic, including:
//! - HTTP fetching with politeness delay, retry and gzip handling
//! - Sitemap classification and parsing
//! - Recursive sitemap walks with cycle detection
//! - Per-site cycle orchestration and multi-site scheduling

mod fetcher;
mod orchestrator;
mod parser;
mod retry;
mod scheduler;
mod walker;

pub use fetcher::{build_http_client, is_gzip_flagged, FetchError, FetchOptions, Fetcher};
pub use orchestrator::{CycleOutcome, NotificationOutcome, Orchestrator};
pub use parser::{
    classify, parse_index, parse_lastmod, parse_leaf, ParseError, SitemapEntry, SitemapKind,
    SITEMAP_NS,
};
pub use retry::RetryPolicy;
pub use scheduler::{run_sites, SiteReport};
pub use walker::{SitemapWalk, SitemapWalker, WalkCancelled};
