//! Recursive sitemap walk
//!
//! Starting from a site's sitemap URL, index documents are expanded
//! depth-first in document order and leaf documents contribute their page
//! entries. Each distinct sitemap URL is fetched at most once per walk.

use crate::config::WalkerConfig;
use crate::crawler::fetcher::{FetchOptions, Fetcher};
use crate::crawler::parser::{classify, parse_index, parse_leaf, SitemapEntry, SitemapKind};
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The walk was stopped by its cancellation token
#[derive(Debug, Clone, Copy, Error)]
#[error("Sitemap walk cancelled")]
pub struct WalkCancelled;

/// Result of walking one sitemap tree
#[derive(Debug, Clone, Default)]
pub struct SitemapWalk {
    /// Page entries from every leaf, in walk order
    pub entries: Vec<SitemapEntry>,
    /// Sitemap URLs fetched, in walk order
    pub visited: Vec<String>,
    /// Sitemap URLs that failed to fetch or parse
    pub failed: Vec<String>,
    /// Sitemap references skipped because a ceiling was reached
    pub truncated: usize,
}

impl SitemapWalk {
    pub fn processed_sitemap_count(&self) -> usize {
        self.visited.len()
    }
}

/// Walks sitemap trees with one set of fetch options
pub struct SitemapWalker<'a> {
    fetcher: &'a Fetcher,
    options: FetchOptions,
    limits: WalkerConfig,
}

impl<'a> SitemapWalker<'a> {
    pub fn new(fetcher: &'a Fetcher, options: FetchOptions, limits: WalkerConfig) -> Self {
        Self {
            fetcher,
            options,
            limits,
        }
    }

    /// Walks the tree rooted at `sitemap_url`
    ///
    /// Relative child references are resolved against `base_url`, or against
    /// the index document's own URL when `base_url` is blank. Fetch and parse
    /// failures are logged and the failing document contributes nothing.
    ///
    /// # Arguments
    ///
    /// * `sitemap_url` - Root sitemap or sitemap index
    /// * `base_url` - Site base URL used for relative references
    /// * `cancel` - Aborts the walk, including an in-flight fetch
    ///
    /// # Returns
    ///
    /// * `Ok(SitemapWalk)` - Entries, visited and failed URLs
    /// * `Err(WalkCancelled)` - The token was cancelled
    pub async fn walk(
        &self,
        sitemap_url: &str,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<SitemapWalk, WalkCancelled> {
        let mut walk = SitemapWalk::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, usize)> = vec![(sitemap_url.trim().to_string(), 0)];

        while let Some((url, depth)) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(WalkCancelled);
            }

            if seen.contains(&url) {
                tracing::debug!(url = %url, "Sitemap already visited, skipping");
                continue;
            }

            if seen.len() >= self.limits.max_sitemaps {
                tracing::warn!(
                    url = %url,
                    max_sitemaps = self.limits.max_sitemaps,
                    "Sitemap limit reached, skipping"
                );
                walk.truncated += 1;
                continue;
            }

            if depth > self.limits.max_depth {
                tracing::warn!(
                    url = %url,
                    depth,
                    max_depth = self.limits.max_depth,
                    "Sitemap nesting too deep, skipping"
                );
                walk.truncated += 1;
                continue;
            }

            seen.insert(url.clone());
            walk.visited.push(url.clone());

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WalkCancelled),
                result = self.fetcher.fetch(&url, &self.options) => result,
            };

            let body = match fetched {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Failed to fetch sitemap");
                    walk.failed.push(url);
                    continue;
                }
            };

            let kind = match classify(&body) {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Failed to parse sitemap");
                    walk.failed.push(url);
                    continue;
                }
            };

            match kind {
                SitemapKind::Index => {
                    let base = if base_url.trim().is_empty() {
                        url.as_str()
                    } else {
                        base_url
                    };

                    match parse_index(&body, base) {
                        Ok(children) => {
                            tracing::debug!(url = %url, children = children.len(), depth, "Parsed sitemap index");
                            // Reversed so the stack pops children in document order.
                            for child in children.into_iter().rev() {
                                stack.push((child, depth + 1));
                            }
                        }
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "Failed to parse sitemap index");
                            walk.failed.push(url);
                        }
                    }
                }
                SitemapKind::Leaf => match parse_leaf(&body) {
                    Ok(entries) => {
                        tracing::debug!(url = %url, entries = entries.len(), "Parsed sitemap");
                        walk.entries.extend(entries);
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "Failed to parse sitemap");
                        walk.failed.push(url);
                    }
                },
            }
        }

        Ok(walk)
    }
}
