//! URL diff engine
//!
//! Splits the entries found in one cycle into pages never recorded before and
//! pages already recorded for the site.

use crate::config::UrlIdentity;
use crate::crawler::SitemapEntry;
use crate::url::normalize_identity;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Outcome of comparing one cycle's entries with the recorded URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Entries not recorded before, in first-seen order
    pub new_pages: Vec<SitemapEntry>,
    /// Entries already recorded, carrying the stored form of the URL
    pub reseen: Vec<SitemapEntry>,
    /// Number of sitemap documents fetched to produce the entries
    pub processed_sitemap_count: usize,
}

impl DiffResult {
    /// Stored URLs of the reseen entries
    pub fn reseen_urls(&self) -> impl Iterator<Item = &str> {
        self.reseen.iter().map(|e| e.url.as_str())
    }

    pub fn new_count(&self) -> usize {
        self.new_pages.len()
    }

    pub fn reseen_count(&self) -> usize {
        self.reseen.len()
    }
}

/// Partitions `entries` into new and reseen pages
///
/// An entry is reseen when its URL matches a key of `existing` under the
/// chosen identity, and new otherwise. Repeated URLs within `entries` are
/// collapsed so the first occurrence wins. In `Normalized` mode a reseen entry
/// takes the URL as previously stored and a new entry keeps the URL exactly
/// as the sitemap listed it.
///
/// # Arguments
///
/// * `site_id` - Site the entries belong to (for logging)
/// * `entries` - Every entry found in this cycle's walk
/// * `existing` - Recorded URLs with their last-seen time
/// * `processed_sitemap_count` - Sitemap documents fetched by the walk
/// * `identity` - How URLs are compared
pub fn diff(
    site_id: i64,
    entries: Vec<SitemapEntry>,
    existing: &HashMap<String, DateTime<Utc>>,
    processed_sitemap_count: usize,
    identity: UrlIdentity,
) -> DiffResult {
    let stored_by_key: HashMap<String, &str> = match identity {
        UrlIdentity::Exact => HashMap::new(),
        UrlIdentity::Normalized => existing
            .keys()
            .map(|url| (identity_key(url, identity), url.as_str()))
            .collect(),
    };

    let mut seen_keys: HashSet<String> = HashSet::with_capacity(entries.len());
    let mut result = DiffResult {
        processed_sitemap_count,
        ..DiffResult::default()
    };
    let mut duplicates = 0usize;

    for entry in entries {
        let key = identity_key(&entry.url, identity);
        if !seen_keys.insert(key.clone()) {
            duplicates += 1;
            continue;
        }

        let stored = match identity {
            UrlIdentity::Exact => existing.contains_key(&entry.url).then(|| entry.url.clone()),
            UrlIdentity::Normalized => stored_by_key.get(&key).map(|url| url.to_string()),
        };

        match stored {
            Some(url) => result.reseen.push(SitemapEntry {
                url,
                lastmod: entry.lastmod,
            }),
            None => result.new_pages.push(entry),
        }
    }

    tracing::debug!(
        site_id,
        new = result.new_pages.len(),
        reseen = result.reseen.len(),
        duplicates,
        "Diff complete"
    );

    result
}

fn identity_key(url: &str, identity: UrlIdentity) -> String {
    match identity {
        UrlIdentity::Exact => url.to_string(),
        UrlIdentity::Normalized => normalize_identity(url).unwrap_or_else(|_| url.to_string()),
    }
}
