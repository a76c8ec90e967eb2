//! Sitemap XML parser
//!
//! This module handles parsing sitemap documents to extract:
//! - The document kind (sitemap index or leaf `urlset`)
//! - Child sitemap references from an index
//! - Page entries (`loc` and optional `lastmod`) from a leaf
//!
//! Element matching is namespace-aware. Sitemap elements are recognized when
//! they are in the root element's namespace, the standard sitemap namespace,
//! or no namespace at all. Extension elements such as `image:loc` are ignored.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

/// The standard sitemap protocol namespace
pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Errors from parsing a sitemap document
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document has no root element")]
    NoRootElement,
}

/// A page listed in a leaf sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub url: String,
    pub lastmod: Option<DateTime<FixedOffset>>,
}

impl SitemapEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            lastmod: None,
        }
    }
}

/// What a sitemap document contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// A `sitemapindex` listing child sitemaps
    Index,
    /// A `urlset` (or anything else) listing pages
    Leaf,
}

/// Classifies a document by its root element name
///
/// The root is an index when its local name ends with `sitemapindex`;
/// everything else is treated as a leaf.
pub fn classify(bytes: &[u8]) -> Result<SitemapKind, ParseError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(reader.buffer_position() as u64, e))?;

        match event {
            Event::Start(e) | Event::Empty(e) => {
                let is_index = e.local_name().as_ref().ends_with(b"sitemapindex");
                return Ok(if is_index {
                    SitemapKind::Index
                } else {
                    SitemapKind::Leaf
                });
            }
            Event::Eof => return Err(ParseError::NoRootElement),
            _ => {}
        }
        buf.clear();
    }
}

/// Extracts child sitemap URLs from a sitemap index
///
/// Relative `loc` values are resolved against `base_url`. References that
/// cannot be resolved are logged and skipped.
///
/// # Arguments
///
/// * `bytes` - The index document
/// * `base_url` - URL the relative references are resolved against
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Child URLs in document order
/// * `Err(ParseError)` - The document is not well-formed XML
pub fn parse_index(bytes: &[u8], base_url: &str) -> Result<Vec<String>, ParseError> {
    let records = collect_records(bytes, b"sitemap")?;

    let mut children = Vec::with_capacity(records.len());
    for record in records {
        match crate::url::resolve_reference(base_url, &record.loc) {
            Ok(child) => children.push(child),
            Err(e) => {
                tracing::warn!(base_url, loc = %record.loc, error = %e, "Skipping unresolvable sitemap reference");
            }
        }
    }

    Ok(children)
}

/// Extracts page entries from a leaf sitemap
///
/// Entries without a `loc` are skipped. An unparseable `lastmod` leaves the
/// entry in place with no modification time.
pub fn parse_leaf(bytes: &[u8]) -> Result<Vec<SitemapEntry>, ParseError> {
    let records = collect_records(bytes, b"url")?;

    Ok(records
        .into_iter()
        .map(|record| SitemapEntry {
            lastmod: record.lastmod.as_deref().and_then(parse_lastmod),
            url: record.loc,
        })
        .collect())
}

/// Parses a W3C datetime value
///
/// Accepts full RFC 3339 timestamps, minute precision timestamps, timestamps
/// without an offset (taken as UTC) and plain dates (midnight UTC). A `Z`
/// suffix means `+00:00`.
pub fn parse_lastmod(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    let with_offset = match value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        Some(stripped) => format!("{}+00:00", stripped),
        None => value.to_string(),
    };

    for format in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, format) {
            return Some(dt);
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive).into());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).into())
}

/// One `url` or `sitemap` element's raw fields
#[derive(Debug, Default)]
struct Record {
    loc: String,
    lastmod: Option<String>,
}

/// Owned copy of an element's resolved namespace
enum ElementNs {
    Unbound,
    Bound(Vec<u8>),
    Unknown,
}

impl From<ResolveResult<'_>> for ElementNs {
    fn from(ns: ResolveResult<'_>) -> Self {
        match ns {
            ResolveResult::Unbound => Self::Unbound,
            ResolveResult::Bound(Namespace(uri)) => Self::Bound(uri.to_vec()),
            ResolveResult::Unknown(_) => Self::Unknown,
        }
    }
}

impl ElementNs {
    fn is_sitemap(&self, root_ns: Option<&[u8]>) -> bool {
        match self {
            Self::Unbound => true,
            Self::Bound(uri) => {
                uri.as_slice() == SITEMAP_NS.as_bytes() || root_ns == Some(uri.as_slice())
            }
            Self::Unknown => false,
        }
    }
}

/// Walks the document and gathers the `loc`/`lastmod` children of every
/// `container` element in a sitemap namespace
fn collect_records(bytes: &[u8], container: &[u8]) -> Result<Vec<Record>, ParseError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut root_ns: Option<Vec<u8>> = None;
    let mut seen_root = false;
    // Local names of open elements; None for elements outside the sitemap
    // namespaces.
    let mut stack: Vec<Option<Vec<u8>>> = Vec::new();
    let mut current: Option<Record> = None;
    let mut records = Vec::new();

    loop {
        let resolved = reader
            .read_resolved_event_into(&mut buf)
            .map(|(ns, event)| (ElementNs::from(ns), event));
        let (ns, event) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return Err(malformed(reader.buffer_position() as u64, e)),
        };

        match event {
            Event::Start(e) => {
                if !seen_root {
                    seen_root = true;
                    if let ElementNs::Bound(uri) = &ns {
                        root_ns = Some(uri.clone());
                    }
                }

                let local = e.local_name().as_ref().to_vec();
                let accepted = ns.is_sitemap(root_ns.as_deref());
                if accepted && local == container {
                    current = Some(Record::default());
                }
                stack.push(accepted.then_some(local));
            }
            Event::Empty(_) => {
                seen_root = true;
            }
            Event::End(_) => {
                let closed = stack.pop().flatten();
                if closed.as_deref() == Some(container) {
                    if let Some(record) = current.take() {
                        let loc = record.loc.trim();
                        if !loc.is_empty() {
                            records.push(Record {
                                loc: loc.to_string(),
                                lastmod: record.lastmod,
                            });
                        }
                    }
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| malformed(reader.buffer_position() as u64, err))?;
                append_text(&stack, container, current.as_mut(), &text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                append_text(&stack, container, current.as_mut(), &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ParseError::NoRootElement);
    }

    Ok(records)
}

fn parent_is(stack: &[Option<Vec<u8>>], container: &[u8]) -> bool {
    matches!(stack.last(), Some(Some(name)) if name.as_slice() == container)
}

fn append_text(
    stack: &[Option<Vec<u8>>],
    container: &[u8],
    current: Option<&mut Record>,
    text: &str,
) {
    let Some(record) = current else {
        return;
    };
    let Some((Some(field), parents)) = stack.split_last() else {
        return;
    };
    if !parent_is(parents, container) {
        return;
    }

    match field.as_slice() {
        b"loc" => record.loc.push_str(text),
        b"lastmod" => record
            .lastmod
            .get_or_insert_with(String::new)
            .push_str(text),
        _ => {}
    }
}

fn malformed(position: u64, err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed {
        position,
        message: err.to_string(),
    }
}
