use crate::UrlError;
use url::Url;

/// Returns the identity key used to match a sitemap URL against stored URLs
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the scheme and host (done by the parser)
/// 3. Drop the port when it is the scheme's default
/// 4. Remove the fragment
/// 5. Remove a trailing slash from the path (except for root /)
///
/// The key only decides whether two URLs are the same page. The URL that gets
/// stored is never rewritten.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(String)` - The identity key
/// * `Err(UrlError)` - Failed to parse the URL
///
/// # Examples
///
/// ```
/// use sitemap_watch::url::normalize_identity;
///
/// let key = normalize_identity("HTTPS://Example.COM:443/page/#top").unwrap();
/// assert_eq!(key, "https://example.com/page");
/// ```
pub fn normalize_identity(url_str: &str) -> Result<String, UrlError> {
    let mut url = parse_http_url(url_str)?;

    // Url::parse already drops a port equal to the scheme default.
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
        if url.path().is_empty() {
            url.set_path("/");
        }
    }

    Ok(url.to_string())
}

/// Resolves a possibly relative reference against a base URL
///
/// Absolute HTTP(S) references are returned unchanged (apart from the
/// parser's canonical form). Anything else is joined onto `base` following
/// RFC 3986 reference resolution.
///
/// # Examples
///
/// ```
/// use sitemap_watch::url::resolve_reference;
///
/// let child = resolve_reference("https://example.com/sitemap.xml", "/posts.xml").unwrap();
/// assert_eq!(child, "https://example.com/posts.xml");
/// ```
pub fn resolve_reference(base: &str, reference: &str) -> Result<String, UrlError> {
    let reference = reference.trim();
    let lower = reference.to_ascii_lowercase();

    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(reference.to_string());
    }

    let base = parse_http_url(base)?;
    let joined = base
        .join(reference)
        .map_err(|e| UrlError::Parse(format!("{} (relative to {}): {}", reference, base, e)))?;

    Ok(joined.to_string())
}

fn parse_http_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}
