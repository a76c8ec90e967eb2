//! URL handling for Sitemap-Watch
//!
//! Identity normalization for the diff engine and RFC 3986 reference
//! resolution for sitemap index children.

mod normalize;

pub use normalize::{normalize_identity, resolve_reference};
