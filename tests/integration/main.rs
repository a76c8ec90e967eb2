//! Integration tests for sitemap monitoring
//!
//! These tests use wiremock to serve sitemaps and webhooks and run full
//! monitoring cycles against in-memory storage.

mod common;
mod cycle_tests;
mod failure_tests;
