//! Crawler module for level-by-level concurrent crawling
//!
//! This module contains the core crawling logic, including:
//! - Bounded worker pools for downloads and link extraction
//! - Per-host admission control
//! - A reusable level barrier for dynamically spawned tasks
//! - The shared visited/error registry
//! - Overall crawl coordination
//! - The HTTP fetcher and HTML link extraction used by the binary

mod barrier;
mod coordinator;
mod fetcher;
mod host_limiter;
mod parser;
mod pool;
mod registry;

pub use barrier::{Arrival, LevelBarrier};
pub use coordinator::WebCrawler;
pub use fetcher::{build_http_client, Document, Fetcher, HtmlDocument, HttpFetcher};
pub use host_limiter::{HostLimiter, HostPermit};
pub use parser::extract_links;
pub use pool::{ShutdownOutcome, WorkerPool};
pub use registry::CrawlRegistry;

use crate::UrlError;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of a crawl
///
/// `visited` holds every URL that was downloaded successfully, including
/// those whose link extraction failed. `errors` maps each failed URL to the
/// reason; a URL with a [`UrlError::Fetch`] entry is never in `visited`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResult {
    pub visited: BTreeSet<String>,
    pub errors: BTreeMap<String, UrlError>,
}

impl CrawlResult {
    /// Returns true if nothing was visited and nothing failed
    pub fn is_empty(&self) -> bool {
        self.visited.is_empty() && self.errors.is_empty()
    }

    /// URLs that could not be downloaded
    pub fn fetch_errors(&self) -> impl Iterator<Item = (&String, &UrlError)> {
        self.errors.iter().filter(|(_, e)| e.is_fetch())
    }

    /// URLs that downloaded but whose links could not be extracted
    pub fn extract_errors(&self) -> impl Iterator<Item = (&String, &UrlError)> {
        self.errors.iter().filter(|(_, e)| e.is_extract())
    }
}
