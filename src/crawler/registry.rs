//! Visited/error registry shared by the tasks of one crawl
//!
//! Claiming a URL is the single deduplication gate: only the caller whose
//! `claim` inserted the URL may schedule work for it.

use crate::crawler::CrawlResult;
use crate::UrlError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// What became of a claimed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// Claimed and not withdrawn; reported as visited
    Visited,

    /// Claim withdrawn after a failed download; never reported, never reclaimed
    Withdrawn,
}

/// Concurrent record of claimed and failed URLs
#[derive(Debug, Default)]
pub struct CrawlRegistry {
    claims: DashMap<String, Claim>,
    errors: DashMap<String, UrlError>,
}

impl CrawlRegistry {
    /// Creates an empty registry for one crawl
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims a URL
    ///
    /// # Returns
    ///
    /// * `true` - This call added the URL; the caller owns its download
    /// * `false` - The URL was claimed before (including withdrawn claims)
    pub fn claim(&self, url: &str) -> bool {
        match self.claims.entry(url.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Claim::Visited);
                true
            }
        }
    }

    /// Withdraws a claim after its download failed
    ///
    /// The URL drops out of the visited result but stays known, so a later
    /// `claim` for it still returns false.
    pub fn unclaim(&self, url: &str) {
        if let Some(mut claim) = self.claims.get_mut(url) {
            *claim = Claim::Withdrawn;
        }
    }

    /// Records the failure reason for a URL (last writer wins)
    pub fn record_error(&self, url: &str, error: UrlError) {
        self.errors.insert(url.to_string(), error);
    }

    /// Returns true if a failure was recorded for the URL
    pub fn has_error(&self, url: &str) -> bool {
        self.errors.contains_key(url)
    }

    #[cfg(test)]
    fn is_visited(&self, url: &str) -> bool {
        self.claims
            .get(url)
            .map(|claim| *claim == Claim::Visited)
            .unwrap_or(false)
    }

    /// Number of URLs currently counted as visited
    pub fn visited_count(&self) -> usize {
        self.claims
            .iter()
            .filter(|entry| *entry.value() == Claim::Visited)
            .count()
    }

    /// Copies the current state into a [`CrawlResult`]
    pub fn snapshot(&self) -> CrawlResult {
        let visited = self
            .claims
            .iter()
            .filter(|entry| *entry.value() == Claim::Visited)
            .map(|entry| entry.key().clone())
            .collect();

        let errors = self
            .errors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        CrawlResult { visited, errors }
    }
}
