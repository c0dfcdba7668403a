//! Crawler coordinator - level-synchronized breadth-first traversal
//!
//! The coordinator owns the long-lived resources (download pool, extraction
//! pool, per-host limiter) and drives each crawl level by level:
//!
//! 1. Register every frontier URL with the level barrier and submit its
//!    download task
//! 2. Download tasks take a host slot, fetch, and on success hand the document
//!    to the extraction pool (except on the last level)
//! 3. Extraction tasks claim newly discovered links into the next frontier
//! 4. Once the barrier reports the level finished, the next frontier replaces
//!    the current one

use crate::config::{Config, CrawlerConfig};
use crate::crawler::barrier::{Arrival, LevelBarrier};
use crate::crawler::host_limiter::HostLimiter;
use crate::crawler::pool::{ShutdownOutcome, WorkerPool};
use crate::crawler::registry::CrawlRegistry;
use crate::crawler::{CrawlResult, Document, Fetcher, HttpFetcher};
use crate::url::{extract_host, Exclusions};
use crate::{ExtractError, FetchError, UrlError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Resources shared by every task the crawler spawns
struct Shared {
    fetcher: Arc<dyn Fetcher>,
    hosts: HostLimiter,
    downloads: WorkerPool,
    extractors: WorkerPool,
}

/// State of a single crawl invocation
struct CrawlState {
    registry: CrawlRegistry,
    excludes: Exclusions,
    barrier: Arc<LevelBarrier>,

    /// URLs discovered during the current level, consumed by the next one
    next_level: Mutex<Vec<String>>,
}

impl CrawlState {
    fn take_next_level(&self) -> Vec<String> {
        std::mem::take(
            &mut *self
                .next_level
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn push_next_level(&self, url: String) {
        self.next_level
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url);
    }
}

/// Which half of a URL's work a [`Ticket`] covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Download,
    Extraction,
}

/// One URL's registered, not yet settled piece of work
///
/// A ticket travels inside its task. If the task is dropped before it
/// settles the ticket (rejected by a closed pool, or aborted when a shutdown
/// runs out of time), the drop records the URL as cancelled. The barrier
/// registration is a field, so it arrives only after the error is recorded.
struct Ticket {
    state: Arc<CrawlState>,
    url: String,
    stage: Stage,
    settled: bool,
    arrival: Arrival,
}

impl Ticket {
    fn new(state: Arc<CrawlState>, url: String, stage: Stage, arrival: Arrival) -> Self {
        Self {
            state,
            url,
            stage,
            settled: false,
            arrival,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        tracing::debug!("{:?} of {} cancelled", self.stage, self.url);
        let registry = &self.state.registry;
        match self.stage {
            Stage::Download => {
                let error = FetchError::Cancelled {
                    url: self.url.clone(),
                };
                registry.record_error(&self.url, UrlError::Fetch(error));
                registry.unclaim(&self.url);
            }
            Stage::Extraction => {
                let error = ExtractError::Aborted("extraction cancelled".to_string());
                registry.record_error(&self.url, UrlError::Extract(error));
            }
        }
    }
}

/// A concurrency-capped, depth-bounded web crawler
///
/// Worker pools and the host limiter are created once and reused by every
/// call to [`crawl`](Self::crawl). Call [`close`](Self::close) to drain them;
/// dropping the crawler without closing aborts any tasks still queued.
pub struct WebCrawler {
    shared: Arc<Shared>,
    shutdown_grace: Duration,
}

impl WebCrawler {
    /// Creates a crawler with the caps from `config`
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Downloads pages for the crawler
    /// * `config` - Concurrency caps and shutdown grace period
    ///
    /// # Returns
    ///
    /// * `Ok(WebCrawler)` - Ready to crawl
    /// * `Err(CrawlerError)` - A concurrency cap is zero
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &CrawlerConfig) -> crate::Result<Self> {
        crate::config::validate_crawler_config(config)?;

        if config.per_host > config.downloads {
            tracing::warn!(
                "per-host cap {} exceeds download cap {}; the download cap applies",
                config.per_host,
                config.downloads
            );
        }

        tracing::debug!(
            "Starting crawler: {} download workers, {} extractors, {} per host",
            config.downloads,
            config.extractors,
            config.per_host
        );

        Ok(Self {
            shared: Arc::new(Shared {
                fetcher,
                hosts: HostLimiter::new(config.per_host),
                downloads: WorkerPool::new("download", config.downloads),
                extractors: WorkerPool::new("extraction", config.extractors),
            }),
            shutdown_grace: config.shutdown_grace(),
        })
    }

    /// Creates a crawler that downloads over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The full crawler configuration
    ///
    /// # Returns
    ///
    /// * `Ok(WebCrawler)` - Ready to crawl
    /// * `Err(CrawlerError)` - Invalid caps or the HTTP client could not be built
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let fetcher = HttpFetcher::from_config(&config.user_agent, &config.fetch)?;
        Self::new(Arc::new(fetcher), &config.crawler)
    }

    /// Crawls from `seed` for `max_depth` levels
    ///
    /// Level 0 downloads the seed, level 1 downloads the links found on the
    /// seed, and so on; links found on the last level are not followed.
    /// Individual URL failures are reported in [`CrawlResult::errors`] and
    /// never abort the crawl.
    ///
    /// Returns an empty result without touching the pools when `max_depth`
    /// is 0, the seed is empty, or the seed matches an exclusion.
    pub async fn crawl(&self, seed: &str, max_depth: usize, excludes: &Exclusions) -> CrawlResult {
        if max_depth == 0 || seed.is_empty() || excludes.matches(seed) {
            tracing::debug!("Nothing to crawl for {:?} at depth {}", seed, max_depth);
            return CrawlResult::default();
        }

        let state = Arc::new(CrawlState {
            registry: CrawlRegistry::new(),
            excludes: excludes.clone(),
            barrier: LevelBarrier::held_open(),
            next_level: Mutex::new(Vec::new()),
        });

        // Seed the first level
        state.registry.claim(seed);
        let mut frontier = vec![seed.to_string()];
        let start_time = std::time::Instant::now();

        for depth in 0..max_depth {
            if frontier.is_empty() {
                tracing::debug!("Frontier empty at depth {}, stopping early", depth);
                break;
            }

            let last_level = depth + 1 == max_depth;
            tracing::debug!(
                "Level {}: {} URLs, {} visited so far{}",
                depth,
                frontier.len(),
                state.registry.visited_count(),
                if last_level { " (last level)" } else { "" }
            );

            // Submit the level; a rejected task cancels its URL when dropped
            for url in frontier {
                let arrival = state.barrier.register();
                let ticket = Ticket::new(
                    Arc::clone(&state),
                    url.clone(),
                    Stage::Download,
                    arrival,
                );
                let task = download(Arc::clone(&self.shared), ticket, last_level);
                if let Err(e) = self.shared.downloads.submit(task) {
                    tracing::warn!("Skipping download of {}: {}", url, e);
                }
            }

            // Wait for every download and extraction of this level
            tracing::trace!(
                "Level {} submitted, {} parties outstanding",
                depth,
                state.barrier.outstanding()
            );
            let phase = state.barrier.await_advance().await;
            frontier = state.take_next_level();
            tracing::trace!("Phase {} complete, {} URLs queued", phase, frontier.len());
        }

        state.barrier.release_hold();

        // Forget hosts this crawl no longer uses
        let pruned = self.shared.hosts.prune_idle();
        tracing::debug!(
            "Pruned {} idle hosts, {} still tracked",
            pruned,
            self.shared.hosts.tracked_hosts()
        );

        let result = state.registry.snapshot();
        tracing::info!(
            "Crawl of {} finished in {:?}: {} visited, {} errors",
            seed,
            start_time.elapsed(),
            result.visited.len(),
            result.errors.len()
        );
        result
    }

    /// Drains both pools, cancelling whatever is left after the grace period
    ///
    /// The download pool is drained first while the extraction pool still
    /// accepts hand-offs from finishing downloads; the extraction pool is then
    /// drained against the same deadline. Safe to call more than once.
    pub async fn close(&self) {
        let deadline = Instant::now() + self.shutdown_grace;

        for pool in [&self.shared.downloads, &self.shared.extractors] {
            if pool.is_accepting() {
                tracing::debug!(
                    "Closing {} pool with {} tasks running",
                    pool.name(),
                    pool.running()
                );
            }
        }

        // Downloads first: they may still hand documents to the extraction pool
        let downloads = self.shared.downloads.shutdown(deadline).await;
        let extractors = self.shared.extractors.shutdown(deadline).await;

        match (downloads, extractors) {
            (ShutdownOutcome::Drained, ShutdownOutcome::Drained) => {
                tracing::debug!("Crawler closed");
            }
            (downloads, extractors) => {
                tracing::warn!(
                    "Crawler closed with cancelled work (downloads: {:?}, extraction: {:?})",
                    downloads,
                    extractors
                );
            }
        }
    }
}

/// Downloads one URL and, unless on the last level, queues its extraction
async fn download(shared: Arc<Shared>, mut ticket: Ticket, last_level: bool) {
    let url = ticket.url.clone();

    // Hold a host slot for the duration of the fetch only
    let fetched = match extract_host(&url) {
        Ok(host) => match shared.hosts.acquire(&host).await {
            Some(permit) => {
                tracing::trace!(
                    "Fetching {} ({} in flight for {})",
                    url,
                    shared.hosts.in_flight(permit.host()),
                    permit.host()
                );
                shared.fetcher.fetch(&url).await
            }
            None => Err(FetchError::Cancelled { url: url.clone() }),
        },
        Err(e) => Err(FetchError::InvalidUrl(e.to_string())),
    };

    let state = Arc::clone(&ticket.state);
    match fetched {
        Ok(document) => {
            tracing::debug!("Downloaded {}", url);
            ticket.settle();

            if !last_level {
                // Registered before this task's own arrival is dropped
                let child = ticket.arrival.barrier().register();
                let extraction = Ticket::new(state, url.clone(), Stage::Extraction, child);
                if let Err(e) = shared.extractors.submit(extract(extraction, document)) {
                    tracing::warn!("Skipping extraction of {}: {}", url, e);
                }
            }
        }
        Err(e) => {
            tracing::debug!("Failed to download {}: {}", url, e);
            // Error first, so the URL is never claimable without an error
            state.registry.record_error(&url, UrlError::Fetch(e));
            state.registry.unclaim(&url);
            ticket.settle();
        }
    }
}

/// Extracts links from a downloaded document into the next frontier
async fn extract(mut ticket: Ticket, document: Box<dyn Document>) {
    let links = tokio::task::spawn_blocking(move || document.extract_links())
        .await
        .unwrap_or_else(|e| Err(ExtractError::Aborted(e.to_string())));
    ticket.settle();

    let state = &ticket.state;
    let links = match links {
        Ok(links) => links,
        Err(e) => {
            tracing::debug!("Failed to extract links from {}: {}", ticket.url, e);
            state.registry.record_error(&ticket.url, UrlError::Extract(e));
            return;
        }
    };

    // Filter, then claim into the next level
    let mut discovered = 0;
    for link in links {
        if state.excludes.matches(&link) {
            tracing::trace!("Excluded {}", link);
            continue;
        }

        if let Err(e) = extract_host(&link) {
            tracing::trace!("Dropping malformed link {}: {}", link, e);
            continue;
        }

        if state.registry.has_error(&link) {
            continue;
        }

        if state.registry.claim(&link) {
            state.push_next_level(link);
            discovered += 1;
        }
    }

    tracing::trace!("{} new links from {}", discovered, ticket.url);
}
