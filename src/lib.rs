//! Level-Crawler: a depth-bounded, concurrency-capped web crawler
//!
//! This crate crawls a web graph breadth-first from a seed URL, one depth level
//! at a time, while holding three independent concurrency caps: total downloads
//! in flight, total link extractions in flight, and downloads in flight per host.

pub mod config;
pub mod crawler;
pub mod output;
pub mod url;

use thiserror::Error;

/// Main error type for Level-Crawler operations
///
/// Individual URL failures never surface here; they are collected in
/// [`CrawlResult::errors`]. This type covers the failures that prevent a
/// crawler from being built.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Failure to download a URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Download cancelled for {url}")]
    Cancelled { url: String },

    #[error("Download failed for {url}: {message}")]
    Other { url: String, message: String },
}

/// Failure to extract links from a downloaded document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Invalid base URL {0}")]
    InvalidBase(String),

    #[error("HTML parse error: {0}")]
    Parse(String),

    #[error("Extraction task failed: {0}")]
    Aborted(String),
}

/// The reason a single URL ended up in the error mapping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("link extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

impl UrlError {
    /// Returns true if the URL could not be downloaded at all
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns true if the URL downloaded but its links could not be read
    pub fn is_extract(&self) -> bool {
        matches!(self, Self::Extract(_))
    }
}

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("{0} pool is shut down")]
    Closed(&'static str),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlParseError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for Level-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlResult, Document, Fetcher, WebCrawler};
pub use url::{extract_host, Exclusions};
