//! Output module for reporting crawl results
//!
//! This module handles:
//! - Computing summary statistics for a finished crawl
//! - Printing a console summary
//! - Writing a markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{print_statistics, CrawlStatistics};

use crate::crawler::CrawlResult;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A finished crawl together with the parameters that produced it
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub seed: String,
    pub max_depth: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: CrawlResult,
}

impl CrawlReport {
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
