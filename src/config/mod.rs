//! Configuration module for Level-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a missing file or an empty one is a valid
//! configuration; command-line arguments are layered on top by the binary.
//!
//! # Example
//!
//! ```no_run
//! use level_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawler will use {} download workers", config.crawler.downloads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, ExcludeConfig, FetchConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate, validate_crawler_config};
