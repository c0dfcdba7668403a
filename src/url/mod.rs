//! URL handling module for Level-Crawler
//!
//! URLs are opaque strings to the crawler: equality is exact string equality
//! and nothing is normalized. This module only derives the host used as the
//! admission-control key and matches URLs against exclusion substrings.

mod domain;
mod matcher;

// Re-export main types
pub use domain::extract_host;
pub use matcher::Exclusions;
