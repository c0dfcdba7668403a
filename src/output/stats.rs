//! Statistics for a finished crawl

use crate::crawler::CrawlResult;
use crate::url::extract_host;
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// Number of URLs downloaded successfully
    pub visited: usize,

    /// Number of URLs that could not be downloaded
    pub fetch_errors: usize,

    /// Number of downloaded URLs whose links could not be extracted
    pub extract_errors: usize,

    /// Visited URLs per host
    pub visited_by_host: BTreeMap<String, usize>,
}

impl CrawlStatistics {
    /// Computes statistics from a crawl result
    pub fn from_result(result: &CrawlResult) -> Self {
        let mut visited_by_host = BTreeMap::new();
        for url in &result.visited {
            if let Ok(host) = extract_host(url) {
                *visited_by_host.entry(host).or_insert(0) += 1;
            }
        }

        Self {
            visited: result.visited.len(),
            fetch_errors: result.fetch_errors().count(),
            extract_errors: result.extract_errors().count(),
            visited_by_host,
        }
    }

    /// Share of attempted downloads that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        let attempted = self.visited + self.fetch_errors;
        if attempted == 0 {
            0.0
        } else {
            self.visited as f64 / attempted as f64 * 100.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Visited: {}", stats.visited);
    println!("  Download errors: {}", stats.fetch_errors);
    println!("  Extraction errors: {}", stats.extract_errors);
    println!();

    if !stats.visited_by_host.is_empty() {
        println!("Visited by Host:");
        let mut host_counts: Vec<_> = stats.visited_by_host.iter().collect();
        host_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (host, count) in host_counts {
            println!("  {}: {}", host, count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} downloads)",
        stats.success_rate(),
        stats.visited,
        stats.visited + stats.fetch_errors
    );
}
