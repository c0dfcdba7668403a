//! Level-Crawler main entry point
//!
//! This is the command-line interface for the Level-Crawler web crawler.

use clap::Parser;
use level_crawler::config::{load_config_with_hash, validate, Config};
use level_crawler::crawler::WebCrawler;
use level_crawler::output::{
    generate_markdown_report, print_statistics, CrawlReport, CrawlStatistics,
};
use level_crawler::url::Exclusions;
use level_crawler::UrlError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Level-Crawler: a depth-bounded, concurrency-capped web crawler
///
/// Crawls breadth-first from URL for DEPTH levels with at most DOWNLOADS
/// downloads, EXTRACTORS link extractions and PER_HOST downloads per host
/// in flight at any time.
#[derive(Parser, Debug)]
#[command(name = "level-crawler")]
#[command(version)]
#[command(about = "A depth-bounded, concurrency-capped web crawler", long_about = None)]
struct Cli {
    /// URL to start crawling from
    #[arg(value_name = "URL")]
    url: String,

    /// Number of levels to crawl
    #[arg(value_name = "DEPTH")]
    depth: Option<usize>,

    /// Maximum concurrent downloads
    #[arg(value_name = "DOWNLOADS")]
    downloads: Option<usize>,

    /// Maximum concurrent link extractions
    #[arg(value_name = "EXTRACTORS")]
    extractors: Option<usize>,

    /// Maximum concurrent downloads per host
    #[arg(value_name = "PER_HOST")]
    per_host: Option<usize>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip URLs containing this substring (repeatable)
    #[arg(short, long, value_name = "SUBSTRING")]
    exclude: Vec<String>,

    /// Write a markdown report of the crawl to this path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load_effective_config(&cli)?;
    let excludes = Exclusions::new(config.exclude.substrings.iter().cloned());

    let crawler = WebCrawler::from_config(&config)?;

    tracing::info!(
        "Crawling {} to depth {} ({} downloads, {} extractors, {} per host)",
        cli.url,
        config.crawler.max_depth,
        config.crawler.downloads,
        config.crawler.extractors,
        config.crawler.per_host
    );

    let started_at = chrono::Utc::now();
    let result = tokio::select! {
        result = crawler.crawl(&cli.url, config.crawler.max_depth, &excludes) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, shutting down");
            None
        }
    };

    crawler.close().await;

    let Some(result) = result else {
        return Ok(ExitCode::from(130));
    };

    let report = CrawlReport {
        seed: cli.url.clone(),
        max_depth: config.crawler.max_depth,
        started_at,
        finished_at: chrono::Utc::now(),
        result,
    };

    if !cli.quiet {
        print_statistics(&CrawlStatistics::from_result(&report.result));
    }

    if let Some(path) = &cli.report {
        generate_markdown_report(&report, path)?;
        tracing::info!("Report written to {}", path.display());
    }

    if let Some(UrlError::Fetch(e)) = report.result.errors.get(&cli.url) {
        eprintln!("Error while downloading: {}", e);
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Builds the configuration from the optional file and command-line overrides
fn load_effective_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(depth) = cli.depth {
        config.crawler.max_depth = depth;
    }
    if let Some(downloads) = cli.downloads {
        config.crawler.downloads = downloads;
    }
    if let Some(extractors) = cli.extractors {
        config.crawler.extractors = extractors;
    }
    if let Some(per_host) = cli.per_host {
        config.crawler.per_host = per_host;
    }
    config.exclude.substrings.extend(cli.exclude.iter().cloned());

    validate(&config)?;
    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("level_crawler=info,warn"),
            1 => EnvFilter::new("level_crawler=debug,info"),
            2 => EnvFilter::new("level_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}
