//! Markdown report generation
//!
//! This module generates a human-readable markdown report of a crawl,
//! including run information, statistics, visited URLs and errors.

use crate::output::stats::CrawlStatistics;
use crate::output::{CrawlReport, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report of a crawl to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl report as markdown
pub fn format_markdown_report(report: &CrawlReport) -> String {
    let stats = CrawlStatistics::from_result(&report.result);
    let mut md = String::new();

    md.push_str("# Level-Crawler Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", report.seed));
    md.push_str(&format!("- **Max Depth**: {}\n", report.max_depth));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n\n",
        report.duration_seconds()
    ));

    md.push_str("## Statistics\n\n");
    md.push_str(&format!("- **Visited**: {}\n", stats.visited));
    md.push_str(&format!("- **Download Errors**: {}\n", stats.fetch_errors));
    md.push_str(&format!("- **Extraction Errors**: {}\n", stats.extract_errors));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n\n", stats.success_rate()));

    if !stats.visited_by_host.is_empty() {
        md.push_str("## Hosts\n\n");
        md.push_str("| Host | Visited |\n");
        md.push_str("|------|---------|\n");
        for (host, count) in &stats.visited_by_host {
            md.push_str(&format!("| {} | {} |\n", host, count));
        }
        md.push('\n');
    }

    md.push_str("## Visited URLs\n\n");
    if report.result.visited.is_empty() {
        md.push_str("_None_\n\n");
    } else {
        for url in &report.result.visited {
            md.push_str(&format!("- {}\n", url));
        }
        md.push('\n');
    }

    if !report.result.errors.is_empty() {
        md.push_str("## Errors\n\n");
        md.push_str("| URL | Error |\n");
        md.push_str("|-----|-------|\n");
        for (url, error) in &report.result.errors {
            md.push_str(&format!("| {} | {} |\n", url, escape_cell(&error.to_string())));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
