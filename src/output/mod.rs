//! Output module for exports and crawl summaries
//!
//! This module handles:
//! - Writing the collected dataset as JSON export artifacts
//! - Listing existing exports
//! - Summarising checkpoint statistics

mod export;
pub mod stats;

pub use export::{ExportData, ExportFileInfo, ExportWriter};
pub use stats::{print_statistics, CrawlStatistics, QueueProgress};
