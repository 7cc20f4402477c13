//! Output module for reading crawl results back out of storage
//!
//! This module handles:
//! - Loading a crawled property's stored hierarchy
//! - Rendering it as a markdown report
//! - Recording crawl statistics across all jobs

mod markdown;
mod snapshot;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use snapshot::{load_snapshot, BuildingSnapshot, PropertySnapshot};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
