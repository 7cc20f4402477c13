//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::CrawlPhase;
use crate::storage::{CrawlSink, StorageResult};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Number of distinct properties stored
    pub total_properties: u64,

    /// Number of buildings across all properties
    pub total_buildings: u64,

    /// Number of units across all buildings
    pub total_units: u64,

    /// Count of crawl jobs by recorded phase
    pub jobs_by_phase: HashMap<CrawlPhase, u64>,
}

impl CrawlStatistics {
    pub fn total_jobs(&self) -> u64 {
        self.jobs_by_phase.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn CrawlSink) -> StorageResult<CrawlStatistics> {
    let mut jobs_by_phase = HashMap::new();

    for phase in CrawlPhase::all_phases() {
        let count = storage.count_jobs_by_phase(phase)?;
        if count > 0 {
            jobs_by_phase.insert(phase, count);
        }
    }

    Ok(CrawlStatistics {
        total_properties: storage.count_properties()?,
        total_buildings: storage.count_buildings()?,
        total_units: storage.count_units()?,
        jobs_by_phase,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Properties: {}", stats.total_properties);
    println!("  Buildings: {}", stats.total_buildings);
    println!("  Units: {}", stats.total_units);
    println!();

    let total_jobs = stats.total_jobs();
    println!("Jobs by Phase ({} total):", total_jobs);
    for phase in CrawlPhase::all_phases() {
        if let Some(count) = stats.jobs_by_phase.get(&phase) {
            let percentage = (*count as f64 / total_jobs as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", phase, count, percentage);
        }
    }
    println!();

    let done = stats
        .jobs_by_phase
        .get(&CrawlPhase::Done)
        .copied()
        .unwrap_or(0);
    let success_rate = if total_jobs > 0 {
        (done as f64 / total_jobs as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} jobs done)",
        success_rate, done, total_jobs
    );
}
