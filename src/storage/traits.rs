//! Storage traits and error types
//!
//! This module defines the sink interface the crawler writes through and the
//! associated error types.

use crate::state::CrawlPhase;
use crate::storage::{Building, FailureRecord, JobRecord, Property, Unit};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The orchestrator only ever writes through the first group of methods. The
/// read methods back the `stats` command and tests.
pub trait CrawlSink {
    // ===== Job Tracking =====

    /// Records the start of a crawl job
    ///
    /// # Returns
    ///
    /// The ID of the newly created job row
    fn begin_job(&mut self, property_id: &str, config_hash: &str) -> StorageResult<i64>;

    /// Records the terminal phase of a crawl job
    fn finish_job(
        &mut self,
        job_id: i64,
        phase: CrawlPhase,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Records one failed unit fetch for a building
    ///
    /// `pass` is 0 for the first pass and N for the N-th retry pass.
    fn record_building_failure(
        &mut self,
        job_id: i64,
        building_id: &str,
        pass: u32,
        message: &str,
    ) -> StorageResult<()>;

    // ===== Entity Writes =====

    /// Writes the property record, replacing any previous crawl's copy
    fn save_property(&mut self, property: &Property) -> StorageResult<()>;

    /// Writes the building list, keeping the site-returned order
    fn save_buildings(&mut self, property_id: &str, buildings: &[Building]) -> StorageResult<()>;

    /// Writes the units of one building
    fn save_units(
        &mut self,
        property_id: &str,
        building_id: &str,
        units: &[Unit],
    ) -> StorageResult<()>;

    // ===== Reads =====

    fn get_job(&self, job_id: i64) -> StorageResult<JobRecord>;

    /// Most recently started job for a property, if any
    fn latest_job(&self, property_id: &str) -> StorageResult<Option<JobRecord>>;

    fn get_property(&self, property_id: &str) -> StorageResult<Option<Property>>;

    /// Gets buildings in the order they were returned by the site
    fn get_buildings(&self, property_id: &str) -> StorageResult<Vec<Building>>;

    fn get_units(&self, property_id: &str, building_id: &str) -> StorageResult<Vec<Unit>>;

    fn get_building_failures(&self, job_id: i64) -> StorageResult<Vec<FailureRecord>>;

    // ===== Statistics =====

    fn count_properties(&self) -> StorageResult<u64>;

    fn count_buildings(&self) -> StorageResult<u64>;

    fn count_units(&self) -> StorageResult<u64>;

    /// Counts jobs whose recorded phase is `phase`
    fn count_jobs_by_phase(&self, phase: CrawlPhase) -> StorageResult<u64>;
}
