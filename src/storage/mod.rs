//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Property, building and unit persistence
//! - Crawl job outcomes and per-building failure records

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{CrawlSink, StorageError, StorageResult};

use crate::state::CrawlPhase;
use crate::PresaleError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A sink shared between the orchestrator, the job tracker and the CLI
pub type SharedSink = Arc<Mutex<dyn CrawlSink + Send>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(PresaleError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, PresaleError> {
    SqliteStorage::new(path)
}

/// Top-level registry record of a development
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub address: String,
    pub developer: String,
    pub presale_license: Option<String>,
    pub district: Option<String>,
    /// Remaining registry rows as (label, value), in page order
    pub metadata: Vec<(String, String)>,
}

/// A building of a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub name: String,
    /// None when the registry cell is not a number
    pub floors: Option<u32>,
}

/// A unit (room) of a building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    /// Built area in square metres
    pub area: Option<f64>,
    pub status: String,
}

/// Represents a crawl job in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub property_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub phase: CrawlPhase,
    pub error_message: Option<String>,
}

/// Represents one failed unit fetch
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub job_id: i64,
    pub building_id: String,
    pub pass: u32,
    pub error_message: String,
    pub failed_at: String,
}

/// Locks a shared sink, mapping poisoning to a storage error
pub fn lock_sink(
    sink: &SharedSink,
) -> Result<std::sync::MutexGuard<'_, dyn CrawlSink + Send + 'static>, StorageError> {
    sink.lock().map_err(|_| StorageError::LockPoisoned)
}
