//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Presale-Crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl jobs
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    property_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    phase TEXT NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_property ON crawl_jobs(property_id);
CREATE INDEX IF NOT EXISTS idx_crawl_jobs_phase ON crawl_jobs(phase);

-- Property registry records
CREATE TABLE IF NOT EXISTS properties (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    developer TEXT NOT NULL,
    presale_license TEXT,
    district TEXT,
    metadata TEXT NOT NULL,
    crawled_at TEXT NOT NULL
);

-- Buildings, in site-returned order
CREATE TABLE IF NOT EXISTS buildings (
    property_id TEXT NOT NULL REFERENCES properties(id),
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    floors INTEGER,
    position INTEGER NOT NULL,
    crawled_at TEXT NOT NULL,
    PRIMARY KEY (property_id, id)
);

-- Units of each building; room numbers repeat across entrances, so rows
-- are keyed by their place in the building's list
CREATE TABLE IF NOT EXISTS units (
    property_id TEXT NOT NULL,
    building_id TEXT NOT NULL,
    id TEXT NOT NULL,
    area REAL,
    status TEXT NOT NULL,
    position INTEGER NOT NULL,
    crawled_at TEXT NOT NULL,
    PRIMARY KEY (property_id, building_id, position),
    FOREIGN KEY (property_id, building_id) REFERENCES buildings(property_id, id)
);

-- Failed unit fetches per job and pass
CREATE TABLE IF NOT EXISTS building_failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES crawl_jobs(id),
    building_id TEXT NOT NULL,
    pass INTEGER NOT NULL,
    error_message TEXT NOT NULL,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_building_failures_job ON building_failures(job_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
