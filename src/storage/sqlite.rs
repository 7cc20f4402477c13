//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CrawlSink trait.

use crate::state::CrawlPhase;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CrawlSink, StorageError, StorageResult};
use crate::storage::{Building, FailureRecord, JobRecord, Property, Unit};
use crate::PresaleError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(PresaleError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, PresaleError> {
        let conn = init_database(path).map_err(StorageError::from)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, PresaleError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self { conn })
    }

    /// Closes the underlying connection, flushing the WAL
    pub fn close(self) -> Result<(), PresaleError> {
        self.conn
            .close()
            .map_err(|(_, e)| StorageError::from(e))?;
        Ok(())
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl CrawlSink for SqliteStorage {
    // ===== Job Tracking =====

    fn begin_job(&mut self, property_id: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_jobs (property_id, started_at, config_hash, phase) VALUES (?1, ?2, ?3, ?4)",
            params![
                property_id,
                now,
                config_hash,
                CrawlPhase::FetchingProperty.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_job(
        &mut self,
        job_id: i64,
        phase: CrawlPhase,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_jobs SET phase = ?1, finished_at = ?2, error_message = ?3 WHERE id = ?4",
            params![phase.to_db_string(), now, error_message, job_id],
        )?;

        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn record_building_failure(
        &mut self,
        job_id: i64,
        building_id: &str,
        pass: u32,
        message: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO building_failures (job_id, building_id, pass, error_message, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, building_id, pass, message, now],
        )?;
        Ok(())
    }

    // ===== Entity Writes =====

    fn save_property(&mut self, property: &Property) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let metadata = serde_json::to_string(&property.metadata)?;
        self.conn.execute(
            "INSERT INTO properties (id, name, address, developer, presale_license, district, metadata, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                developer = excluded.developer,
                presale_license = excluded.presale_license,
                district = excluded.district,
                metadata = excluded.metadata,
                crawled_at = excluded.crawled_at",
            params![
                property.id,
                property.name,
                property.address,
                property.developer,
                property.presale_license,
                property.district,
                metadata,
                now
            ],
        )?;
        Ok(())
    }

    fn save_buildings(&mut self, property_id: &str, buildings: &[Building]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO buildings (property_id, id, name, floors, position, crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(property_id, id) DO UPDATE SET
                    name = excluded.name,
                    floors = excluded.floors,
                    position = excluded.position,
                    crawled_at = excluded.crawled_at",
            )?;

            for (position, building) in buildings.iter().enumerate() {
                stmt.execute(params![
                    property_id,
                    building.id,
                    building.name,
                    building.floors,
                    position as i64,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn save_units(
        &mut self,
        property_id: &str,
        building_id: &str,
        units: &[Unit],
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        // A building's unit list is replaced wholesale on every successful fetch
        tx.execute(
            "DELETE FROM units WHERE property_id = ?1 AND building_id = ?2",
            params![property_id, building_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO units (property_id, building_id, id, area, status, position, crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for (position, unit) in units.iter().enumerate() {
                stmt.execute(params![
                    property_id,
                    building_id,
                    unit.id,
                    unit.area,
                    unit.status,
                    position as i64,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ===== Reads =====

    fn get_job(&self, job_id: i64) -> StorageResult<JobRecord> {
        let job = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", JOB_SELECT),
                params![job_id],
                job_from_row,
            )
            .optional()?;

        job.ok_or(StorageError::JobNotFound(job_id))
    }

    fn latest_job(&self, property_id: &str) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE property_id = ?1 ORDER BY id DESC LIMIT 1",
                    JOB_SELECT
                ),
                params![property_id],
                job_from_row,
            )
            .optional()?;

        Ok(job)
    }

    fn get_property(&self, property_id: &str) -> StorageResult<Option<Property>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, address, developer, presale_license, district, metadata
             FROM properties WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![property_id], |row| {
                Ok((
                    Property {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        address: row.get(2)?,
                        developer: row.get(3)?,
                        presale_license: row.get(4)?,
                        district: row.get(5)?,
                        metadata: Vec::new(),
                    },
                    row.get::<_, String>(6)?,
                ))
            })
            .optional()?;

        match row {
            Some((mut property, metadata)) => {
                property.metadata = serde_json::from_str(&metadata)?;
                Ok(Some(property))
            }
            None => Ok(None),
        }
    }

    fn get_buildings(&self, property_id: &str) -> StorageResult<Vec<Building>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, floors FROM buildings WHERE property_id = ?1 ORDER BY position",
        )?;

        let buildings = stmt
            .query_map(params![property_id], |row| {
                Ok(Building {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    floors: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(buildings)
    }

    fn get_units(&self, property_id: &str, building_id: &str) -> StorageResult<Vec<Unit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, area, status FROM units
             WHERE property_id = ?1 AND building_id = ?2 ORDER BY position",
        )?;

        let units = stmt
            .query_map(params![property_id, building_id], |row| {
                Ok(Unit {
                    id: row.get(0)?,
                    area: row.get(1)?,
                    status: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(units)
    }

    fn get_building_failures(&self, job_id: i64) -> StorageResult<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, building_id, pass, error_message, failed_at
             FROM building_failures WHERE job_id = ?1 ORDER BY id",
        )?;

        let failures = stmt
            .query_map(params![job_id], |row| {
                Ok(FailureRecord {
                    job_id: row.get(0)?,
                    building_id: row.get(1)?,
                    pass: row.get(2)?,
                    error_message: row.get(3)?,
                    failed_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failures)
    }

    // ===== Statistics =====

    fn count_properties(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM properties")
    }

    fn count_buildings(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM buildings")
    }

    fn count_units(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM units")
    }

    fn count_jobs_by_phase(&self, phase: CrawlPhase) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_jobs WHERE phase = ?1",
            params![phase.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

const JOB_SELECT: &str = "SELECT id, property_id, started_at, finished_at, config_hash, phase, error_message
     FROM crawl_jobs";

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        property_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        phase: CrawlPhase::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(CrawlPhase::Failed),
        error_message: row.get(6)?,
    })
}

/// Opens a database file and applies pragmas and schema
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(id: &str) -> Property {
        Property {
            id: id.to_string(),
            name: "Riverside Garden".to_string(),
            address: "88 River Road".to_string(),
            developer: "Riverside Development Co.".to_string(),
            presale_license: Some("2021-0042".to_string()),
            district: Some("Yuelu".to_string()),
            metadata: vec![("Total units".to_string(), "480".to_string())],
        }
    }

    fn building(id: &str, floors: Option<u32>) -> Building {
        Building {
            id: id.to_string(),
            name: format!("Building {}", id),
            floors,
        }
    }

    fn unit(id: &str, area: Option<f64>) -> Unit {
        Unit {
            id: id.to_string(),
            area,
            status: "available".to_string(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job_id = storage.begin_job("P1", "hash").unwrap();
        assert!(job_id > 0);

        let job = storage.get_job(job_id).unwrap();
        assert_eq!(job.phase, CrawlPhase::FetchingProperty);
        assert!(job.finished_at.is_none());

        storage
            .finish_job(job_id, CrawlPhase::Failed, Some("HTTP 500"))
            .unwrap();
        let job = storage.get_job(job_id).unwrap();
        assert_eq!(job.phase, CrawlPhase::Failed);
        assert_eq!(job.error_message.as_deref(), Some("HTTP 500"));
        assert!(job.finished_at.is_some());
        assert_eq!(storage.count_jobs_by_phase(CrawlPhase::Failed).unwrap(), 1);
    }

    #[test]
    fn test_latest_job_per_property() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.latest_job("P1").unwrap().is_none());

        let first = storage.begin_job("P1", "hash").unwrap();
        storage.begin_job("P2", "hash").unwrap();
        let second = storage.begin_job("P1", "hash").unwrap();
        assert!(second > first);

        let latest = storage.latest_job("P1").unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.property_id, "P1");
    }

    #[test]
    fn test_finish_unknown_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_job(99, CrawlPhase::Done, None);
        assert!(matches!(result, Err(StorageError::JobNotFound(99))));
    }

    #[test]
    fn test_property_roundtrip_with_metadata() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_property(&property("P1")).unwrap();

        let loaded = storage.get_property("P1").unwrap().unwrap();
        assert_eq!(loaded, property("P1"));
        assert!(storage.get_property("missing").unwrap().is_none());
    }

    #[test]
    fn test_recrawl_replaces_property() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_property(&property("P1")).unwrap();
        storage
            .save_buildings("P1", &[building("B1", Some(18))])
            .unwrap();

        let mut updated = property("P1");
        updated.name = "Riverside Garden Phase II".to_string();
        storage.save_property(&updated).unwrap();

        assert_eq!(storage.count_properties().unwrap(), 1);
        assert_eq!(
            storage.get_property("P1").unwrap().unwrap().name,
            "Riverside Garden Phase II"
        );
    }

    #[test]
    fn test_buildings_keep_site_order() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_property(&property("P1")).unwrap();
        storage
            .save_buildings(
                "P1",
                &[
                    building("Z9", Some(32)),
                    building("A1", None),
                    building("M5", Some(11)),
                ],
            )
            .unwrap();

        let ids: Vec<String> = storage
            .get_buildings("P1")
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["Z9", "A1", "M5"]);
    }

    #[test]
    fn test_save_units_replaces_previous_list() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_property(&property("P1")).unwrap();
        storage
            .save_buildings("P1", &[building("B1", Some(18))])
            .unwrap();

        storage
            .save_units("P1", "B1", &[unit("101", Some(89.5)), unit("102", None)])
            .unwrap();
        storage
            .save_units("P1", "B1", &[unit("101", Some(90.0))])
            .unwrap();

        let units = storage.get_units("P1", "B1").unwrap();
        assert_eq!(units, vec![unit("101", Some(90.0))]);
        assert_eq!(storage.count_units().unwrap(), 1);
    }

    #[test]
    fn test_repeated_room_numbers_are_all_stored() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_property(&property("P1")).unwrap();
        storage
            .save_buildings("P1", &[building("B1", Some(18))])
            .unwrap();

        // Room 101 exists once per entrance
        let units = vec![
            unit("101", Some(89.5)),
            unit("102", Some(72.0)),
            unit("101", Some(91.2)),
        ];
        storage.save_units("P1", "B1", &units).unwrap();

        assert_eq!(storage.get_units("P1", "B1").unwrap(), units);
        assert_eq!(storage.count_units().unwrap(), 3);
    }

    #[test]
    fn test_units_require_known_building() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_property(&property("P1")).unwrap();

        let result = storage.save_units("P1", "B404", &[unit("101", None)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_building_failures_recorded_per_pass() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job_id = storage.begin_job("P1", "hash").unwrap();

        storage
            .record_building_failure(job_id, "B2", 0, "HTTP 502")
            .unwrap();
        storage
            .record_building_failure(job_id, "B2", 1, "timeout")
            .unwrap();

        let failures = storage.get_building_failures(job_id).unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].pass, 0);
        assert_eq!(failures[1].pass, 1);
        assert_eq!(failures[1].error_message, "timeout");
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presale.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.save_property(&property("P1")).unwrap();
            storage.close().unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_properties().unwrap(), 1);
    }
}
