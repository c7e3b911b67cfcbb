//! Durable telemetry log for groundlink.
//!
//! This module provides the `SQLite`-backed append-only log behind the
//! record sink. Every accepted record lands here in arrival order; nothing in
//! the core ever deletes from the log (rotation is an external concern).
//! Writes arrive in batches so the sink's flush policy maps to one
//! transaction per flush.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::{RecoveryStatus, TelemetryRecord};

/// Append-only storage engine for telemetry records.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create the durable log at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening durable log at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Durable log opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory log instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a batch of records in one transaction.
    ///
    /// Records are written in slice order; either the whole batch commits or
    /// none of it does, so a mid-batch failure never leaves a partial flush
    /// in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; the sink treats that as a
    /// log write fault and fails closed.
    pub fn insert_batch(&mut self, records: &[TelemetryRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let received_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r"
                INSERT INTO records (
                    sequence, accel_x, accel_y, accel_z,
                    gps_lat, gps_lon, gps_alt,
                    env_temp, env_pressure, env_humidity,
                    recovery_status, received_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ",
            )?;
            for record in records {
                stmt.execute(params![
                    i64::try_from(record.sequence).unwrap_or(i64::MAX),
                    record.accel_x,
                    record.accel_y,
                    record.accel_z,
                    record.gps_lat,
                    record.gps_lon,
                    record.gps_alt,
                    record.env_temp,
                    record.env_pressure,
                    record.env_humidity,
                    i64::from(record.recovery_status.code()),
                    received_at,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Appended {} records to the durable log", records.len());
        Ok(records.len())
    }

    /// Get a record by its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, sequence: u64) -> Result<Option<TelemetryRecord>> {
        let seq = i64::try_from(sequence).unwrap_or(i64::MAX);
        let result = self
            .conn
            .query_row(
                r"
                SELECT sequence, accel_x, accel_y, accel_z,
                       gps_lat, gps_lon, gps_alt,
                       env_temp, env_pressure, env_humidity,
                       recovery_status
                FROM records WHERE sequence = ?1
                ",
                [seq],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    /// Get the most recent records in increasing sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<TelemetryRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT sequence, accel_x, accel_y, accel_z,
                   gps_lat, gps_lon, gps_alt,
                   env_temp, env_pressure, env_humidity,
                   recovery_status
            FROM records ORDER BY sequence DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut records = stmt
            .query_map([limit_i64], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        records.reverse();
        Ok(records)
    }

    /// Count total records in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get durable log statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_records = self.count()?;

        let first_sequence: Option<i64> = self
            .conn
            .query_row("SELECT MIN(sequence) FROM records", [], |row| row.get(0))
            .optional()?
            .flatten();

        let last_sequence: Option<i64> = self
            .conn
            .query_row("SELECT MAX(sequence) FROM records", [], |row| row.get(0))
            .optional()?
            .flatten();

        let newest_received_at: Option<String> = self
            .conn
            .query_row(
                "SELECT received_at FROM records ORDER BY sequence DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let newest_received_at = newest_received_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        // Get database file size
        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_records,
            first_sequence: first_sequence.and_then(|s| u64::try_from(s).ok()),
            last_sequence: last_sequence.and_then(|s| u64::try_from(s).ok()),
            newest_received_at,
            db_size_bytes,
        })
    }

    /// Convert a database row to a `TelemetryRecord`.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TelemetryRecord> {
        let sequence: i64 = row.get(0)?;
        let status_code: i64 = row.get(10)?;

        let recovery_status = u8::try_from(status_code)
            .ok()
            .and_then(RecoveryStatus::from_code)
            .unwrap_or(RecoveryStatus::NotDeployed);

        Ok(TelemetryRecord {
            sequence: u64::try_from(sequence).unwrap_or(0),
            accel_x: row.get(1)?,
            accel_y: row.get(2)?,
            accel_z: row.get(3)?,
            gps_lat: row.get(4)?,
            gps_lon: row.get(5)?,
            gps_alt: row.get(6)?,
            env_temp: row.get(7)?,
            env_pressure: row.get(8)?,
            env_humidity: row.get(9)?,
            recovery_status,
        })
    }
}

/// Statistics about the durable log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Total number of records in the log.
    pub total_records: i64,
    /// Lowest sequence number present.
    pub first_sequence: Option<u64>,
    /// Highest sequence number present.
    pub last_sequence: Option<u64>,
    /// Arrival time of the newest record.
    pub newest_received_at: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn record(sequence: u64, status: RecoveryStatus) -> TelemetryRecord {
        TelemetryRecord {
            sequence,
            accel_x: 0.12,
            accel_y: -0.03,
            accel_z: 9.81,
            gps_lat: 37.7,
            gps_lon: -122.4,
            gps_alt: 120.5,
            env_temp: 21.5,
            env_pressure: 1013.2,
            env_humidity: 45.0,
            recovery_status: status,
        }
    }

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_insert_batch_and_get() {
        let mut storage = create_test_storage();
        let records = vec![
            record(1, RecoveryStatus::NotDeployed),
            record(2, RecoveryStatus::Armed),
        ];

        let written = storage.insert_batch(&records).unwrap();
        assert_eq!(written, 2);

        let retrieved = storage.get(2).unwrap().unwrap();
        assert_eq!(retrieved.sequence, 2);
        assert_eq!(retrieved.recovery_status, RecoveryStatus::Armed);
        assert_eq!(retrieved.env_pressure, 1013.2);
    }

    #[test]
    fn test_insert_empty_batch() {
        let mut storage = create_test_storage();
        assert_eq!(storage.insert_batch(&[]).unwrap(), 0);
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_get_nonexistent() {
        let storage = create_test_storage();
        assert!(storage.get(99999).unwrap().is_none());
    }

    #[test]
    fn test_recent_in_sequence_order() {
        let mut storage = create_test_storage();
        let records: Vec<_> = (1..=10)
            .map(|n| record(n, RecoveryStatus::NotDeployed))
            .collect();
        storage.insert_batch(&records).unwrap();

        let recent = storage.recent(3).unwrap();
        let sequences: Vec<u64> = recent.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![8, 9, 10]);
    }

    #[test]
    fn test_count() {
        let mut storage = create_test_storage();
        assert_eq!(storage.count().unwrap(), 0);

        storage
            .insert_batch(&[record(1, RecoveryStatus::NotDeployed)])
            .unwrap();
        storage
            .insert_batch(&[record(2, RecoveryStatus::Deployed)])
            .unwrap();

        assert_eq!(storage.count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let mut storage = create_test_storage();
        storage
            .insert_batch(&[record(1, RecoveryStatus::NotDeployed)])
            .unwrap();

        // Sequence is the primary key; replaying it is a constraint violation
        let result = storage.insert_batch(&[record(1, RecoveryStatus::Armed)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_is_atomic() {
        let mut storage = create_test_storage();
        storage
            .insert_batch(&[record(5, RecoveryStatus::NotDeployed)])
            .unwrap();

        // Batch containing a duplicate rolls back entirely
        let result = storage.insert_batch(&[
            record(6, RecoveryStatus::NotDeployed),
            record(5, RecoveryStatus::NotDeployed),
        ]);
        assert!(result.is_err());
        assert_eq!(storage.count().unwrap(), 1);
        assert!(storage.get(6).unwrap().is_none());
    }

    #[test]
    fn test_stats_empty() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.total_records, 0);
        assert!(stats.first_sequence.is_none());
        assert!(stats.last_sequence.is_none());
        assert!(stats.newest_received_at.is_none());
    }

    #[test]
    fn test_stats_with_data() {
        let mut storage = create_test_storage();
        let records: Vec<_> = (3..=7)
            .map(|n| record(n, RecoveryStatus::NotDeployed))
            .collect();
        storage.insert_batch(&records).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_records, 5);
        assert_eq!(stats.first_sequence, Some(3));
        assert_eq!(stats.last_sequence, Some(7));
        assert!(stats.newest_received_at.is_some());
    }

    #[test]
    fn test_all_recovery_statuses_round_trip() {
        let mut storage = create_test_storage();
        storage
            .insert_batch(&[
                record(1, RecoveryStatus::NotDeployed),
                record(2, RecoveryStatus::Armed),
                record(3, RecoveryStatus::Deployed),
            ])
            .unwrap();

        assert_eq!(
            storage.get(1).unwrap().unwrap().recovery_status,
            RecoveryStatus::NotDeployed
        );
        assert_eq!(
            storage.get(2).unwrap().unwrap().recovery_status,
            RecoveryStatus::Armed
        );
        assert_eq!(
            storage.get(3).unwrap().unwrap().recovery_status,
            RecoveryStatus::Deployed
        );
    }

    #[test]
    fn test_path() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_open_file_based() {
        let temp_dir = std::env::temp_dir();
        let db_path = temp_dir.join(format!("groundlink_test_{}.db", std::process::id()));

        let mut storage = Storage::open(&db_path).unwrap();
        storage
            .insert_batch(&[record(1, RecoveryStatus::NotDeployed)])
            .unwrap();
        assert_eq!(storage.count().unwrap(), 1);
        assert_eq!(storage.path(), db_path);

        let stats = storage.stats().unwrap();
        assert!(stats.db_size_bytes > 0);

        // Clean up
        drop(storage);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp_dir = std::env::temp_dir();
        let nested_path = temp_dir.join(format!(
            "groundlink_test_{}/nested/telemetry.db",
            std::process::id()
        ));

        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let storage = Storage::open(&nested_path).unwrap();
        assert!(nested_path.exists());

        drop(storage);
        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent.parent().unwrap());
        }
    }

    #[test]
    fn test_storage_stats_clone() {
        let stats = StorageStats {
            total_records: 5,
            first_sequence: Some(1),
            last_sequence: Some(5),
            newest_received_at: None,
            db_size_bytes: 512,
        };
        assert_eq!(stats, stats.clone());
    }
}
