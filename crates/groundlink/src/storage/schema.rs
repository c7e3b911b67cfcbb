//! `SQLite` schema definitions for the durable telemetry log.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the records table.
///
/// `sequence` is the decoder-assigned ordering key; arrival order and
/// sequence order coincide, so the primary key doubles as the append order.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS records (
    sequence INTEGER PRIMARY KEY,
    accel_x REAL NOT NULL,
    accel_y REAL NOT NULL,
    accel_z REAL NOT NULL,
    gps_lat REAL NOT NULL,
    gps_lon REAL NOT NULL,
    gps_alt REAL NOT NULL,
    env_temp REAL NOT NULL,
    env_pressure REAL NOT NULL,
    env_humidity REAL NOT NULL,
    recovery_status INTEGER NOT NULL,
    received_at TEXT NOT NULL
)
";

/// SQL statement to create an index on `received_at` for time-based queries.
pub const CREATE_RECEIVED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_received_at ON records(received_at)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_RECORDS_TABLE,
    CREATE_RECEIVED_AT_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_records_table_contains_all_fields() {
        assert!(CREATE_RECORDS_TABLE.contains("sequence INTEGER PRIMARY KEY"));
        for column in [
            "accel_x", "accel_y", "accel_z", "gps_lat", "gps_lon", "gps_alt", "env_temp",
            "env_pressure", "env_humidity",
        ] {
            assert!(
                CREATE_RECORDS_TABLE.contains(&format!("{column} REAL NOT NULL")),
                "missing column: {column}"
            );
        }
        assert!(CREATE_RECORDS_TABLE.contains("recovery_status INTEGER NOT NULL"));
        assert!(CREATE_RECORDS_TABLE.contains("received_at TEXT NOT NULL"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
