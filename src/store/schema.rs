//! SQLite DDL for the booking store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Complete DDL for the booking database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints.
PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tenants (
    id             TEXT PRIMARY KEY,
    slug           TEXT NOT NULL UNIQUE,
    name           TEXT NOT NULL,
    timezone       TEXT NOT NULL DEFAULT 'UTC',
    check_in_time  TEXT NOT NULL DEFAULT '14:00',
    check_out_time TEXT NOT NULL DEFAULT '11:00',
    amenities      TEXT NOT NULL DEFAULT '[]'   -- JSON array of strings
);

CREATE TABLE IF NOT EXISTS room_types (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id),
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
    amenities   TEXT NOT NULL DEFAULT '[]',     -- JSON array of strings
    UNIQUE (tenant_id, code)
);

CREATE INDEX IF NOT EXISTS idx_room_types_tenant ON room_types(tenant_id);

CREATE TABLE IF NOT EXISTS bookings (
    id                TEXT PRIMARY KEY,
    tenant_id         TEXT NOT NULL REFERENCES tenants(id),
    room_type_id      TEXT NOT NULL REFERENCES room_types(id),
    guest_name        TEXT NOT NULL,
    check_in          TEXT NOT NULL,            -- ISO YYYY-MM-DD
    check_out         TEXT NOT NULL,
    adults            INTEGER NOT NULL CHECK (adults >= 1),
    children          INTEGER CHECK (children >= 0),
    nights            INTEGER NOT NULL CHECK (nights >= 1),
    total_price_cents INTEGER CHECK (total_price_cents >= 0),
    status            TEXT NOT NULL CHECK (status IN ('DRAFT', 'CONFIRMED')),
    idempotency_key   TEXT,
    session_id        TEXT,
    payment_ref       TEXT,
    created_at        INTEGER NOT NULL DEFAULT 0,
    updated_at        INTEGER NOT NULL DEFAULT 0,
    CHECK (check_out > check_in)
);

CREATE INDEX IF NOT EXISTS idx_bookings_tenant_room ON bookings(tenant_id, room_type_id);

-- Backstop against concurrent identical attempts.
CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_idempotency
    ON bookings(tenant_id, idempotency_key)
    WHERE idempotency_key IS NOT NULL;
"#;

/// Current schema version stamped into fresh databases.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times — all statements use `IF NOT EXISTS`.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"tenants".to_owned()));
        assert!(tables.contains(&"room_types".to_owned()));
        assert!(tables.contains(&"bookings".to_owned()));
        assert!(tables.contains(&"schema_meta".to_owned()));
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");
        apply_schema(&conn).expect("second apply_schema (idempotent)");
    }

    #[test]
    fn schema_version_is_seeded() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        let version = read_schema_version(&conn)
            .expect("read_schema_version")
            .expect("version should exist");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn booking_date_check_rejects_inverted_range() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");
        conn.execute_batch(
            "INSERT INTO tenants (id, slug, name) VALUES ('t1', 'grand-hotel', 'Grand');
             INSERT INTO room_types (id, tenant_id, code, name, price_cents)
             VALUES ('r1', 't1', 'STANDARD', 'Standard Room', 10000);",
        )
        .expect("seed");

        let result = conn.execute(
            "INSERT INTO bookings (id, tenant_id, room_type_id, guest_name, check_in, check_out,
                                   adults, nights, status)
             VALUES ('b1', 't1', 'r1', 'A', '2026-02-15', '2026-02-13', 2, 2, 'DRAFT')",
            [],
        );
        assert!(result.is_err());
    }
}
