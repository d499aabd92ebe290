//! SQLite schema DDL and migration framework for the snapshot store.

use rusqlite::Connection;

use crate::errors::CallscopeResult;

/// Current schema version. Migrations run from whatever the database
/// currently reports up to this value.
pub const SCHEMA_VERSION: i32 = 3;

/// Baseline DDL, safe to replay on an initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS snapshots (
        key TEXT PRIMARY KEY,
        document_version INTEGER NOT NULL,
        node_count INTEGER NOT NULL,
        edge_count INTEGER NOT NULL,
        payload TEXT NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
];

// ─── Migration framework ────────────────────────────────────────────────────

/// Run pending migrations up to [`SCHEMA_VERSION`]. Each step runs inside
/// a SAVEPOINT so a failure rolls back only that step.
pub fn migrate_schema(conn: &Connection) -> CallscopeResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT callscope_migrate_step;")?;

        let step_result = (|| -> CallscopeResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                3 => migrate_to_v3(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT callscope_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => current_version = next_version,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT callscope_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT callscope_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Stored schema version, or 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> CallscopeResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> CallscopeResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline, created by [`SCHEMA_STATEMENTS`].
fn migrate_to_v1(_conn: &Connection) -> CallscopeResult<()> {
    Ok(())
}

/// v1 -> v2: track call-edge counts and index snapshots by age.
fn migrate_to_v2(conn: &Connection) -> CallscopeResult<()> {
    let has_column: bool = conn
        .prepare("SELECT 1 FROM pragma_table_info('snapshots') WHERE name = 'call_edge_count';")?
        .exists([])?;
    if !has_column {
        conn.execute_batch(
            "ALTER TABLE snapshots ADD COLUMN call_edge_count INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_created ON snapshots(created_at);",
    )?;
    Ok(())
}

/// v2 -> v3: persist analysis diagnostics beside each snapshot. Rows
/// written earlier keep a NULL and read as stale.
fn migrate_to_v3(conn: &Connection) -> CallscopeResult<()> {
    let has_column: bool = conn
        .prepare("SELECT 1 FROM pragma_table_info('snapshots') WHERE name = 'diagnostics';")?
        .exists([])?;
    if !has_column {
        conn.execute_batch("ALTER TABLE snapshots ADD COLUMN diagnostics TEXT;")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn
    }

    #[test]
    fn test_migrate_fresh_database() {
        let conn = fresh();
        assert_eq!(get_schema_version(&conn), 0);
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let steps: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM migration_history WHERE status = 'success';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(steps, SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_v2_adds_call_edge_count() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO snapshots(key, document_version, node_count, edge_count, payload, call_edge_count) \
             VALUES ('k', 1, 0, 0, '{}', 3);",
            [],
        )
        .unwrap();
        let count: i64 = conn
            .query_row("SELECT call_edge_count FROM snapshots WHERE key = 'k';", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_v3_adds_diagnostics_to_existing_rows() {
        let conn = fresh();
        migrate_to_v1(&conn).unwrap();
        migrate_to_v2(&conn).unwrap();
        set_schema_version(&conn, 2).unwrap();
        conn.execute(
            "INSERT INTO snapshots(key, document_version, node_count, edge_count, payload) \
             VALUES ('old', 1, 0, 0, '{}');",
            [],
        )
        .unwrap();

        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 3);
        let diagnostics: Option<String> = conn
            .query_row("SELECT diagnostics FROM snapshots WHERE key = 'old';", [], |row| row.get(0))
            .unwrap();
        assert_eq!(diagnostics, None);
    }
}
