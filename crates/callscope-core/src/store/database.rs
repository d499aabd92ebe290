//! SQLite-backed snapshot store.
//!
//! Each public method opens its own connection, so a store value can be
//! shared across threads without managing connection lifetime.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::errors::{CallscopeError, CallscopeResult};
use crate::graph::document::GraphDocument;
use crate::graph::EdgeKind;
use crate::store::{schema, SnapshotDiagnostics, SnapshotInfo, SnapshotStore, StoredSnapshot};

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if raw.len() > 2 {
                expanded.push(&raw[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn resolve_path(path: &Path) -> CallscopeResult<PathBuf> {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

pub struct SqliteSnapshotStore {
    db_path: PathBuf,
}

impl SqliteSnapshotStore {
    /// Open (creating if needed) a store at `db_path` and bring its schema
    /// up to date. Parent directories are created.
    pub fn open(db_path: &Path) -> CallscopeResult<Self> {
        let resolved = resolve_path(db_path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path: resolved };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> CallscopeResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> CallscopeResult<()> {
        let conn = self.connect()?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&conn)?;
        Ok(())
    }

    /// Copy the database to `destination` with the SQLite backup API.
    pub fn backup_to(&self, destination: &Path) -> CallscopeResult<PathBuf> {
        let resolved = resolve_path(destination)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let src_conn = self.connect()?;
        let mut dst_conn = Connection::open(&resolved)?;
        let backup = rusqlite::backup::Backup::new(&src_conn, &mut dst_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(resolved)
    }

    /// Keep the `keep` newest snapshots and delete the rest. Returns the
    /// number removed.
    pub fn prune(&self, keep: usize) -> CallscopeResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE key NOT IN (\
                SELECT key FROM snapshots ORDER BY created_at DESC, rowid DESC LIMIT ?1\
             );",
            params![keep as i64],
        )?;
        Ok(removed)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&self, key: &str, document: &GraphDocument, diagnostics: &SnapshotDiagnostics) -> CallscopeResult<()> {
        let payload = document.to_json()?;
        let diagnostics_json = serde_json::to_string(diagnostics)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO snapshots(key, document_version, node_count, edge_count, call_edge_count, payload, diagnostics, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP) \
             ON CONFLICT(key) DO UPDATE SET \
                document_version = excluded.document_version, \
                node_count = excluded.node_count, \
                edge_count = excluded.edge_count, \
                call_edge_count = excluded.call_edge_count, \
                payload = excluded.payload, \
                diagnostics = excluded.diagnostics, \
                created_at = excluded.created_at;",
            params![
                key,
                document.version,
                document.nodes.len() as i64,
                document.edges.len() as i64,
                document.edge_count_of(EdgeKind::Calls) as i64,
                payload,
                diagnostics_json,
            ],
        )?;
        debug!(key, nodes = document.nodes.len(), edges = document.edges.len(), "snapshot saved");
        Ok(())
    }

    fn load(&self, key: &str) -> CallscopeResult<Option<StoredSnapshot>> {
        let conn = self.connect()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT payload, diagnostics FROM snapshots WHERE key = ?1;",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((raw, raw_diagnostics)) = row else {
            debug!(key, "snapshot cache miss");
            return Ok(None);
        };
        let document = GraphDocument::from_json(&raw).map_err(|e| {
            CallscopeError::Snapshot(format!("stored snapshot `{key}` is unreadable: {e}"))
        })?;
        let diagnostics = raw_diagnostics
            .map(|raw| serde_json::from_str::<SnapshotDiagnostics>(&raw))
            .transpose()
            .map_err(|e| CallscopeError::Snapshot(format!("stored diagnostics for `{key}` are unreadable: {e}")))?;
        debug!(key, has_diagnostics = diagnostics.is_some(), "snapshot cache hit");
        Ok(Some(StoredSnapshot { document, diagnostics }))
    }

    fn delete(&self, key: &str) -> CallscopeResult<bool> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM snapshots WHERE key = ?1;", params![key])?;
        Ok(removed > 0)
    }

    fn list(&self) -> CallscopeResult<Vec<SnapshotInfo>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT key, document_version, node_count, edge_count, call_edge_count, created_at \
             FROM snapshots ORDER BY created_at DESC, rowid DESC;",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SnapshotInfo {
                key: row.get(0)?,
                document_version: row.get(1)?,
                node_count: row.get::<_, i64>(2)? as usize,
                edge_count: row.get::<_, i64>(3)? as usize,
                call_edge_count: row.get::<_, i64>(4)? as usize,
                created_at: row.get(5)?,
            })
        })?;
        let mut infos = Vec::new();
        for info in rows {
            infos.push(info?);
        }
        Ok(infos)
    }
}
