//! Persistence of analyzed graphs, keyed by codebase fingerprint.

pub mod database;
pub mod schema;

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::CallscopeResult;
use crate::graph::builder::ResolutionReport;
use crate::graph::document::GraphDocument;
use crate::graph::EdgeKind;
use crate::models::FileFailure;

/// Listing entry for one stored snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub key: String,
    pub document_version: u32,
    pub node_count: usize,
    pub edge_count: usize,
    pub call_edge_count: usize,
    pub created_at: String,
}

/// What an analysis reported beyond the graph itself, kept next to the
/// snapshot so a cache hit can report the same failures and unresolved
/// calls as the run that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiagnostics {
    pub resolution: ResolutionReport,
    pub failures: Vec<FileFailure>,
    pub files_seen: usize,
}

/// A stored graph and the diagnostics of the analysis that built it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub document: GraphDocument,
    /// `None` for rows written before diagnostics were stored.
    pub diagnostics: Option<SnapshotDiagnostics>,
}

/// Key-value save/load boundary for graph documents.
pub trait SnapshotStore: Send + Sync {
    /// Store `document` under `key`, replacing any previous snapshot.
    fn save(&self, key: &str, document: &GraphDocument, diagnostics: &SnapshotDiagnostics) -> CallscopeResult<()>;

    fn load(&self, key: &str) -> CallscopeResult<Option<StoredSnapshot>>;

    /// Remove a snapshot; returns whether one existed.
    fn delete(&self, key: &str) -> CallscopeResult<bool>;

    /// All stored snapshots, newest first.
    fn list(&self) -> CallscopeResult<Vec<SnapshotInfo>>;
}

/// Process-local store, for tests and one-shot tools.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<BTreeMap<String, (u64, StoredSnapshot)>>,
    sequence: Mutex<u64>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, key: &str, document: &GraphDocument, diagnostics: &SnapshotDiagnostics) -> CallscopeResult<()> {
        let mut sequence = self.sequence.lock();
        *sequence += 1;
        let snapshot = StoredSnapshot {
            document: document.clone(),
            diagnostics: Some(diagnostics.clone()),
        };
        self.entries.lock().insert(key.to_string(), (*sequence, snapshot));
        Ok(())
    }

    fn load(&self, key: &str) -> CallscopeResult<Option<StoredSnapshot>> {
        Ok(self.entries.lock().get(key).map(|(_, snapshot)| snapshot.clone()))
    }

    fn delete(&self, key: &str) -> CallscopeResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn list(&self) -> CallscopeResult<Vec<SnapshotInfo>> {
        let entries = self.entries.lock();
        let mut infos: Vec<(u64, SnapshotInfo)> = entries
            .iter()
            .map(|(key, (seq, snapshot))| (*seq, summarize(key, &snapshot.document, seq.to_string())))
            .collect();
        infos.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(infos.into_iter().map(|(_, info)| info).collect())
    }
}

pub(crate) fn summarize(key: &str, document: &GraphDocument, created_at: String) -> SnapshotInfo {
    SnapshotInfo {
        key: key.to_string(),
        document_version: document.version,
        node_count: document.nodes.len(),
        edge_count: document.edges.len(),
        call_edge_count: document.edge_count_of(EdgeKind::Calls),
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CodeGraph;

    #[test]
    fn test_memory_store_save_load_delete() {
        let store = MemorySnapshotStore::new();
        let doc = CodeGraph::new().to_document();
        let diagnostics = SnapshotDiagnostics {
            failures: vec![FileFailure::read("x.py", "too large")],
            files_seen: 2,
            ..SnapshotDiagnostics::default()
        };
        assert!(store.load("k").unwrap().is_none());
        store.save("k", &doc, &diagnostics).unwrap();
        let loaded = store.load("k").unwrap().unwrap();
        assert_eq!(loaded.document, doc);
        assert_eq!(loaded.diagnostics, Some(diagnostics.clone()));
        store.save("j", &doc, &diagnostics).unwrap();
        let keys: Vec<String> = store.list().unwrap().into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["j".to_string(), "k".to_string()]);
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }
}
