//! callscope core library: static call-graph extraction for Python codebases.
//!
//! Source files are parsed with tree-sitter without executing them, function
//! definitions and call sites are extracted per file in parallel, and the
//! results are merged into an immutable [`graph::CodeGraph`] whose calls are
//! resolved same-file first, then project-wide by bare name.

pub mod config;
pub mod errors;
pub mod graph;
pub mod indexer;
pub mod models;
pub mod query;
pub mod store;

pub use config::AnalyzerConfig;
pub use errors::{CallscopeError, CallscopeResult};
pub use graph::builder::{build_graph, ResolutionReport};
pub use graph::document::GraphDocument;
pub use graph::snapshot::GraphHandle;
pub use graph::{CodeGraph, EdgeKind, GraphEdge, GraphNode};
pub use indexer::pipeline::{
    analyze_project, analyze_project_with_progress, load_or_analyze, AnalysisReport, Analyzer, CancellationToken,
};
pub use models::{CallSite, FileEntity, FileFailure, FunctionEntity, FunctionKind};
pub use store::database::SqliteSnapshotStore;
pub use store::{MemorySnapshotStore, SnapshotDiagnostics, SnapshotStore, StoredSnapshot};
