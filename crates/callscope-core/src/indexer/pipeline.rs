//! Analysis pipeline orchestration with Rayon-based parallelism.
//!
//! Per-file parsing fans out over a bounded thread pool; graph building
//! waits for every file before it starts, since resolution needs the full
//! project-wide name index.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::errors::{CallscopeError, CallscopeResult};
use crate::graph::builder::{build_graph, ResolutionReport};
use crate::graph::document::GraphDocument;
use crate::graph::snapshot::GraphHandle;
use crate::graph::CodeGraph;
use crate::indexer::callgraph::extract_call_sites;
use crate::indexer::filesystem::{
    codebase_fingerprint, compute_content_hash, ensure_project_root, iter_source_files, read_source,
};
use crate::indexer::imports::extract_imports;
use crate::indexer::parser::parse_python;
use crate::indexer::symbols::extract_functions;
use crate::models::{FileFailure, FileOutcome, FileParse};
use crate::store::{SnapshotDiagnostics, SnapshotStore};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, checked before each file is read.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Single-file parsing
// ---------------------------------------------------------------------------

/// Parse one file's text into functions, call sites and imports.
///
/// Pure: no filesystem access. A syntax error yields a failure record and
/// no entities.
pub fn parse_source(file_path: &str, source: &str, config: &AnalyzerConfig) -> FileOutcome {
    parse_text(
        file_path,
        source.to_string(),
        compute_content_hash(source.as_bytes()),
        config,
    )
}

fn parse_text(file_path: &str, source: String, content_hash: String, config: &AnalyzerConfig) -> FileOutcome {
    let unit = parse_python(file_path, source)?;
    let extracted = extract_functions(&unit);
    let calls = extract_call_sites(&unit, &extracted.ids_by_node, config.module_scope);
    let imports = extract_imports(&unit);

    let mut functions = Vec::with_capacity(extracted.functions.len() + 1);
    functions.extend(calls.module_entity);
    functions.extend(extracted.functions);

    Ok(FileParse {
        file_path: file_path.to_string(),
        content_hash,
        line_count: unit.line_count(),
        functions,
        call_sites: calls.call_sites,
        imports,
    })
}

fn parse_file_worker(
    root: &Path,
    relative_path: &str,
    config: &AnalyzerConfig,
    previous: Option<&HashMap<String, FileParse>>,
) -> (FileOutcome, bool) {
    let source = match read_source(root, relative_path, config.max_file_bytes) {
        Ok(source) => source,
        Err(failure) => return (Err(failure), false),
    };
    if let Some(cached) = previous.and_then(|p| p.get(relative_path)) {
        if cached.content_hash == source.content_hash {
            return (Ok(cached.clone()), true);
        }
    }
    let outcome = isolate_panics(relative_path, || {
        parse_text(relative_path, source.text, source.content_hash, config)
    });
    (outcome, false)
}

/// Run one file's extraction, turning a panic into a failure record for
/// that file so the rest of the batch still completes.
fn isolate_panics<F>(relative_path: &str, extract: F) -> FileOutcome
where
    F: FnOnce() -> FileOutcome,
{
    match std::panic::catch_unwind(AssertUnwindSafe(extract)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(file = relative_path, reason = %reason, "extraction panicked");
            Err(FileFailure::internal(
                relative_path,
                format!("extraction panicked: {reason}"),
            ))
        }
    }
}

/// Result of parsing a batch of files, in input order.
pub struct ParseBatch {
    pub outcomes: Vec<FileOutcome>,
    pub reused: usize,
}

/// Called after each file with `(files_done, files_total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Parse `files` on a pool of at most `config.workers` threads.
///
/// Files whose content hash matches an entry in `previous` reuse that
/// entry instead of being re-parsed. The cancellation token is checked
/// before each file; once it fires, remaining files are skipped and the
/// batch fails with [`CallscopeError::Cancelled`]. A token that fires
/// after the last file finished does not discard the completed batch.
pub fn parallel_parse(
    root: &Path,
    files: &[String],
    config: &AnalyzerConfig,
    cancel: &CancellationToken,
    previous: Option<&HashMap<String, FileParse>>,
    progress: Option<ProgressFn<'_>>,
) -> CallscopeResult<ParseBatch> {
    if files.is_empty() {
        return Ok(ParseBatch {
            outcomes: Vec::new(),
            reused: 0,
        });
    }

    let processed = AtomicUsize::new(0);
    let job = |relative_path: &String| -> Option<(FileOutcome, bool)> {
        if cancel.is_cancelled() {
            return None;
        }
        let result = parse_file_worker(root, relative_path, config, previous);
        let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(report) = progress {
            report(done, files.len());
        }
        Some(result)
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build();
    let results: Vec<Option<(FileOutcome, bool)>> = match pool {
        Ok(pool) => pool.install(|| files.par_iter().map(job).collect()),
        Err(err) => {
            warn!(error = %err, "thread pool unavailable, parsing sequentially");
            files.iter().map(job).collect()
        }
    };

    let processed = processed.load(Ordering::SeqCst);
    if processed < files.len() {
        info!(processed, total = files.len(), "analysis cancelled");
        return Err(CallscopeError::Cancelled { processed });
    }

    let mut outcomes = Vec::with_capacity(results.len());
    let mut reused = 0;
    for (outcome, was_reused) in results.into_iter().flatten() {
        if was_reused {
            reused += 1;
        }
        outcomes.push(outcome);
    }
    Ok(ParseBatch { outcomes, reused })
}

// ---------------------------------------------------------------------------
// Project analysis
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    #[serde(skip)]
    pub graph: Arc<CodeGraph>,
    pub resolution: ResolutionReport,
    pub failures: Vec<FileFailure>,
    pub files_seen: usize,
    pub files_parsed: usize,
    pub files_reused: usize,
    pub elapsed_ms: u64,
}

impl AnalysisReport {
    pub fn function_count(&self) -> usize {
        self.graph.function_count()
    }

    /// The parts of this report that are stored beside a cached graph.
    pub fn diagnostics(&self) -> SnapshotDiagnostics {
        SnapshotDiagnostics {
            resolution: self.resolution.clone(),
            failures: self.failures.clone(),
            files_seen: self.files_seen,
        }
    }
}

fn run_analysis(
    root: &Path,
    config: &AnalyzerConfig,
    cancel: &CancellationToken,
    previous: Option<&HashMap<String, FileParse>>,
    progress: Option<ProgressFn<'_>>,
) -> CallscopeResult<(AnalysisReport, Vec<FileParse>)> {
    let started = Instant::now();
    let root = ensure_project_root(root)?;
    let files = iter_source_files(&root, config);
    let batch = parallel_parse(&root, &files, config, cancel, previous, progress)?;

    let mut parses = Vec::new();
    let mut failures = Vec::new();
    for outcome in batch.outcomes {
        match outcome {
            Ok(parse) => parses.push(parse),
            Err(failure) => {
                warn!(file = %failure.file_path, reason = %failure.message, "skipping file");
                failures.push(failure);
            }
        }
    }

    let (graph, resolution) = build_graph(&parses, config);
    let report = AnalysisReport {
        graph: Arc::new(graph),
        resolution,
        files_seen: files.len(),
        files_parsed: parses.len(),
        files_reused: batch.reused,
        failures,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        root = %root.display(),
        files = report.files_seen,
        parsed = report.files_parsed,
        failed = report.failures.len(),
        functions = report.graph.function_count(),
        edges = report.graph.edge_count(),
        unresolved = report.resolution.unresolved,
        elapsed_ms = report.elapsed_ms,
        "analysis complete"
    );
    Ok((report, parses))
}

/// Analyze every source file below `root` and build the project graph.
///
/// Fails only when the root is missing or the token is cancelled; files
/// that cannot be read or parsed are listed in the report.
pub fn analyze_project(
    root: &Path,
    config: &AnalyzerConfig,
    cancel: &CancellationToken,
) -> CallscopeResult<AnalysisReport> {
    run_analysis(root, config, cancel, None, None).map(|(report, _)| report)
}

/// [`analyze_project`] with a per-file progress callback.
pub fn analyze_project_with_progress(
    root: &Path,
    config: &AnalyzerConfig,
    cancel: &CancellationToken,
    progress: ProgressFn<'_>,
) -> CallscopeResult<AnalysisReport> {
    run_analysis(root, config, cancel, None, Some(progress)).map(|(report, _)| report)
}

// ---------------------------------------------------------------------------
// Incremental analyzer
// ---------------------------------------------------------------------------

/// Re-analyzes a project on demand, re-parsing only files whose content
/// changed, and publishes each new graph through a [`GraphHandle`].
pub struct Analyzer {
    root: PathBuf,
    config: AnalyzerConfig,
    cache: Mutex<HashMap<String, FileParse>>,
    handle: GraphHandle,
}

impl Analyzer {
    pub fn new(root: &Path, config: AnalyzerConfig) -> CallscopeResult<Self> {
        let root = ensure_project_root(root)?;
        Ok(Self {
            root,
            config,
            cache: Mutex::new(HashMap::new()),
            handle: GraphHandle::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The most recently published graph.
    pub fn current(&self) -> Arc<CodeGraph> {
        self.handle.current()
    }

    pub fn handle(&self) -> &GraphHandle {
        &self.handle
    }

    /// Analyze the project again and publish the result. A cancelled
    /// refresh leaves both the cache and the published graph untouched.
    pub fn refresh(&self, cancel: &CancellationToken) -> CallscopeResult<AnalysisReport> {
        let previous = self.cache.lock().clone();
        let (report, parses) = run_analysis(&self.root, &self.config, cancel, Some(&previous), None)?;
        debug!(
            reused = report.files_reused,
            parsed = report.files_parsed - report.files_reused,
            "incremental refresh"
        );
        *self.cache.lock() = parses.into_iter().map(|p| (p.file_path.clone(), p)).collect();
        self.handle.publish(Arc::clone(&report.graph));
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Cached analysis
// ---------------------------------------------------------------------------

pub struct CachedAnalysis {
    pub graph: Arc<CodeGraph>,
    pub fingerprint: String,
    /// Store key: the fingerprint plus a digest of the graph-shaping config.
    pub key: String,
    /// Failures and resolution counts, from this run or the stored one.
    pub diagnostics: SnapshotDiagnostics,
    /// `None` when the graph came from the store.
    pub report: Option<AnalysisReport>,
}

impl CachedAnalysis {
    pub fn from_cache(&self) -> bool {
        self.report.is_none()
    }
}

/// Store key for a codebase fingerprint analyzed under `config`.
pub fn snapshot_key(fingerprint: &str, config: &AnalyzerConfig) -> String {
    format!("{fingerprint}:{}", config.graph_digest())
}

/// Return the stored graph for the project's current fingerprint and
/// config, or analyze the project and store the result under that key.
///
/// A stored snapshot that fails validation, or that predates stored
/// diagnostics, is discarded and rebuilt.
pub fn load_or_analyze(
    root: &Path,
    config: &AnalyzerConfig,
    store: &dyn SnapshotStore,
    cancel: &CancellationToken,
) -> CallscopeResult<CachedAnalysis> {
    let root = ensure_project_root(root)?;
    let files = iter_source_files(&root, config);
    let fingerprint = codebase_fingerprint(&root, &files);
    let key = snapshot_key(&fingerprint, config);

    if let Some(stored) = store.load(&key)? {
        match (stored.document.into_graph(), stored.diagnostics) {
            (Ok(graph), Some(diagnostics)) => {
                info!(key = %key, "loaded cached graph");
                return Ok(CachedAnalysis {
                    graph: Arc::new(graph),
                    fingerprint,
                    key,
                    diagnostics,
                    report: None,
                });
            }
            (Ok(_), None) => {
                warn!(key = %key, "discarding cached graph without diagnostics");
                store.delete(&key)?;
            }
            (Err(err), _) => {
                warn!(key = %key, error = %err, "discarding invalid cached graph");
                store.delete(&key)?;
            }
        }
    }

    let report = analyze_project(&root, config, cancel)?;
    let diagnostics = report.diagnostics();
    store.save(&key, &GraphDocument::from_graph(&report.graph), &diagnostics)?;
    Ok(CachedAnalysis {
        graph: Arc::clone(&report.graph),
        fingerprint,
        key,
        diagnostics,
        report: Some(report),
    })
}
