//! `callscope` command-line front end.
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use callscope_core::config::AnalyzerConfig;
use callscope_core::graph::document::GraphDocument;
use callscope_core::graph::{CodeGraph, EdgeKind};
use callscope_core::indexer::pipeline::{analyze_project, load_or_analyze, AnalysisReport, CancellationToken};
use callscope_core::query::references::{resolve_function_ids, walk_references, Direction};
use callscope_core::query::search::search_functions;
use callscope_core::query::structure::{file_summary, functions_in_file, render_structure};
use callscope_core::store::database::SqliteSnapshotStore;
use callscope_core::store::SnapshotDiagnostics;

#[derive(Parser, Debug)]
#[command(
    name = "callscope",
    version,
    about = "Static call-graph extraction for Python codebases"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Number of parsing threads (defaults to the number of CPUs)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Extra directory name to skip (repeatable)
    #[arg(long = "skip-dir", value_name = "NAME", global = true)]
    skip_dirs: Vec<String>,

    /// Count calls to Python builtins as unresolved instead of filtering them
    #[arg(long, global = true)]
    keep_builtins: bool,

    /// Narrow ambiguous calls using each file's imports
    #[arg(long, global = true)]
    resolve_imports: bool,

    /// Honor .gitignore files while walking the project
    #[arg(long, global = true)]
    gitignore: bool,

    /// JSON config file, applied before environment overrides and flags
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a project and print a summary
    Analyze {
        root: PathBuf,

        /// Write the graph as JSON to this file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// SQLite snapshot cache keyed by the codebase fingerprint
        #[arg(long, value_name = "DB")]
        cache: Option<PathBuf>,
    },
    /// Functions calling NAME, transitively up to --depth
    Callers {
        root: PathBuf,
        /// Bare function name or qualified id
        name: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Functions called by NAME, transitively up to --depth
    Callees {
        root: PathBuf,
        /// Bare function name or qualified id
        name: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Case-insensitive substring search over function names
    Search {
        root: PathBuf,
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Functions defined in FILE (path relative to ROOT)
    Functions { root: PathBuf, file: String },
    /// Plain-text outline of every file and its functions
    Structure {
        root: PathBuf,
        /// Approximate token budget for the outline
        #[arg(long, default_value_t = 4000)]
        budget: usize,
        #[arg(long)]
        no_signatures: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults, then the config file, then `CALLSCOPE_*` variables, then flags.
fn load_config(common: &CommonArgs) -> Result<AnalyzerConfig> {
    let base = match &common.config {
        Some(path) => AnalyzerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(workers) = common.workers {
        config.workers = workers.max(1);
    }
    config.skip_dirs.extend(common.skip_dirs.iter().cloned());
    if common.keep_builtins {
        config.filter_builtins = false;
    }
    if common.resolve_imports {
        config.resolve_imports = true;
    }
    if common.gitignore {
        config.respect_gitignore = true;
    }
    Ok(config)
}

fn analyze(root: &Path, config: &AnalyzerConfig) -> Result<AnalysisReport> {
    let report = analyze_project(root, config, &CancellationToken::new())
        .with_context(|| format!("failed to analyze {}", root.display()))?;
    for failure in &report.failures {
        warn!("{failure}");
    }
    Ok(report)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary(
    graph: &CodeGraph,
    diagnostics: &SnapshotDiagnostics,
    report: Option<&AnalysisReport>,
    fingerprint: Option<&str>,
) -> serde_json::Value {
    let mut value = json!({
        "files": graph.file_count(),
        "functions": graph.function_count(),
        "edges": graph.edge_count(),
        "calls_edges": graph.edge_count_of(EdgeKind::Calls),
        "cached": report.is_none(),
        "files_seen": diagnostics.files_seen,
        "failures": diagnostics.failures,
        "call_sites": diagnostics.resolution.total,
        "resolved": diagnostics.resolution.resolved,
        "unresolved": diagnostics.resolution.unresolved,
        "builtin": diagnostics.resolution.builtin,
        "ambiguous": diagnostics.resolution.ambiguous.len(),
    });
    if let Some(fingerprint) = fingerprint {
        value["fingerprint"] = json!(fingerprint);
    }
    if let Some(report) = report {
        value["elapsed_ms"] = json!(report.elapsed_ms);
    }
    value
}

fn run_analyze(root: &Path, config: &AnalyzerConfig, output: Option<&Path>, cache: Option<&Path>) -> Result<()> {
    let (graph, value) = match cache {
        Some(db) => {
            let store = SqliteSnapshotStore::open(db)
                .with_context(|| format!("failed to open snapshot cache {}", db.display()))?;
            let cached = load_or_analyze(root, config, &store, &CancellationToken::new())
                .with_context(|| format!("failed to analyze {}", root.display()))?;
            if cached.from_cache() {
                for failure in &cached.diagnostics.failures {
                    warn!("{failure}");
                }
            }
            let value = summary(
                &cached.graph,
                &cached.diagnostics,
                cached.report.as_ref(),
                Some(&cached.fingerprint),
            );
            (cached.graph, value)
        }
        None => {
            let report = analyze(root, config)?;
            let value = summary(&report.graph, &report.diagnostics(), Some(&report), None);
            (Arc::clone(&report.graph), value)
        }
    };

    if let Some(path) = output {
        let payload = GraphDocument::from_graph(&graph).to_json_pretty()?;
        std::fs::write(path, payload).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "graph written");
    }
    print_json(&value)
}

fn run_references(root: &Path, config: &AnalyzerConfig, name: &str, direction: Direction, depth: usize) -> Result<()> {
    let report = analyze(root, config)?;
    let ids = resolve_function_ids(&report.graph, name);
    if ids.is_empty() {
        bail!("no function named `{name}` in {}", root.display());
    }
    let results: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            json!({
                "function": id,
                "direction": direction,
                "hits": walk_references(&report.graph, id, direction, depth),
            })
        })
        .collect();
    print_json(&results)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);
    let config = load_config(&cli.common)?;

    match cli.command {
        Commands::Analyze { root, output, cache } => {
            run_analyze(&root, &config, output.as_deref(), cache.as_deref())
        }
        Commands::Callers { root, name, depth } => {
            run_references(&root, &config, &name, Direction::Callers, depth)
        }
        Commands::Callees { root, name, depth } => {
            run_references(&root, &config, &name, Direction::Callees, depth)
        }
        Commands::Search { root, query, limit } => {
            let report = analyze(&root, &config)?;
            print_json(&search_functions(&report.graph, &query, limit))
        }
        Commands::Functions { root, file } => {
            let report = analyze(&root, &config)?;
            let file = file.replace('\\', "/");
            if report.graph.file(&file).is_none() {
                let known: Vec<String> = file_summary(&report.graph).into_iter().map(|s| s.file_path).collect();
                bail!("`{file}` was not analyzed; known files: {}", known.join(", "));
            }
            print_json(&functions_in_file(&report.graph, &file))
        }
        Commands::Structure {
            root,
            budget,
            no_signatures,
        } => {
            let report = analyze(&root, &config)?;
            println!("{}", render_structure(&report.graph, budget, !no_signatures));
            Ok(())
        }
    }
}
