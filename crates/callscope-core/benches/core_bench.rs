//! Criterion benchmarks for callscope-core.
//!
//! ## Benchmark groups
//!
//! 1. **schema**: snapshot store DDL and migration overhead.
//! 2. **guards**: input clamping and truncation.
//! 3. **parsing**: single-file parsing at various sizes.
//! 4. **graph_build**: merging and resolution over synthetic projects.
//! 5. **queries**: traversals and search on built graphs.
//! 6. **analysis**: end-to-end project analysis from disk.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/callscope-core/Cargo.toml
//! # Run only the query group:
//! cargo bench --manifest-path crates/callscope-core/Cargo.toml -- queries
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusqlite::Connection;

use callscope_core::config::AnalyzerConfig;
use callscope_core::graph::builder::build_graph;
use callscope_core::graph::CodeGraph;
use callscope_core::indexer::pipeline::{analyze_project, parse_source, CancellationToken};
use callscope_core::models::FileParse;
use callscope_core::query::guards::{adaptive_graph_cap, clamp_depth, clamp_limit, truncate_query};
use callscope_core::query::references::{call_chain, resolve_function_ids, walk_references, Direction};
use callscope_core::query::search::search_functions;
use callscope_core::query::structure::{file_summary, functions_in_file};
use callscope_core::store::schema::{migrate_schema, SCHEMA_STATEMENTS};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Python source for module `index` with `functions` top-level functions and
/// one class. Each function calls its successor, a shared `helper`, and a
/// function in the next module, so the graph has local, ambiguous and
/// cross-file edges.
fn synthetic_module(index: usize, functions: usize, modules: usize) -> String {
    let next_module = (index + 1) % modules.max(1);
    let mut source = format!("\"\"\"Synthetic module {index}.\"\"\"\nimport os\n\n");
    for f in 0..functions {
        source.push_str(&format!(
            "def func_{index}_{f}(value, *args, **kwargs):\n    \"\"\"Step {f}.\"\"\"\n    \
             result = helper(value)\n    func_{index}_{next}(result)\n    \
             func_{next_module}_0(len(args))\n    return os.path.join(str(result))\n\n",
            next = (f + 1) % functions.max(1),
        ));
    }
    source.push_str(&format!(
        "class Service{index}:\n    def run(self):\n        return self.step()\n\n    \
         def step(self):\n        return helper(1)\n\n\ndef helper(x):\n    return x\n\n\
         Service{index}().run()\n"
    ));
    source
}

fn synthetic_parses(modules: usize, functions: usize) -> Vec<FileParse> {
    let config = AnalyzerConfig::default();
    (0..modules)
        .map(|m| {
            parse_source(
                &format!("pkg{}/mod{m}.py", m % 5),
                &synthetic_module(m, functions, modules),
                &config,
            )
            .unwrap()
        })
        .collect()
}

/// Scales:
/// - "small"  → 10 files × 10 functions
/// - "medium" → 25 files × 20 functions
/// - "large"  → 50 files × 40 functions
fn scale_dims(scale: &str) -> (usize, usize) {
    match scale {
        "small" => (10, 10),
        "medium" => (25, 20),
        "large" => (50, 40),
        _ => (10, 10),
    }
}

fn bench_graph(scale: &str) -> CodeGraph {
    let (modules, functions) = scale_dims(scale);
    build_graph(&synthetic_parses(modules, functions), &AnalyzerConfig::default()).0
}

// ---------------------------------------------------------------------------
// Benchmark: schema
// ---------------------------------------------------------------------------

fn bench_schema_init(c: &mut Criterion) {
    c.bench_function("schema_init_and_migrate", |b| {
        b.iter(|| {
            let conn = Connection::open_in_memory().unwrap();
            for stmt in SCHEMA_STATEMENTS {
                conn.execute_batch(stmt).unwrap();
            }
            migrate_schema(&conn).unwrap();
            black_box(&conn);
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: guards
// ---------------------------------------------------------------------------

fn bench_guards(c: &mut Criterion) {
    let mut group = c.benchmark_group("guards");
    group.bench_function("clamp_depth", |b| {
        b.iter(|| clamp_depth(black_box(42), black_box(6)));
    });
    group.bench_function("clamp_limit", |b| {
        b.iter(|| clamp_limit(black_box(0), black_box(100)));
    });
    group.bench_function("truncate_query_long", |b| {
        let long = "helper_".repeat(200);
        b.iter(|| truncate_query(black_box(&long)));
    });
    group.bench_function("adaptive_graph_cap_large_repo", |b| {
        b.iter(|| adaptive_graph_cap(black_box(50_000), black_box(2000), black_box(200)));
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: single-file parsing
// ---------------------------------------------------------------------------

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let config = AnalyzerConfig::default();
    for &functions in &[10usize, 100, 500] {
        let source = synthetic_module(0, functions, 2);
        group.bench_with_input(BenchmarkId::new("parse_source", functions), &source, |b, source| {
            b.iter(|| black_box(parse_source("pkg/mod.py", black_box(source), &config).unwrap()));
        });
    }
    group.bench_function("syntax_error", |b| {
        let source = format!("{}\ndef broken(:\n    pass\n", synthetic_module(0, 50, 2));
        b.iter(|| black_box(parse_source("broken.py", black_box(&source), &config).is_err()));
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: graph building
// ---------------------------------------------------------------------------

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    let config = AnalyzerConfig::default();
    for scale in &["small", "medium", "large"] {
        let (modules, functions) = scale_dims(scale);
        let parses = synthetic_parses(modules, functions);
        group.bench_with_input(BenchmarkId::new("build_graph", scale), &parses, |b, parses| {
            b.iter(|| black_box(build_graph(black_box(parses), &config)));
        });
    }
    let parses = synthetic_parses(25, 20);
    let graph = build_graph(&parses, &config).0;
    group.bench_function("document_round_trip_medium", |b| {
        b.iter(|| {
            let json = graph.to_json().unwrap();
            black_box(CodeGraph::from_json(&json).unwrap());
        });
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: queries
// ---------------------------------------------------------------------------

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    for scale in &["small", "medium", "large"] {
        let graph = bench_graph(scale);
        let helper = resolve_function_ids(&graph, "helper").remove(0);
        let entry = resolve_function_ids(&graph, "func_0_0").remove(0);
        group.bench_with_input(BenchmarkId::new("callers_walk", scale), &graph, |b, graph| {
            b.iter(|| black_box(walk_references(graph, &helper, Direction::Callers, 3)));
        });
        group.bench_with_input(BenchmarkId::new("callees_walk", scale), &graph, |b, graph| {
            b.iter(|| black_box(walk_references(graph, &entry, Direction::Callees, 4)));
        });
        group.bench_with_input(BenchmarkId::new("call_chain", scale), &graph, |b, graph| {
            b.iter(|| black_box(call_chain(graph, &entry, 5)));
        });
        group.bench_with_input(BenchmarkId::new("search", scale), &graph, |b, graph| {
            b.iter(|| black_box(search_functions(graph, black_box("func_1"), 20)));
        });
    }
    let graph = bench_graph("medium");
    group.bench_function("functions_in_file", |b| {
        b.iter(|| black_box(functions_in_file(&graph, "pkg0/mod0.py")));
    });
    group.bench_function("file_summary", |b| {
        b.iter(|| black_box(file_summary(&graph)));
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: end-to-end analysis
// ---------------------------------------------------------------------------

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    group.sample_size(10);
    let dir = tempfile::tempdir().unwrap();
    let (modules, functions) = scale_dims("medium");
    for m in 0..modules {
        let path = dir.path().join(format!("pkg{}/mod{m}.py", m % 5));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, synthetic_module(m, functions, modules)).unwrap();
    }
    for workers in [1usize, 4] {
        let config = AnalyzerConfig {
            workers,
            ..AnalyzerConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("analyze_project", workers), &config, |b, config| {
            b.iter(|| black_box(analyze_project(dir.path(), config, &CancellationToken::new()).unwrap()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Register all benchmark groups
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_schema_init,
    bench_guards,
    bench_parsing,
    bench_graph_build,
    bench_queries,
    bench_analysis,
);
criterion_main!(benches);
