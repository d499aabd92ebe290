//! Graph construction from per-file parse results.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalyzerConfig;
use crate::graph::{CodeGraph, EdgeKind, GraphNode};
use crate::indexer::callgraph::{resolve_call, ImportContext, Resolution, ResolveOptions, SymbolIndex};
use crate::models::{FileParse, FunctionEntity};

/// A call site whose name matched several definitions; every candidate was
/// linked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousResolution {
    pub caller_id: String,
    pub callee_name: String,
    pub line: usize,
    pub candidates: Vec<String>,
}

/// Call-resolution diagnostics for one build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub builtin: usize,
    pub ambiguous: Vec<AmbiguousResolution>,
    /// Unresolved callee names with their occurrence counts.
    pub unresolved_names: BTreeMap<String, usize>,
}

impl ResolutionReport {
    fn note_unresolved(&mut self, name: &str) {
        self.unresolved += 1;
        *self.unresolved_names.entry(name.to_string()).or_default() += 1;
    }
}

/// Build the project graph from every successfully parsed file.
///
/// Files are processed in path order so repeated builds over the same
/// input produce identical graphs. An empty input yields an empty graph.
pub fn build_graph(parses: &[FileParse], config: &AnalyzerConfig) -> (CodeGraph, ResolutionReport) {
    let mut ordered: Vec<&FileParse> = parses.iter().collect();
    ordered.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let mut graph = CodeGraph::new();
    let mut report = ResolutionReport::default();

    // Nodes: one per file, one per function.
    let mut accepted: Vec<&FunctionEntity> = Vec::new();
    for parse in &ordered {
        if let Err(err) = graph.add_node(GraphNode::File(parse.file_entity())) {
            warn!(file = %parse.file_path, error = %err, "skipping duplicate file");
            continue;
        }
        for function in &parse.functions {
            match graph.add_node(GraphNode::Function(function.clone())) {
                Ok(_) => accepted.push(function),
                Err(err) => warn!(file = %parse.file_path, error = %err, "skipping function"),
            }
        }
    }

    for function in &accepted {
        if let Err(err) = graph.add_edge(&function.qualified_id, &function.file_path, EdgeKind::DefinedIn, &[]) {
            warn!(error = %err, "dropping defined_in edge");
        }
    }

    // Resolution pass.
    let index = SymbolIndex::build(accepted.iter().copied());
    let files: HashSet<String> = ordered.iter().map(|p| p.file_path.clone()).collect();

    for parse in &ordered {
        let options = ResolveOptions {
            filter_builtins: config.filter_builtins,
            imports: config.resolve_imports.then(|| ImportContext {
                bindings: &parse.imports,
                files: &files,
            }),
        };
        for call in &parse.call_sites {
            report.total += 1;
            let Some(caller) = index.get(&call.caller_id) else {
                report.note_unresolved(&call.callee_name);
                continue;
            };
            let resolution = resolve_call(call, caller, &index, &options);
            match &resolution {
                Resolution::Builtin => {
                    report.builtin += 1;
                    continue;
                }
                Resolution::Unresolved => {
                    report.note_unresolved(&call.callee_name);
                    continue;
                }
                Resolution::Ambiguous(candidates) => {
                    debug!(
                        caller = %call.caller_id,
                        callee = %call.callee_name,
                        line = call.line,
                        candidates = candidates.len(),
                        "ambiguous call resolved to all candidates"
                    );
                    report.ambiguous.push(AmbiguousResolution {
                        caller_id: call.caller_id.clone(),
                        callee_name: call.callee_name.clone(),
                        line: call.line,
                        candidates: candidates.clone(),
                    });
                }
                Resolution::SameFile(_) | Resolution::Unique(_) | Resolution::Imported(_) => {}
            }
            report.resolved += 1;
            for target in resolution.targets() {
                if let Err(err) = graph.add_edge(&call.caller_id, target, EdgeKind::Calls, &[call.line]) {
                    warn!(error = %err, "dropping calls edge");
                }
            }
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        resolved = report.resolved,
        unresolved = report.unresolved,
        builtin = report.builtin,
        "graph built"
    );
    (graph, report)
}
