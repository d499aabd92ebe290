//! Caller and callee traversal over the call graph.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::graph::{CodeGraph, EdgeKind};
use crate::models::FunctionEntity;
use crate::query::guards::{
    adaptive_graph_cap, clamp_depth, truncate_query, MAX_CHAIN_DEPTH, MAX_GRAPH_EDGES, MAX_GRAPH_VISITED,
    MAX_REFERENCE_DEPTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Callers,
    Callees,
}

/// One function reached by a reference walk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferenceHit {
    pub qualified_id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    /// Lines of the call sites on the edge that reached this function.
    pub call_lines: Vec<usize>,
    pub depth: usize,
}

impl ReferenceHit {
    fn new(function: &FunctionEntity, call_lines: &[usize], depth: usize) -> Self {
        Self {
            qualified_id: function.qualified_id.clone(),
            name: function.name.clone(),
            file_path: function.file_path.clone(),
            start_line: function.start_line,
            call_lines: call_lines.to_vec(),
            depth,
        }
    }
}

/// Qualified id match first; otherwise every function with that bare name,
/// ordered by file and line.
pub fn resolve_function_ids(graph: &CodeGraph, name: &str) -> Vec<String> {
    let query = truncate_query(name);
    if graph.function(&query).is_some() {
        return vec![query];
    }
    let mut matches: Vec<&FunctionEntity> = graph.functions_named(&query);
    matches.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.start_line.cmp(&b.start_line))
    });
    matches.into_iter().map(|f| f.qualified_id.clone()).collect()
}

fn neighbors<'g>(graph: &'g CodeGraph, id: &str, direction: Direction) -> Vec<(&'g str, &'g [usize])> {
    match direction {
        Direction::Callers => graph
            .incoming(id, EdgeKind::Calls)
            .map(|e| (e.source.as_str(), e.call_lines.as_slice()))
            .collect(),
        Direction::Callees => graph
            .outgoing(id, EdgeKind::Calls)
            .map(|e| (e.target.as_str(), e.call_lines.as_slice()))
            .collect(),
    }
}

/// Direct callers of a function, in edge insertion order.
pub fn callers(graph: &CodeGraph, id: &str) -> Vec<ReferenceHit> {
    direct(graph, id, Direction::Callers)
}

/// Direct callees of a function, in edge insertion order.
pub fn callees(graph: &CodeGraph, id: &str) -> Vec<ReferenceHit> {
    direct(graph, id, Direction::Callees)
}

fn direct(graph: &CodeGraph, id: &str, direction: Direction) -> Vec<ReferenceHit> {
    neighbors(graph, id, direction)
        .into_iter()
        .filter_map(|(next, lines)| graph.function(next).map(|f| ReferenceHit::new(f, lines, 1)))
        .collect()
}

/// Breadth-first walk from `start` up to `depth` hops, each function
/// reported once at the depth it was first reached. The walk stops early
/// once the visited or edge caps are hit.
pub fn walk_references(graph: &CodeGraph, start: &str, direction: Direction, depth: usize) -> Vec<ReferenceHit> {
    if graph.function(start).is_none() {
        return Vec::new();
    }
    let max_depth = clamp_depth(depth, MAX_REFERENCE_DEPTH);
    let max_visited = adaptive_graph_cap(graph.function_count(), MAX_GRAPH_VISITED, 200);
    let max_edges = 256usize.max(MAX_GRAPH_EDGES.min(max_visited * 2));

    let mut results: Vec<ReferenceHit> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(start);
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    queue.push_back((start, 0));

    while let Some((current, level)) = queue.pop_front() {
        if results.len() >= max_edges || visited.len() >= max_visited {
            break;
        }
        if level >= max_depth {
            continue;
        }
        for (next, lines) in neighbors(graph, current, direction) {
            if results.len() >= max_edges || visited.len() >= max_visited {
                break;
            }
            if !visited.insert(next) {
                continue;
            }
            if let Some(function) = graph.function(next) {
                results.push(ReferenceHit::new(function, lines, level + 1));
            }
            queue.push_back((next, level + 1));
        }
    }
    results
}

/// One `caller -> callee` step of a call chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub caller: String,
    pub callee: String,
    pub depth: usize,
}

/// Every call edge reachable downstream of `start` within `depth` hops, in
/// breadth-first order. Each edge appears once, so cycles terminate.
pub fn call_chain(graph: &CodeGraph, start: &str, depth: usize) -> Vec<ChainLink> {
    if graph.function(start).is_none() {
        return Vec::new();
    }
    let max_depth = clamp_depth(depth, MAX_CHAIN_DEPTH);
    let mut links = Vec::new();
    let mut expanded: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    queue.push_back((start, 0));

    while let Some((current, level)) = queue.pop_front() {
        if level >= max_depth || !expanded.insert(current) {
            continue;
        }
        for edge in graph.outgoing(current, EdgeKind::Calls) {
            if links.len() >= MAX_GRAPH_EDGES {
                return links;
            }
            links.push(ChainLink {
                caller: edge.source.clone(),
                callee: edge.target.clone(),
                depth: level + 1,
            });
            queue.push_back((edge.target.as_str(), level + 1));
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::graph::builder::build_graph;
    use crate::indexer::pipeline::parse_source;

    fn graph() -> CodeGraph {
        let config = AnalyzerConfig::default();
        let src = "\
def entry():
    load()
    save()

def load():
    parse()

def parse():
    load()

def save():
    pass
";
        let parses = vec![
            parse_source("app.py", src, &config).unwrap(),
            parse_source("other.py", "def save():\n    pass\n\ndef cli():\n    entry()\n", &config).unwrap(),
        ];
        build_graph(&parses, &config).0
    }

    fn ids(hits: &[ReferenceHit]) -> Vec<&str> {
        hits.iter().map(|h| h.qualified_id.as_str()).collect()
    }

    #[test]
    fn test_direct_callers_and_callees() {
        let g = graph();
        assert_eq!(
            ids(&callees(&g, "app.py::entry@1")),
            vec!["app.py::load@5", "app.py::save@11"]
        );
        let hits = callers(&g, "app.py::load@5");
        assert_eq!(ids(&hits), vec!["app.py::entry@1", "app.py::parse@8"]);
        assert_eq!(hits[0].call_lines, vec![2]);
        assert!(callers(&g, "missing").is_empty());
    }

    #[test]
    fn test_walk_callees_with_depth() {
        let g = graph();
        let hits = walk_references(&g, "other.py::cli@4", Direction::Callees, 3);
        let summary: Vec<(&str, usize)> = hits.iter().map(|h| (h.qualified_id.as_str(), h.depth)).collect();
        assert_eq!(
            summary,
            vec![
                ("app.py::entry@1", 1),
                ("app.py::load@5", 2),
                ("app.py::save@11", 2),
                ("app.py::parse@8", 3),
            ]
        );
        let shallow = walk_references(&g, "other.py::cli@4", Direction::Callees, 1);
        assert_eq!(shallow.len(), 1);
    }

    #[test]
    fn test_walk_callers_handles_cycles() {
        let g = graph();
        let hits = walk_references(&g, "app.py::parse@8", Direction::Callers, 6);
        assert_eq!(
            ids(&hits),
            vec!["app.py::load@5", "app.py::entry@1", "other.py::cli@4"]
        );
    }

    #[test]
    fn test_call_chain() {
        let g = graph();
        let chain = call_chain(&g, "app.py::entry@1", 5);
        let pairs: Vec<(&str, &str)> = chain.iter().map(|l| (l.caller.as_str(), l.callee.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("app.py::entry@1", "app.py::load@5"),
                ("app.py::entry@1", "app.py::save@11"),
                ("app.py::load@5", "app.py::parse@8"),
                ("app.py::parse@8", "app.py::load@5"),
            ]
        );
        assert_eq!(call_chain(&g, "app.py::entry@1", 1).len(), 2);
        assert!(call_chain(&g, "nope", 3).is_empty());
    }

    #[test]
    fn test_resolve_function_ids() {
        let g = graph();
        assert_eq!(resolve_function_ids(&g, "app.py::load@5"), vec!["app.py::load@5"]);
        assert_eq!(
            resolve_function_ids(&g, " save "),
            vec!["app.py::save@11", "other.py::save@1"]
        );
        assert!(resolve_function_ids(&g, "absent").is_empty());
    }
}
