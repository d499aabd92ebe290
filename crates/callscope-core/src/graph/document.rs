//! Storage-neutral graph representation: a versioned node list and edge
//! list that round-trips through JSON.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{CallscopeError, CallscopeResult};
use crate::graph::{CodeGraph, EdgeKind, GraphEdge, GraphNode};

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: u32,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphDocument {
    pub fn from_graph(graph: &CodeGraph) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().to_vec(),
        }
    }

    /// Rebuild a graph, enforcing the same invariants the builder does:
    /// unique node ids, no dangling or mistyped edges, no duplicate edges,
    /// and a file node for every function.
    pub fn into_graph(self) -> CallscopeResult<CodeGraph> {
        if self.version != DOCUMENT_VERSION {
            return Err(CallscopeError::Snapshot(format!(
                "unsupported document version {} (expected {DOCUMENT_VERSION})",
                self.version
            )));
        }

        let file_paths: HashSet<&str> = self
            .nodes
            .iter()
            .filter_map(GraphNode::as_file)
            .map(|f| f.file_path.as_str())
            .collect();
        if let Some(orphan) = self
            .nodes
            .iter()
            .filter_map(GraphNode::as_function)
            .find(|f| !file_paths.contains(f.file_path.as_str()))
        {
            return Err(CallscopeError::Snapshot(format!(
                "function `{}` has no file node `{}`",
                orphan.qualified_id, orphan.file_path
            )));
        }

        let mut graph = CodeGraph::new();
        for node in self.nodes {
            graph.add_node(node).map_err(CallscopeError::Snapshot)?;
        }
        for edge in &self.edges {
            let inserted = graph
                .add_edge(&edge.source, &edge.target, edge.kind, &edge.call_lines)
                .map_err(CallscopeError::Snapshot)?;
            if !inserted {
                return Err(CallscopeError::Snapshot(format!(
                    "duplicate {} edge `{}` -> `{}`",
                    edge.kind.as_str(),
                    edge.source,
                    edge.target
                )));
            }
        }
        Ok(graph)
    }

    pub fn to_json(&self) -> CallscopeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> CallscopeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> CallscopeResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn edge_count_of(&self, kind: EdgeKind) -> usize {
        self.edges.iter().filter(|e| e.kind == kind).count()
    }
}

impl CodeGraph {
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument::from_graph(self)
    }

    pub fn from_document(document: GraphDocument) -> CallscopeResult<Self> {
        document.into_graph()
    }

    pub fn to_json(&self) -> CallscopeResult<String> {
        self.to_document().to_json()
    }

    pub fn from_json(raw: &str) -> CallscopeResult<Self> {
        GraphDocument::from_json(raw)?.into_graph()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::graph::builder::build_graph;
    use crate::indexer::pipeline::parse_source;

    fn sample_graph() -> CodeGraph {
        let config = AnalyzerConfig::default();
        let parses = vec![
            parse_source(
                "pkg/a.py",
                "def a(x, *args):\n    \"\"\"Doc.\"\"\"\n    return b() + b()\n\ndef b():\n    pass\n",
                &config,
            )
            .unwrap(),
            parse_source("main.py", "from pkg.a import a\n\na(1)\n", &config).unwrap(),
        ];
        build_graph(&parses, &config).0
    }

    #[test]
    fn test_json_round_trip() {
        let graph = sample_graph();
        let json = graph.to_json().unwrap();
        let restored = CodeGraph::from_json(&json).unwrap();
        assert_eq!(graph, restored);
        assert_eq!(restored.function("pkg/a.py::a@1").unwrap().parameters, vec!["x", "*args"]);
        assert_eq!(
            restored.edge("pkg/a.py::a@1", "pkg/a.py::b@5", EdgeKind::Calls).unwrap().call_lines,
            vec![3]
        );
        assert_eq!(restored.functions_named("b").len(), 1);
    }

    #[test]
    fn test_document_shape() {
        let doc = sample_graph().to_document();
        let value: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["nodes"].as_array().unwrap().iter().any(|n| n["type"] == "file"));
        assert!(value["edges"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["kind"] == "defined_in"));
    }

    #[test]
    fn test_rejects_dangling_edge() {
        let mut doc = sample_graph().to_document();
        doc.edges.push(GraphEdge {
            source: "pkg/a.py::a@1".to_string(),
            target: "nowhere.py::x@1".to_string(),
            kind: EdgeKind::Calls,
            call_lines: vec![1],
        });
        assert!(matches!(doc.into_graph(), Err(CallscopeError::Snapshot(_))));
    }

    #[test]
    fn test_rejects_duplicate_edge() {
        let mut doc = sample_graph().to_document();
        let first = doc.edges[0].clone();
        doc.edges.push(first);
        assert!(matches!(doc.into_graph(), Err(CallscopeError::Snapshot(_))));
    }

    #[test]
    fn test_rejects_orphan_function_and_bad_version() {
        let mut doc = sample_graph().to_document();
        doc.nodes.retain(|n| n.id() != "main.py");
        assert!(doc.into_graph().is_err());

        let mut doc = sample_graph().to_document();
        doc.version = 99;
        assert!(doc.into_graph().is_err());
    }

    #[test]
    fn test_empty_graph_round_trip() {
        let graph = CodeGraph::new();
        let restored = CodeGraph::from_json(&graph.to_json().unwrap()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            GraphDocument::from_json("{\"version\": 1"),
            Err(CallscopeError::Json(_))
        ));
    }
}
