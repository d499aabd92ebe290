//! In-memory call graph with per-node adjacency indexes.
//!
//! Nodes are functions and files, keyed by qualified id and relative path
//! respectively. Edges are typed (`calls`, `defined_in`) and unique per
//! `(source, target, kind)`; every node keeps its own outgoing and incoming
//! edge lists so neighbor queries never scan the full edge set.

pub mod builder;
pub mod document;
pub mod snapshot;

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::{FileEntity, FunctionEntity};

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphNode {
    Function(FunctionEntity),
    File(FileEntity),
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Function(f) => &f.qualified_id,
            GraphNode::File(f) => &f.file_path,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            GraphNode::Function(_) => "function",
            GraphNode::File(_) => "file",
        }
    }

    pub fn as_function(&self) -> Option<&FunctionEntity> {
        match self {
            GraphNode::Function(f) => Some(f),
            GraphNode::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntity> {
        match self {
            GraphNode::File(f) => Some(f),
            GraphNode::Function(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    DefinedIn,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::DefinedIn => "defined_in",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Sorted distinct lines of the call sites behind a `calls` edge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_lines: Vec<usize>,
}

// ---------------------------------------------------------------------------
// CodeGraph
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct CodeGraph {
    nodes: IndexMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_lookup: HashMap<(usize, usize, EdgeKind), usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node, returning its index. Ids must be unique.
    pub fn add_node(&mut self, node: GraphNode) -> Result<usize, String> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(format!("duplicate node id `{id}`"));
        }
        let index = self.nodes.len();
        if let GraphNode::Function(f) = &node {
            if !f.is_module_scope() {
                self.by_name.entry(f.name.clone()).or_default().push(index);
            }
        }
        self.nodes.insert(id, node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        Ok(index)
    }

    /// Insert an edge, or merge its call lines into an existing one.
    ///
    /// Returns `Ok(true)` for a new edge and `Ok(false)` when an edge of the
    /// same kind between the same ordered pair already existed. Fails when
    /// an endpoint is missing or has the wrong node type for `kind`.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        kind: EdgeKind,
        call_lines: &[usize],
    ) -> Result<bool, String> {
        let (Some((si, _, source_node)), Some((ti, _, target_node))) =
            (self.nodes.get_full(source), self.nodes.get_full(target))
        else {
            return Err(format!(
                "{} edge `{source}` -> `{target}` has a missing endpoint",
                kind.as_str()
            ));
        };
        let valid = match kind {
            EdgeKind::Calls => {
                matches!(source_node, GraphNode::Function(_)) && matches!(target_node, GraphNode::Function(_))
            }
            EdgeKind::DefinedIn => {
                matches!(source_node, GraphNode::Function(_)) && matches!(target_node, GraphNode::File(_))
            }
        };
        if !valid {
            return Err(format!(
                "{} edge `{source}` -> `{target}` connects {} to {}",
                kind.as_str(),
                source_node.kind_str(),
                target_node.kind_str()
            ));
        }

        if let Some(&existing) = self.edge_lookup.get(&(si, ti, kind)) {
            let edge = &mut self.edges[existing];
            edge.call_lines.extend_from_slice(call_lines);
            edge.call_lines.sort_unstable();
            edge.call_lines.dedup();
            return Ok(false);
        }

        let mut lines = call_lines.to_vec();
        lines.sort_unstable();
        lines.dedup();
        let edge_index = self.edges.len();
        self.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            call_lines: lines,
        });
        self.edge_lookup.insert((si, ti, kind), edge_index);
        self.outgoing[si].push(edge_index);
        self.incoming[ti].push(edge_index);
        Ok(true)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn function(&self, id: &str) -> Option<&FunctionEntity> {
        self.nodes.get(id).and_then(GraphNode::as_function)
    }

    pub fn file(&self, path: &str) -> Option<&FileEntity> {
        self.nodes.get(path).and_then(GraphNode::as_file)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntity> {
        self.nodes.values().filter_map(GraphNode::as_function)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntity> {
        self.nodes.values().filter_map(GraphNode::as_file)
    }

    pub fn function_count(&self) -> usize {
        self.functions().count()
    }

    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    pub fn edge_count_of(&self, kind: EdgeKind) -> usize {
        self.edges.iter().filter(|e| e.kind == kind).count()
    }

    /// Edges leaving `id` with the given kind.
    pub fn outgoing(&self, id: &str, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        let slots = self
            .nodes
            .get_index_of(id)
            .map(|i| self.outgoing[i].as_slice())
            .unwrap_or(&[]);
        slots
            .iter()
            .map(move |&e| &self.edges[e])
            .filter(move |e| e.kind == kind)
    }

    /// Edges arriving at `id` with the given kind.
    pub fn incoming(&self, id: &str, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        let slots = self
            .nodes
            .get_index_of(id)
            .map(|i| self.incoming[i].as_slice())
            .unwrap_or(&[]);
        slots
            .iter()
            .map(move |&e| &self.edges[e])
            .filter(move |e| e.kind == kind)
    }

    pub fn edge(&self, source: &str, target: &str, kind: EdgeKind) -> Option<&GraphEdge> {
        let si = self.nodes.get_index_of(source)?;
        let ti = self.nodes.get_index_of(target)?;
        self.edge_lookup.get(&(si, ti, kind)).map(|&e| &self.edges[e])
    }

    /// Functions with the given bare name, in insertion order.
    pub fn functions_named(&self, name: &str) -> Vec<&FunctionEntity> {
        self.by_name
            .get(name)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|&i| self.nodes.get_index(i))
                    .filter_map(|(_, node)| node.as_function())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct bare function names, for name search.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    fn edge_set(&self) -> BTreeSet<(&str, &str, EdgeKind, &[usize])> {
        self.edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), e.kind, e.call_lines.as_slice()))
            .collect()
    }
}

/// Two graphs are equal when they hold the same nodes and the same edges,
/// regardless of insertion order.
impl PartialEq for CodeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edge_set() == other.edge_set()
    }
}

impl Eq for CodeGraph {}
