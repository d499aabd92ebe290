//! Shared, atomically replaced graph snapshots.
//!
//! Readers clone an `Arc` to the current graph and keep using it for as long
//! as they like; publishing a rebuilt graph swaps the pointer and never
//! touches a graph a reader may hold.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::CodeGraph;

#[derive(Debug)]
pub struct GraphHandle {
    current: RwLock<Arc<CodeGraph>>,
    generation: AtomicU64,
}

impl Default for GraphHandle {
    fn default() -> Self {
        Self::new(CodeGraph::new())
    }
}

impl GraphHandle {
    pub fn new(graph: CodeGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
            generation: AtomicU64::new(0),
        }
    }

    /// The graph as of now. Later publishes do not affect the returned value.
    pub fn current(&self) -> Arc<CodeGraph> {
        self.current.read().clone()
    }

    /// Replace the current graph and return the new generation number.
    pub fn publish(&self, graph: Arc<CodeGraph>) -> u64 {
        let mut slot = self.current.write();
        *slot = graph;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of publishes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphNode;
    use crate::models::FileEntity;
    use std::thread;

    fn graph_with_file(path: &str) -> CodeGraph {
        let mut graph = CodeGraph::new();
        graph
            .add_node(GraphNode::File(FileEntity {
                file_path: path.to_string(),
                functions: vec![],
                content_hash: String::new(),
                line_count: 0,
            }))
            .unwrap();
        graph
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let handle = GraphHandle::default();
        let before = handle.current();
        assert!(before.is_empty());
        assert_eq!(handle.generation(), 0);

        assert_eq!(handle.publish(Arc::new(graph_with_file("a.py"))), 1);
        assert!(before.is_empty());
        assert!(handle.current().file("a.py").is_some());
        assert_eq!(handle.generation(), 1);
    }

    #[test]
    fn test_concurrent_readers_see_whole_graphs() {
        let handle = Arc::new(GraphHandle::new(graph_with_file("a.py")));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let graph = handle.current();
                        assert_eq!(graph.node_count(), 1);
                    }
                })
            })
            .collect();
        for i in 0..50 {
            handle.publish(Arc::new(graph_with_file(&format!("f{i}.py"))));
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(handle.generation(), 50);
    }
}
