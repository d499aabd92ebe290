//! Function name search.

use serde::Serialize;

use crate::graph::{CodeGraph, EdgeKind};
use crate::query::guards::{clamp_limit, truncate_query, MAX_SEARCH_LIMIT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Prefix,
    Substring,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub qualified_id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    pub signature: String,
    pub match_kind: MatchKind,
    pub caller_count: usize,
    pub callee_count: usize,
}

fn match_kind(name: &str, needle: &str) -> Option<MatchKind> {
    let lowered = name.to_lowercase();
    if lowered == needle {
        Some(MatchKind::Exact)
    } else if lowered.starts_with(needle) {
        Some(MatchKind::Prefix)
    } else if lowered.contains(needle) {
        Some(MatchKind::Substring)
    } else {
        None
    }
}

/// Case-insensitive substring search over bare function names.
///
/// Exact matches rank before prefix matches, prefix before substring; ties
/// break on file path then start line. An empty query matches nothing.
pub fn search_functions(graph: &CodeGraph, query: &str, limit: usize) -> Vec<SearchHit> {
    let needle = truncate_query(query).to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let limit = clamp_limit(limit, MAX_SEARCH_LIMIT);

    let mut hits: Vec<SearchHit> = Vec::new();
    for name in graph.function_names() {
        let Some(kind) = match_kind(name, &needle) else {
            continue;
        };
        for function in graph.functions_named(name) {
            hits.push(SearchHit {
                qualified_id: function.qualified_id.clone(),
                name: function.name.clone(),
                file_path: function.file_path.clone(),
                start_line: function.start_line,
                signature: function.signature(),
                match_kind: kind,
                caller_count: graph.incoming(&function.qualified_id, EdgeKind::Calls).count(),
                callee_count: graph.outgoing(&function.qualified_id, EdgeKind::Calls).count(),
            });
        }
    }
    hits.sort_by(|a, b| {
        a.match_kind
            .cmp(&b.match_kind)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then(a.start_line.cmp(&b.start_line))
            .then_with(|| a.qualified_id.cmp(&b.qualified_id))
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::graph::builder::build_graph;
    use crate::indexer::pipeline::parse_source;

    fn graph() -> CodeGraph {
        let config = AnalyzerConfig::default();
        let parses = vec![
            parse_source(
                "b.py",
                "def load_config(path):\n    load()\n\ndef load():\n    pass\n",
                &config,
            )
            .unwrap(),
            parse_source("a.py", "def reload():\n    load()\n\nload()\n", &config).unwrap(),
        ];
        build_graph(&parses, &config).0
    }

    #[test]
    fn test_ranking() {
        let g = graph();
        let hits = search_functions(&g, "LOAD", 10);
        let summary: Vec<(&str, MatchKind)> = hits.iter().map(|h| (h.qualified_id.as_str(), h.match_kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("b.py::load@4", MatchKind::Exact),
                ("b.py::load_config@1", MatchKind::Prefix),
                ("a.py::reload@1", MatchKind::Substring),
            ]
        );
        assert_eq!(hits[0].caller_count, 3);
        assert_eq!(hits[1].signature, "load_config(path)");
    }

    #[test]
    fn test_module_entity_not_searchable() {
        let g = graph();
        assert!(search_functions(&g, "module", 10).is_empty());
    }

    #[test]
    fn test_limit_and_empty_query() {
        let g = graph();
        assert_eq!(search_functions(&g, "load", 1).len(), 1);
        assert_eq!(search_functions(&g, "load", 0).len(), 1);
        assert!(search_functions(&g, "   ", 10).is_empty());
        assert!(search_functions(&g, "zzz", 10).is_empty());
    }
}
