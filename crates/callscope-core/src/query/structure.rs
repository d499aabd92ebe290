//! Per-file views of the graph and the plain-text structure map.

use serde::Serialize;

use crate::graph::{CodeGraph, EdgeKind};
use crate::models::FunctionEntity;
use crate::query::guards::clamp_budget;

fn approx_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() as f64 / 3.5).max(1.0) as usize
}

/// Functions defined in `path`, ordered by start line. Unknown paths yield
/// an empty list.
pub fn functions_in_file<'g>(graph: &'g CodeGraph, path: &str) -> Vec<&'g FunctionEntity> {
    if graph.file(path).is_none() {
        return Vec::new();
    }
    let mut functions: Vec<&FunctionEntity> = graph
        .incoming(path, EdgeKind::DefinedIn)
        .filter_map(|edge| graph.function(&edge.source))
        .collect();
    functions.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then_with(|| a.qualified_id.cmp(&b.qualified_id))
    });
    functions
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub file_path: String,
    pub function_count: usize,
    pub line_count: usize,
}

/// One row per parsed file, ordered by path. The module entity is not
/// counted as a function.
pub fn file_summary(graph: &CodeGraph) -> Vec<FileSummary> {
    let mut rows: Vec<FileSummary> = graph
        .files()
        .map(|file| FileSummary {
            file_path: file.file_path.clone(),
            function_count: graph
                .incoming(&file.file_path, EdgeKind::DefinedIn)
                .filter_map(|edge| graph.function(&edge.source))
                .filter(|f| !f.is_module_scope())
                .count(),
            line_count: file.line_count,
        })
        .collect();
    rows.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    rows
}

/// Indented outline of every file and its functions, cut off once the
/// estimated token count would exceed `token_budget`.
pub fn render_structure(graph: &CodeGraph, token_budget: usize, include_signatures: bool) -> String {
    let budget = clamp_budget(token_budget);

    let mut lines: Vec<String> = Vec::new();
    for summary in file_summary(graph) {
        lines.push(format!("{}  ({} lines)", summary.file_path, summary.line_count));
        for function in functions_in_file(graph, &summary.file_path) {
            if function.is_module_scope() {
                continue;
            }
            let indent = "  ".repeat(function.scope.len() + 1);
            let detail = if include_signatures {
                function.signature()
            } else {
                function.display_name()
            };
            let callers = graph.incoming(&function.qualified_id, EdgeKind::Calls).count();
            lines.push(format!(
                "{indent}{} {detail}  [L{}, callers:{callers}]",
                function.kind.as_str(),
                function.start_line
            ));
        }
    }

    let mut output_lines: Vec<String> = Vec::new();
    let mut used_tokens = 0usize;
    for line in lines {
        let line_tokens = approx_tokens(&line);
        if used_tokens + line_tokens > budget {
            break;
        }
        used_tokens += line_tokens;
        output_lines.push(line);
    }
    output_lines.join("\n")
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
class Store:
    def get(self, key):
        return self.lookup(key)

    def lookup(self, key):
        pass

def main():
    Store().get(1)

main()
";
        let parses = vec![
            parse_source("pkg/store.py", src, &config).unwrap(),
            parse_source("app.py", "def run():\n    pass\n", &config).unwrap(),
        ];
        build_graph(&parses, &config).0
    }

    #[test]
    fn test_functions_in_file_ordered_by_line() {
        let g = graph();
        let names: Vec<&str> = functions_in_file(&g, "pkg/store.py")
            .iter()
            .map(|f| f.qualified_id.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "pkg/store.py::<module>",
                "pkg/store.py::Store.get@2",
                "pkg/store.py::Store.lookup@5",
                "pkg/store.py::main@8",
            ]
        );
        assert!(functions_in_file(&g, "missing.py").is_empty());
        assert!(functions_in_file(&g, "pkg/store.py::main@8").is_empty());
    }

    #[test]
    fn test_file_summary() {
        let g = graph();
        assert_eq!(
            file_summary(&g),
            vec![
                FileSummary {
                    file_path: "app.py".to_string(),
                    function_count: 1,
                    line_count: 2,
                },
                FileSummary {
                    file_path: "pkg/store.py".to_string(),
                    function_count: 3,
                    line_count: 11,
                },
            ]
        );
    }

    #[test]
    fn test_render_structure() {
        let g = graph();
        let text = render_structure(&g, 4000, true);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "app.py  (2 lines)");
        assert!(lines.contains(&"    method get(self, key)  [L2, callers:1]"));
        assert!(lines.contains(&"  function main()  [L8, callers:1]"));
        assert!(!text.contains("__module__"));

        let short = render_structure(&g, 5, false);
        assert_eq!(short, "app.py  (2 lines)");
    }
}
