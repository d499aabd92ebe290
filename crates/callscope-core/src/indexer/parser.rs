//! Tree-sitter wrapper used by the extraction passes.
//!
//! One parser is kept per worker thread. Tree-sitter always produces a
//! tree, so syntax errors are detected by looking for `ERROR` and
//! `MISSING` nodes after the fact.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

use crate::models::FileFailure;

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

/// Parsed source unit: the text and its concrete syntax tree.
pub struct ParsedUnit {
    pub path: String,
    pub source: String,
    pub tree: Tree,
}

impl ParsedUnit {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        node_text(node, &self.source)
    }

    /// Number of lines in the file (0 for an empty file).
    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }
}

fn with_parser<T>(f: impl FnOnce(&mut Parser) -> T) -> Result<T, String> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_python::LANGUAGE.into())
                .map_err(|e| format!("Failed to set language: {e}"))?;
            *slot = Some(parser);
        }
        match slot.as_mut() {
            Some(parser) => Ok(f(parser)),
            None => Err("Python parser unavailable".to_string()),
        }
    })
}

/// Parse Python source, rejecting files that contain syntax errors.
pub fn parse_python(path: &str, source: String) -> Result<ParsedUnit, FileFailure> {
    let tree = with_parser(|parser| parser.parse(source.as_bytes(), None))
        .map_err(|e| FileFailure::read(path, e))?
        .ok_or_else(|| FileFailure::read(path, "parser returned no tree"))?;

    if let Some(bad) = first_error(tree.root_node()) {
        let position = bad.start_position();
        let message = if bad.is_missing() {
            format!("invalid syntax: missing `{}`", bad.kind())
        } else {
            let snippet: String = node_text(bad, &source)
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .chars()
                .take(40)
                .collect();
            if snippet.is_empty() {
                "invalid syntax".to_string()
            } else {
                format!("invalid syntax near `{snippet}`")
            }
        };
        return Err(FileFailure::syntax(
            path,
            message,
            position.row + 1,
            position.column + 1,
        ));
    }

    Ok(ParsedUnit {
        path: path.to_string(),
        source,
        tree,
    })
}

/// Depth-first search for the first `ERROR` or `MISSING` node.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// 1-based first line of a node.
pub fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// 1-based last line of a node, not counting a trailing newline.
pub fn end_line(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    }
}
