//! Function-definition extraction from Python syntax trees.
//!
//! Walks every `def` in lexical order, including methods and functions
//! nested inside other functions. Class bodies contribute to the scope path
//! (`Class.method`) but are not entities themselves.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::Node;

use crate::indexer::parser::{end_line, node_text, start_line, ParsedUnit};
use crate::models::{FunctionEntity, FunctionKind};

/// String prefix and opening quote of a Python string literal.
static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^([A-Za-z]*)("""|'''|"|')"#).unwrap());

/// Functions found in one file, plus the syntax-node id of each `def` so
/// later passes can map nodes back to entities.
pub struct ExtractedFunctions {
    pub functions: Vec<FunctionEntity>,
    pub ids_by_node: HashMap<usize, String>,
}

struct Frame {
    name: String,
    is_class: bool,
}

/// Extract every function and method definition in source order.
pub fn extract_functions(unit: &ParsedUnit) -> ExtractedFunctions {
    let mut out = ExtractedFunctions {
        functions: Vec::new(),
        ids_by_node: HashMap::new(),
    };
    let mut scope: Vec<Frame> = Vec::new();
    visit(unit.root(), unit, &mut scope, &mut out);
    out
}

fn visit(node: Node<'_>, unit: &ParsedUnit, scope: &mut Vec<Frame>, out: &mut ExtractedFunctions) {
    match node.kind() {
        "function_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let name = unit.text(name_node).to_string();
            let kind = match scope.last() {
                Some(frame) if frame.is_class => FunctionKind::Method,
                _ => FunctionKind::Function,
            };
            let scope_names: Vec<String> = scope.iter().map(|f| f.name.clone()).collect();
            let params = node.child_by_field_name("parameters");
            let parameters = params
                .map(|p| parameter_names(p, &unit.source))
                .unwrap_or_default();
            let param_types = params
                .map(|p| parameter_annotations(p, &unit.source))
                .unwrap_or_default();
            let return_type = node
                .child_by_field_name("return_type")
                .map(|t| annotation_text(t, &unit.source));
            let body = node.child_by_field_name("body");
            let docstring = body.and_then(|b| docstring(b, &unit.source));

            let entity = FunctionEntity::new(
                &unit.path,
                scope_names,
                &name,
                kind,
                start_line(node),
                end_line(node),
            )
            .with_parameters(parameters)
            .with_annotations(param_types, return_type)
            .with_docstring(docstring)
            .with_async(is_async(node));

            out.ids_by_node.insert(node.id(), entity.qualified_id.clone());
            out.functions.push(entity);

            if let Some(body) = body {
                scope.push(Frame { name, is_class: false });
                visit(body, unit, scope, out);
                scope.pop();
            }
        }
        "class_definition" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| unit.text(n).to_string())
                .unwrap_or_default();
            if let Some(body) = node.child_by_field_name("body") {
                scope.push(Frame { name, is_class: true });
                visit(body, unit, scope, out);
                scope.pop();
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                visit(child, unit, scope, out);
            }
        }
    }
}

fn is_async(def: Node<'_>) -> bool {
    def.child(0).is_some_and(|c| c.kind() == "async")
}

/// Parameter names in declaration order. `*args` and `**kwargs` keep their
/// markers; the bare `*` and `/` separators are not parameters.
pub fn parameter_names(params: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for child in params.named_children(&mut cursor) {
        if let Some(name) = parameter_name(child, source) {
            names.push(name);
        }
    }
    names
}

fn parameter_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "list_splat_pattern" | "dictionary_splat_pattern" | "tuple_pattern" => Some(
            node_text(node, source)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect(),
        ),
        "default_parameter" | "typed_default_parameter" => node
            .child_by_field_name("name")
            .and_then(|n| parameter_name(n, source)),
        "typed_parameter" => node.named_child(0).and_then(|n| parameter_name(n, source)),
        _ => None,
    }
}

/// Annotations of typed parameters, keyed by the name `parameter_names`
/// reports for them.
pub fn parameter_annotations(params: Node<'_>, source: &str) -> BTreeMap<String, String> {
    let mut types = BTreeMap::new();
    let mut cursor = params.walk();
    for child in params.named_children(&mut cursor) {
        if !matches!(child.kind(), "typed_parameter" | "typed_default_parameter") {
            continue;
        }
        let (Some(name), Some(ty)) = (parameter_name(child, source), child.child_by_field_name("type")) else {
            continue;
        };
        types.insert(name, annotation_text(ty, source));
    }
    types
}

/// Annotation source with runs of whitespace collapsed, so a wrapped
/// annotation reads on one line.
fn annotation_text(node: Node<'_>, source: &str) -> String {
    node_text(node, source).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The docstring of a block: its first statement, when that statement is a
/// plain string literal. Byte strings and f-strings do not count.
pub fn docstring(body: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let mut expr = first.named_child(0)?;
    while expr.kind() == "parenthesized_expression" {
        expr = expr.named_child(0)?;
    }
    let raw = match expr.kind() {
        "string" => string_literal_value(node_text(expr, source))?,
        "concatenated_string" => {
            let mut joined = String::new();
            let mut parts = expr.walk();
            for part in expr.named_children(&mut parts) {
                if part.kind() == "string" {
                    joined.push_str(&string_literal_value(node_text(part, source))?);
                }
            }
            joined
        }
        _ => return None,
    };
    Some(clean_docstring(&raw))
}

/// Value of a string literal, or `None` for bytes and f-strings.
fn string_literal_value(literal: &str) -> Option<String> {
    let caps = STRING_LITERAL_RE.captures(literal)?;
    let prefix = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }
    let quote = caps.get(2)?.as_str();
    let start = caps.get(0)?.end();
    let body = literal.get(start..)?;
    let body = body.strip_suffix(quote).unwrap_or(body);
    if prefix.contains('r') {
        Some(body.to_string())
    } else {
        Some(unescape(body))
    }
}

/// Decode the escape sequences of a non-raw string literal. `\N{...}`
/// needs the Unicode name table and is kept as written, as are malformed
/// escapes.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\\' | '\'' | '"' => out.push(escape),
            // line continuation
            '\n' => {}
            '0'..='7' => {
                let mut digits = String::from(escape);
                digits.push_str(&take_digits(&mut chars, 8, 2));
                push_code_point(&mut out, &digits, 8);
            }
            'x' | 'u' | 'U' => {
                let width = match escape {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits = take_digits(&mut chars, 16, width);
                if digits.len() == width {
                    push_code_point(&mut out, &digits, 16);
                } else {
                    out.push('\\');
                    out.push(escape);
                    out.push_str(&digits);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, radix: u32, max: usize) -> String {
    let mut digits = String::new();
    while digits.len() < max {
        match chars.peek() {
            Some(c) if c.is_digit(radix) => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    digits
}

/// Surrogates and out-of-range values become U+FFFD.
fn push_code_point(out: &mut String, digits: &str, radix: u32) {
    let decoded = u32::from_str_radix(digits, radix).ok().and_then(char::from_u32);
    out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
}

/// Normalize docstring indentation the way Python's `inspect.cleandoc` does.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.split('\n').collect();
    // Margin counts characters, not bytes: indentation may mix in
    // multi-byte whitespace such as U+00A0.
    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            cleaned.push(line.trim_start().to_string());
        } else {
            let cut = line.char_indices().nth(margin).map_or(line.len(), |(at, _)| at);
            cleaned.push(line[cut..].trim_end().to_string());
        }
    }
    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
