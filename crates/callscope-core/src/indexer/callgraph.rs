//! Call-site extraction and call resolution.
//!
//! Extraction walks a parsed file and attributes every call expression to
//! the innermost enclosing `def`. Resolution maps a call's bare name onto
//! function entities: same file first, then project-wide by name, linking
//! every candidate when several share the name.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::indexer::imports::hinted_file;
use crate::indexer::parser::ParsedUnit;
use crate::models::{CallSite, FunctionEntity, FunctionKind, ImportBinding};

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

/// Names exported by Python's `builtins` module that are called like
/// functions: builtin functions, builtin types, and exception classes.
pub const PYTHON_BUILTINS: &[&str] = &[
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint",
    "bytearray", "bytes", "callable", "chr", "classmethod", "compile", "complex",
    "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "exit",
    "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass",
    "iter", "len", "list", "locals", "map", "max", "memoryview", "min", "next",
    "object", "oct", "open", "ord", "pow", "print", "property", "quit", "range",
    "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
    "__import__", "ArithmeticError", "AssertionError", "AttributeError",
    "BaseException", "BlockingIOError", "BrokenPipeError", "BufferError",
    "ConnectionError", "EOFError", "Exception", "FileExistsError",
    "FileNotFoundError", "FloatingPointError", "ImportError", "IndexError",
    "InterruptedError", "IsADirectoryError", "KeyError", "KeyboardInterrupt",
    "LookupError", "MemoryError", "ModuleNotFoundError", "NameError",
    "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError",
    "PermissionError", "RecursionError", "ReferenceError", "RuntimeError",
    "StopAsyncIteration", "StopIteration", "SyntaxError", "SystemExit",
    "TimeoutError", "TypeError", "UnboundLocalError", "UnicodeDecodeError",
    "UnicodeEncodeError", "UnicodeError", "ValueError", "Warning",
    "DeprecationWarning", "RuntimeWarning", "UserWarning", "ZeroDivisionError",
];

pub fn is_builtin(name: &str) -> bool {
    PYTHON_BUILTINS.contains(&name)
}

// ---------------------------------------------------------------------------
// Call-site extraction
// ---------------------------------------------------------------------------

/// Call sites found in one file. `module_entity` is set when module-level
/// calls were kept and attributed to the synthetic `__module__` entity.
pub struct ExtractedCalls {
    pub call_sites: Vec<CallSite>,
    pub module_entity: Option<FunctionEntity>,
}

struct CallWalker<'u> {
    unit: &'u ParsedUnit,
    ids_by_node: &'u HashMap<usize, String>,
    module_scope: bool,
    module_id: Option<String>,
    call_sites: Vec<CallSite>,
}

/// Extract call sites in source order.
///
/// Calls in decorators, parameter defaults, return annotations and class
/// headers run in the enclosing scope and are attributed there. Lambdas,
/// comprehensions and class bodies do not open a new owner.
pub fn extract_call_sites(
    unit: &ParsedUnit,
    ids_by_node: &HashMap<usize, String>,
    module_scope: bool,
) -> ExtractedCalls {
    let mut walker = CallWalker {
        unit,
        ids_by_node,
        module_scope,
        module_id: None,
        call_sites: Vec::new(),
    };
    walker.visit(unit.root(), None);

    let module_entity = walker
        .module_id
        .is_some()
        .then(|| FunctionEntity::module_scope(&unit.path, unit.line_count()));
    ExtractedCalls {
        call_sites: walker.call_sites,
        module_entity,
    }
}

impl CallWalker<'_> {
    fn visit(&mut self, node: Node<'_>, owner: Option<&str>) {
        match node.kind() {
            "function_definition" => {
                for field in ["parameters", "return_type"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.visit(child, owner);
                    }
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let ids = self.ids_by_node;
                    match ids.get(&node.id()) {
                        Some(id) => self.visit(body, Some(id.as_str())),
                        None => self.visit(body, owner),
                    }
                }
                return;
            }
            "call" => self.record(node, owner),
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, owner);
        }
    }

    fn record(&mut self, call: Node<'_>, owner: Option<&str>) {
        let Some((callee_name, receiver)) = callee_of(call, self.unit) else {
            return;
        };
        let unit = self.unit;
        let caller_id = match owner {
            Some(id) => id.to_string(),
            None if self.module_scope => self
                .module_id
                .get_or_insert_with(|| FunctionEntity::module_id_for(&unit.path))
                .clone(),
            None => return,
        };
        let position = call.start_position();
        self.call_sites.push(CallSite {
            caller_id,
            callee_name,
            receiver,
            line: position.row + 1,
            column: position.column + 1,
        });
    }
}

/// Bare callee name and plain receiver of a call expression. Calls through
/// subscripts, other calls or parenthesized expressions have no
/// recoverable name.
fn callee_of(call: Node<'_>, unit: &ParsedUnit) -> Option<(String, Option<String>)> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some((unit.text(function).to_string(), None)),
        "attribute" => {
            let name = unit.text(function.child_by_field_name("attribute")?).to_string();
            let receiver = function.child_by_field_name("object").and_then(|object| {
                match object.kind() {
                    "identifier" => Some(unit.text(object).to_string()),
                    // super().method()
                    "call" => object
                        .child_by_field_name("function")
                        .filter(|f| f.kind() == "identifier" && unit.text(*f) == "super")
                        .map(|_| "super".to_string()),
                    _ => None,
                }
            });
            Some((name, receiver))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Symbol index
// ---------------------------------------------------------------------------

/// Project-wide lookup tables over every resolvable function entity.
///
/// Synthetic module entities are indexed by id but never by name, so they
/// can own call sites without ever being a call target.
pub struct SymbolIndex<'a> {
    by_id: HashMap<&'a str, &'a FunctionEntity>,
    by_name: HashMap<&'a str, Vec<&'a FunctionEntity>>,
}

impl<'a> SymbolIndex<'a> {
    pub fn build<I>(functions: I) -> Self
    where
        I: IntoIterator<Item = &'a FunctionEntity>,
    {
        let mut by_id = HashMap::new();
        let mut by_name: HashMap<&'a str, Vec<&'a FunctionEntity>> = HashMap::new();
        for function in functions {
            by_id.insert(function.qualified_id.as_str(), function);
            if !function.is_module_scope() {
                by_name.entry(function.name.as_str()).or_default().push(function);
            }
        }
        for candidates in by_name.values_mut() {
            candidates.sort_by(|a, b| {
                a.file_path
                    .cmp(&b.file_path)
                    .then(a.start_line.cmp(&b.start_line))
                    .then(a.qualified_id.cmp(&b.qualified_id))
            });
        }
        Self { by_id, by_name }
    }

    pub fn get(&self, id: &str) -> Option<&'a FunctionEntity> {
        self.by_id.get(id).copied()
    }

    /// Every function with the given bare name, ordered by file and line.
    pub fn named(&self, name: &str) -> &[&'a FunctionEntity] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How one call site was resolved. Target lists hold qualified ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Matched definitions in the caller's own file.
    SameFile(Vec<String>),
    /// Exactly one definition with that name in the project.
    Unique(String),
    /// Several candidates, narrowed to the file the caller imports it from.
    Imported(Vec<String>),
    /// Several candidates with no way to choose; all of them are linked.
    Ambiguous(Vec<String>),
    /// No candidate, and the name is a Python builtin.
    Builtin,
    Unresolved,
}

impl Resolution {
    pub fn targets(&self) -> &[String] {
        match self {
            Resolution::SameFile(ids) | Resolution::Imported(ids) | Resolution::Ambiguous(ids) => ids,
            Resolution::Unique(id) => std::slice::from_ref(id),
            Resolution::Builtin | Resolution::Unresolved => &[],
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.targets().is_empty()
    }
}

/// Import context of the caller's file, used for opt-in narrowing.
pub struct ImportContext<'a> {
    pub bindings: &'a [ImportBinding],
    pub files: &'a HashSet<String>,
}

pub struct ResolveOptions<'a> {
    pub filter_builtins: bool,
    pub imports: Option<ImportContext<'a>>,
}

fn ids(functions: &[&FunctionEntity]) -> Vec<String> {
    functions.iter().map(|f| f.qualified_id.clone()).collect()
}

/// Resolve a call site against the project index.
pub fn resolve_call(
    call: &CallSite,
    caller: &FunctionEntity,
    index: &SymbolIndex<'_>,
    options: &ResolveOptions<'_>,
) -> Resolution {
    let matches = index.named(&call.callee_name);

    let same_file: Vec<&FunctionEntity> = matches
        .iter()
        .copied()
        .filter(|f| f.file_path == caller.file_path)
        .collect();
    if !same_file.is_empty() {
        let via_instance = matches!(call.receiver.as_deref(), Some("self" | "cls"));
        if via_instance && caller.kind == FunctionKind::Method {
            let class_scoped: Vec<&FunctionEntity> = same_file
                .iter()
                .copied()
                .filter(|f| f.kind == FunctionKind::Method && f.scope == caller.scope)
                .collect();
            if !class_scoped.is_empty() {
                return Resolution::SameFile(ids(&class_scoped));
            }
        }
        return Resolution::SameFile(ids(&same_file));
    }

    match matches {
        [] => {
            if options.filter_builtins && call.receiver.is_none() && is_builtin(&call.callee_name) {
                Resolution::Builtin
            } else {
                Resolution::Unresolved
            }
        }
        [only] => Resolution::Unique(only.qualified_id.clone()),
        _ => {
            if let Some(ctx) = &options.imports {
                if let Some(file) = hinted_file(call, &caller.file_path, ctx.bindings, ctx.files) {
                    let narrowed: Vec<&FunctionEntity> =
                        matches.iter().copied().filter(|f| f.file_path == file).collect();
                    if !narrowed.is_empty() {
                        return Resolution::Imported(ids(&narrowed));
                    }
                }
            }
            Resolution::Ambiguous(ids(matches))
        }
    }
}
