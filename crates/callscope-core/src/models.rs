//! Shared typed models produced by the indexer and consumed by the graph layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved name of the synthetic entity that owns module-level call sites.
pub const MODULE_SCOPE_NAME: &str = "__module__";

// ---------------------------------------------------------------------------
// FunctionEntity
// ---------------------------------------------------------------------------

/// What kind of definition a [`FunctionEntity`] was recovered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// A `def` at module level or nested inside another function.
    Function,
    /// A `def` directly inside a class body.
    Method,
    /// The synthetic `__module__` entity of a file.
    Module,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Function => "function",
            FunctionKind::Method => "method",
            FunctionKind::Module => "module",
        }
    }
}

/// One function or method definition found in a source file.
///
/// Entities are immutable once the parser hands them out; a re-parse
/// produces fresh entities instead of patching old ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntity {
    pub qualified_id: String,
    pub name: String,
    pub file_path: String,
    pub kind: FunctionKind,
    /// Enclosing class and function names, outermost first.
    pub scope: Vec<String>,
    pub parameters: Vec<String>,
    /// Annotation text per annotated parameter, keyed like `parameters`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub param_types: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub docstring: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub line_count: usize,
    pub is_async: bool,
}

impl FunctionEntity {
    /// Build the project-unique identifier for a definition.
    ///
    /// `pkg/mod.py::Outer.inner@12` for a nested def, `pkg/mod.py::main@3`
    /// for a top-level one.
    pub fn qualified_id_for(file_path: &str, scope: &[String], name: &str, start_line: usize) -> String {
        if scope.is_empty() {
            format!("{file_path}::{name}@{start_line}")
        } else {
            format!("{file_path}::{}.{name}@{start_line}", scope.join("."))
        }
    }

    pub fn new(
        file_path: &str,
        scope: Vec<String>,
        name: &str,
        kind: FunctionKind,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        let start_line = start_line.max(1);
        let end_line = end_line.max(start_line);
        Self {
            qualified_id: Self::qualified_id_for(file_path, &scope, name, start_line),
            name: name.to_string(),
            file_path: file_path.to_string(),
            kind,
            scope,
            parameters: Vec::new(),
            param_types: BTreeMap::new(),
            return_type: None,
            docstring: None,
            start_line,
            end_line,
            line_count: end_line - start_line + 1,
            is_async: false,
        }
    }

    /// Id of a file's module-level entity. `<` cannot start a Python
    /// identifier, so no `def` shares it.
    pub fn module_id_for(file_path: &str) -> String {
        format!("{file_path}::<module>")
    }

    /// The synthetic entity standing in for a file's module-level code.
    pub fn module_scope(file_path: &str, line_count: usize) -> Self {
        let mut module = Self::new(
            file_path,
            Vec::new(),
            MODULE_SCOPE_NAME,
            FunctionKind::Module,
            1,
            line_count,
        );
        module.qualified_id = Self::module_id_for(file_path);
        module
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_annotations(mut self, param_types: BTreeMap<String, String>, return_type: Option<String>) -> Self {
        self.param_types = param_types;
        self.return_type = return_type;
        self
    }

    pub fn with_docstring(mut self, docstring: Option<String>) -> Self {
        self.docstring = docstring;
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn is_module_scope(&self) -> bool {
        self.kind == FunctionKind::Module
    }

    /// Name of the class owning this method, if it is one.
    pub fn class_name(&self) -> Option<&str> {
        match self.kind {
            FunctionKind::Method => self.scope.last().map(String::as_str),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{}()", self.name)
    }

    /// `name(a: int, b, *args, **kwargs) -> str`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| match self.param_types.get(p) {
                Some(ty) => format!("{p}: {ty}"),
                None => p.clone(),
            })
            .collect();
        match &self.return_type {
            Some(ret) => format!("{}({}) -> {ret}", self.name, params.join(", ")),
            None => format!("{}({})", self.name, params.join(", ")),
        }
    }

    /// First `max_chars` characters of the docstring, with an ellipsis when cut.
    pub fn docstring_excerpt(&self, max_chars: usize) -> Option<String> {
        let doc = self.docstring.as_deref()?;
        if doc.chars().count() <= max_chars {
            return Some(doc.to_string());
        }
        let mut excerpt: String = doc.chars().take(max_chars).collect();
        excerpt.push('…');
        Some(excerpt)
    }
}

// ---------------------------------------------------------------------------
// CallSite
// ---------------------------------------------------------------------------

/// A call expression found while scanning a function body.
///
/// Call sites are transient: the graph builder consumes them during
/// resolution and does not keep them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_id: String,
    /// Rightmost name of the called expression (`bar` for `foo.bar()`).
    pub callee_name: String,
    /// Plain identifier left of the attribute, e.g. `self` or a module alias.
    pub receiver: Option<String>,
    pub line: usize,
    pub column: usize,
}

// ---------------------------------------------------------------------------
// ImportBinding
// ---------------------------------------------------------------------------

/// A name bound by an `import` / `from ... import` statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    /// Name visible in the importing file (the alias when one is given).
    pub local_name: String,
    /// Dotted module path as written, leading dots kept for relative imports.
    pub module: String,
    /// For `from m import n`, the imported `n`; `None` for `import m`.
    pub imported_name: Option<String>,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// FileEntity
// ---------------------------------------------------------------------------

/// One analyzed source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntity {
    pub file_path: String,
    /// Qualified ids of the functions defined in this file, in source order.
    pub functions: Vec<String>,
    pub content_hash: String,
    pub line_count: usize,
}

// ---------------------------------------------------------------------------
// Per-file parse results
// ---------------------------------------------------------------------------

/// Everything the parser recovered from one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileParse {
    pub file_path: String,
    pub content_hash: String,
    pub line_count: usize,
    pub functions: Vec<FunctionEntity>,
    pub call_sites: Vec<CallSite>,
    pub imports: Vec<ImportBinding>,
}

impl FileParse {
    pub fn file_entity(&self) -> FileEntity {
        FileEntity {
            file_path: self.file_path.clone(),
            functions: self.functions.iter().map(|f| f.qualified_id.clone()).collect(),
            content_hash: self.content_hash.clone(),
            line_count: self.line_count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The file is not valid Python syntax.
    Syntax,
    /// The file could not be read (permissions, encoding, size limit).
    Read,
    /// Extraction panicked on this file; the rest of the batch went on.
    Internal,
}

/// A file that was skipped, with the reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file_path: String,
    pub kind: FailureKind,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl FileFailure {
    pub fn read(file_path: &str, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.to_string(),
            kind: FailureKind::Read,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn internal(file_path: &str, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.to_string(),
            kind: FailureKind::Internal,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn syntax(file_path: &str, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file_path: file_path.to_string(),
            kind: FailureKind::Syntax,
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

impl std::fmt::Display for FileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "{}:{}:{}: {}", self.file_path, line, column, self.message)
            }
            _ => write!(f, "{}: {}", self.file_path, self.message),
        }
    }
}

/// Outcome of parsing one file: its parse, or why it was skipped.
pub type FileOutcome = Result<FileParse, FileFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_id_top_level() {
        let id = FunctionEntity::qualified_id_for("pkg/mod.py", &[], "main", 3);
        assert_eq!(id, "pkg/mod.py::main@3");
    }

    #[test]
    fn test_qualified_id_nested() {
        let scope = vec!["Outer".to_string(), "run".to_string()];
        let id = FunctionEntity::qualified_id_for("a.py", &scope, "inner", 12);
        assert_eq!(id, "a.py::Outer.run.inner@12");
    }

    #[test]
    fn test_line_count_derived() {
        let f = FunctionEntity::new("a.py", vec![], "f", FunctionKind::Function, 4, 9);
        assert_eq!(f.line_count, 6);
        let single = FunctionEntity::new("a.py", vec![], "g", FunctionKind::Function, 4, 4);
        assert_eq!(single.line_count, 1);
    }

    #[test]
    fn test_end_line_never_before_start() {
        let f = FunctionEntity::new("a.py", vec![], "f", FunctionKind::Function, 10, 2);
        assert_eq!(f.end_line, 10);
        assert_eq!(f.line_count, 1);
    }

    #[test]
    fn test_class_name_only_for_methods() {
        let m = FunctionEntity::new(
            "a.py",
            vec!["Greeter".to_string()],
            "hello",
            FunctionKind::Method,
            2,
            3,
        );
        assert_eq!(m.class_name(), Some("Greeter"));
        let f = FunctionEntity::new("a.py", vec!["outer".to_string()], "h", FunctionKind::Function, 2, 3);
        assert_eq!(f.class_name(), None);
    }

    #[test]
    fn test_signature_and_excerpt() {
        let f = FunctionEntity::new("a.py", vec![], "run", FunctionKind::Function, 1, 2)
            .with_parameters(vec!["x".into(), "*args".into(), "**kwargs".into()])
            .with_docstring(Some("Run the thing quickly.".into()));
        assert_eq!(f.signature(), "run(x, *args, **kwargs)");
        assert_eq!(f.display_name(), "run()");
        assert_eq!(f.docstring_excerpt(7).as_deref(), Some("Run the…"));
        assert_eq!(f.docstring_excerpt(100).as_deref(), Some("Run the thing quickly."));
    }

    #[test]
    fn test_module_scope_entity() {
        let m = FunctionEntity::module_scope("a.py", 0);
        assert!(m.is_module_scope());
        assert_eq!(m.qualified_id, "a.py::<module>");
        assert_eq!(m.line_count, 1);
    }

    #[test]
    fn test_module_id_distinct_from_def_named_module() {
        let module = FunctionEntity::module_scope("a.py", 4);
        let def = FunctionEntity::new("a.py", vec![], MODULE_SCOPE_NAME, FunctionKind::Function, 1, 2);
        assert_ne!(module.qualified_id, def.qualified_id);
        assert_eq!(def.qualified_id, "a.py::__module__@1");
    }

    #[test]
    fn test_signature_with_annotations() {
        let mut types = BTreeMap::new();
        types.insert("a".to_string(), "int".to_string());
        types.insert("*args".to_string(), "str".to_string());
        let f = FunctionEntity::new("a.py", vec![], "run", FunctionKind::Function, 1, 2)
            .with_parameters(vec!["a".into(), "b".into(), "*args".into()])
            .with_annotations(types, Some("list[str]".into()));
        assert_eq!(f.signature(), "run(a: int, b, *args: str) -> list[str]");
    }

    #[test]
    fn test_failure_display() {
        let f = FileFailure::syntax("bad.py", "invalid syntax", 3, 7);
        assert_eq!(f.to_string(), "bad.py:3:7: invalid syntax");
        let r = FileFailure::read("x.py", "permission denied");
        assert_eq!(r.to_string(), "x.py: permission denied");
        let i = FileFailure::internal("y.py", "extraction panicked");
        assert_eq!(i.kind, FailureKind::Internal);
        assert_eq!(i.to_string(), "y.py: extraction panicked");
    }
}
