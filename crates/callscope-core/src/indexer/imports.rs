//! Import bindings and module-to-file resolution for Python sources.

use std::collections::HashSet;
use std::path::Path;

use tree_sitter::Node;

use crate::indexer::parser::{node_text, start_line, ParsedUnit};
use crate::models::{CallSite, ImportBinding};

/// Collect every `import` and `from ... import` binding in the file,
/// including function-local imports, in source order. Wildcard imports bind
/// no name and are skipped.
pub fn extract_imports(unit: &ParsedUnit) -> Vec<ImportBinding> {
    let mut bindings = Vec::new();
    collect(unit.root(), &unit.source, &mut bindings);
    bindings
}

fn collect(node: Node<'_>, source: &str, out: &mut Vec<ImportBinding>) {
    match node.kind() {
        "import_statement" => {
            let line = start_line(node);
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                match name.kind() {
                    "dotted_name" => {
                        let module = node_text(name, source).to_string();
                        // `import a.b` binds `a`
                        let local = module.split('.').next().unwrap_or_default().to_string();
                        out.push(ImportBinding {
                            local_name: local,
                            module,
                            imported_name: None,
                            line,
                        });
                    }
                    "aliased_import" => {
                        let module = name
                            .child_by_field_name("name")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_default();
                        let Some(alias) = name.child_by_field_name("alias") else {
                            continue;
                        };
                        out.push(ImportBinding {
                            local_name: node_text(alias, source).to_string(),
                            module,
                            imported_name: None,
                            line,
                        });
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            let line = start_line(node);
            let Some(module_node) = node.child_by_field_name("module_name") else {
                return;
            };
            let module = node_text(module_node, source).to_string();
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let (imported, local) = match name.kind() {
                    "dotted_name" => {
                        let text = node_text(name, source).to_string();
                        (text.clone(), text)
                    }
                    "aliased_import" => {
                        let imported = name
                            .child_by_field_name("name")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_default();
                        let local = name
                            .child_by_field_name("alias")
                            .map(|n| node_text(n, source).to_string())
                            .unwrap_or_else(|| imported.clone());
                        (imported, local)
                    }
                    _ => continue,
                };
                out.push(ImportBinding {
                    local_name: local,
                    module: module.clone(),
                    imported_name: Some(imported),
                    line,
                });
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect(child, source, out);
            }
        }
    }
}

/// Map a dotted (possibly relative) module path to a project file.
///
/// `pkg.util` resolves to `pkg/util.py` or `pkg/util/__init__.py`. Relative
/// modules are resolved against the importing file's directory, one extra
/// parent per leading dot beyond the first. When no exact path exists, a
/// unique file whose path ends with the module path is accepted, which
/// covers projects rooted above a `src/` directory.
pub fn resolve_module(source_path: &str, module: &str, files: &HashSet<String>) -> Option<String> {
    if module.is_empty() {
        return None;
    }
    let relative = module.starts_with('.');
    let base = if relative {
        let levels = module.chars().take_while(|&c| c == '.').count();
        let suffix = &module[levels..];
        let mut base_dir = Path::new(source_path)
            .parent()
            .unwrap_or(Path::new(""))
            .to_path_buf();
        for _ in 0..levels.saturating_sub(1) {
            base_dir = base_dir.parent().unwrap_or(Path::new("")).to_path_buf();
        }
        if !suffix.is_empty() {
            base_dir = base_dir.join(suffix.replace('.', "/"));
        }
        base_dir.to_string_lossy().replace('\\', "/")
    } else {
        module.replace('.', "/")
    };

    let candidates = if base.is_empty() {
        vec!["__init__.py".to_string()]
    } else {
        vec![format!("{base}.py"), format!("{base}/__init__.py")]
    };
    if let Some(found) = candidates.iter().find(|c| files.contains(c.as_str())) {
        return Some(found.clone());
    }
    if relative || base.is_empty() {
        return None;
    }

    for candidate in &candidates {
        let needle = format!("/{candidate}");
        let mut matches = files.iter().filter(|f| f.ends_with(&needle));
        if let (Some(only), None) = (matches.next(), matches.next()) {
            return Some(only.clone());
        }
    }
    None
}

fn join_module(module: &str, name: &str) -> String {
    if module.ends_with('.') {
        format!("{module}{name}")
    } else {
        format!("{module}.{name}")
    }
}

/// The project file a call most likely targets, judging only by the caller
/// file's imports.
///
/// - `helper()` with `from pkg.util import helper` points at `pkg/util.py`.
/// - `util.helper()` with `from pkg import util` points at `pkg/util.py`.
/// - `u.helper()` with `import pkg.util as u` points at `pkg/util.py`.
///
/// When a name is bound more than once the last binding wins.
pub fn hinted_file(
    call: &CallSite,
    source_path: &str,
    bindings: &[ImportBinding],
    files: &HashSet<String>,
) -> Option<String> {
    match call.receiver.as_deref() {
        Some(receiver) => {
            let binding = bindings.iter().rev().find(|b| b.local_name == receiver)?;
            match binding.imported_name.as_deref() {
                Some(imported) => {
                    resolve_module(source_path, &join_module(&binding.module, imported), files)
                }
                None => resolve_module(source_path, &binding.module, files),
            }
        }
        None => {
            let binding = bindings
                .iter()
                .rev()
                .find(|b| b.local_name == call.callee_name && b.imported_name.is_some())?;
            resolve_module(source_path, &binding.module, files)
        }
    }
}
