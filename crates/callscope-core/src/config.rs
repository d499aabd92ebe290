//! Analyzer configuration: defaults, JSON file loading, and env overrides.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{CallscopeError, CallscopeResult};

/// Directory names that are never descended into by default.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".tox",
    ".nox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "node_modules",
    "site-packages",
    ".eggs",
    "build",
    "dist",
];

pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Path-segment names skipped while walking the project.
    pub skip_dirs: BTreeSet<String>,
    /// Source extensions, without the dot.
    pub extensions: Vec<String>,
    pub respect_gitignore: bool,
    /// Upper bound on parsing threads.
    pub workers: usize,
    /// Count unresolved calls to Python builtins separately from unresolved ones.
    pub filter_builtins: bool,
    /// Attach module-level call sites to a synthetic `__module__` entity.
    pub module_scope: bool,
    /// Narrow ambiguous candidates using the caller file's imports.
    pub resolve_imports: bool,
    pub max_file_bytes: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|d| d.to_string()).collect(),
            extensions: vec!["py".to_string()],
            respect_gitignore: false,
            workers: num_cpus::get().max(1),
            filter_builtins: true,
            module_scope: true,
            resolve_imports: false,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl AnalyzerConfig {
    /// Load a config from a JSON file; missing keys fall back to defaults.
    pub fn from_json_file(path: &Path) -> CallscopeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validated()
    }

    /// Apply `CALLSCOPE_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> CallscopeResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// injectable lookup, so overrides can be tested without touching the
    /// process environment.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> CallscopeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CALLSCOPE_WORKERS") {
            self.workers = raw.trim().parse::<usize>().map_err(|_| {
                CallscopeError::Config(format!("CALLSCOPE_WORKERS is not a number: {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup("CALLSCOPE_SKIP_DIRS") {
            self.skip_dirs = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("CALLSCOPE_FILTER_BUILTINS") {
            self.filter_builtins = parse_flag("CALLSCOPE_FILTER_BUILTINS", &raw)?;
        }
        if let Some(raw) = lookup("CALLSCOPE_MODULE_SCOPE") {
            self.module_scope = parse_flag("CALLSCOPE_MODULE_SCOPE", &raw)?;
        }
        if let Some(raw) = lookup("CALLSCOPE_RESOLVE_IMPORTS") {
            self.resolve_imports = parse_flag("CALLSCOPE_RESOLVE_IMPORTS", &raw)?;
        }
        if let Some(raw) = lookup("CALLSCOPE_RESPECT_GITIGNORE") {
            self.respect_gitignore = parse_flag("CALLSCOPE_RESPECT_GITIGNORE", &raw)?;
        }
        self.validated()
    }

    fn validated(mut self) -> CallscopeResult<Self> {
        if self.workers == 0 {
            self.workers = 1;
        }
        self.extensions = self
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if self.extensions.is_empty() {
            return Err(CallscopeError::Config(
                "at least one source extension is required".to_string(),
            ));
        }
        Ok(self)
    }

    /// SHA-256 over every setting that changes which files are analyzed
    /// or which edges the graph gets. `workers` is left out: thread count
    /// never changes the result.
    pub fn graph_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for dir in &self.skip_dirs {
            hasher.update(dir.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([1u8]);
        let mut extensions: Vec<&String> = self.extensions.iter().collect();
        extensions.sort();
        for ext in extensions {
            hasher.update(ext.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([1u8]);
        hasher.update([
            u8::from(self.respect_gitignore),
            u8::from(self.filter_builtins),
            u8::from(self.module_scope),
            u8::from(self.resolve_imports),
        ]);
        hasher.update(self.max_file_bytes.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_skipped_dir(&self, name: &str) -> bool {
        self.skip_dirs.contains(name)
    }

    pub fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

fn parse_flag(key: &str, raw: &str) -> CallscopeResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CallscopeError::Config(format!(
            "{key} expects a boolean, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert!(config.is_skipped_dir(".git"));
        assert!(config.is_skipped_dir("venv"));
        assert!(!config.is_skipped_dir("src"));
        assert!(config.filter_builtins);
        assert!(config.module_scope);
        assert!(!config.resolve_imports);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_extension_match() {
        let config = AnalyzerConfig::default();
        assert!(config.has_source_extension(Path::new("pkg/mod.py")));
        assert!(config.has_source_extension(Path::new("pkg/MOD.PY")));
        assert!(!config.has_source_extension(Path::new("pkg/mod.pyc")));
        assert!(!config.has_source_extension(Path::new("Makefile")));
    }

    #[test]
    fn test_env_overrides() {
        let config = AnalyzerConfig::default()
            .with_overrides_from(env(&[
                ("CALLSCOPE_WORKERS", "3"),
                ("CALLSCOPE_SKIP_DIRS", "vendor, third_party,"),
                ("CALLSCOPE_FILTER_BUILTINS", "off"),
                ("CALLSCOPE_RESOLVE_IMPORTS", "YES"),
            ]))
            .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.skip_dirs.len(), 2);
        assert!(config.is_skipped_dir("vendor"));
        assert!(config.is_skipped_dir("third_party"));
        assert!(!config.is_skipped_dir(".git"));
        assert!(!config.filter_builtins);
        assert!(config.resolve_imports);
    }

    #[test]
    fn test_env_zero_workers_clamped() {
        let config = AnalyzerConfig::default()
            .with_overrides_from(env(&[("CALLSCOPE_WORKERS", "0")]))
            .unwrap();
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_env_bad_values_rejected() {
        let err = AnalyzerConfig::default()
            .with_overrides_from(env(&[("CALLSCOPE_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, CallscopeError::Config(_)));

        let err = AnalyzerConfig::default()
            .with_overrides_from(env(&[("CALLSCOPE_MODULE_SCOPE", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("CALLSCOPE_MODULE_SCOPE"));
    }

    #[test]
    fn test_json_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callscope.json");
        std::fs::write(&path, r#"{"workers": 2, "extensions": [".py", "PYW"]}"#).unwrap();
        let config = AnalyzerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.extensions, vec!["py".to_string(), "pyw".to_string()]);
        assert!(config.is_skipped_dir(".git"));
    }

    #[test]
    fn test_json_file_rejects_empty_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callscope.json");
        std::fs::write(&path, r#"{"extensions": []}"#).unwrap();
        assert!(AnalyzerConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_graph_digest_tracks_graph_settings() {
        let base = AnalyzerConfig::default();
        let more_workers = AnalyzerConfig {
            workers: base.workers + 7,
            ..base.clone()
        };
        assert_eq!(base.graph_digest(), more_workers.graph_digest());

        let variants = [
            AnalyzerConfig {
                resolve_imports: true,
                ..base.clone()
            },
            AnalyzerConfig {
                filter_builtins: false,
                ..base.clone()
            },
            AnalyzerConfig {
                module_scope: false,
                ..base.clone()
            },
            AnalyzerConfig {
                respect_gitignore: true,
                ..base.clone()
            },
            AnalyzerConfig {
                max_file_bytes: 10,
                ..base.clone()
            },
            AnalyzerConfig {
                extensions: vec!["py".to_string(), "pyi".to_string()],
                ..base.clone()
            },
        ];
        for variant in &variants {
            assert_ne!(variant.graph_digest(), base.graph_digest());
        }
        let mut skip = base.clone();
        skip.skip_dirs.insert("vendor".to_string());
        assert_ne!(skip.graph_digest(), base.graph_digest());
    }
}
