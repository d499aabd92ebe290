//! Filesystem scanning helpers for indexing passes.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::AnalyzerConfig;
use crate::errors::{CallscopeError, CallscopeResult};
use crate::models::FileFailure;

/// Fail fast when the project root is missing or is not a directory.
pub fn ensure_project_root(root: &Path) -> CallscopeResult<PathBuf> {
    if !root.is_dir() {
        return Err(CallscopeError::ProjectNotFound(root.to_path_buf()));
    }
    Ok(root.to_path_buf())
}

/// Relative POSIX path of `path` below `root`.
pub fn relative_posix(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Enumerate source files below `root`, sorted by relative path.
///
/// Directories whose name is in `config.skip_dirs` are pruned without being
/// entered. `.gitignore` rules apply only when `config.respect_gitignore`
/// is set.
pub fn iter_source_files(root: &Path, config: &AnalyzerConfig) -> Vec<String> {
    let skip_dirs = config.skip_dirs.clone();
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .git_ignore(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .parents(config.respect_gitignore)
        .require_git(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && skip_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
        });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable path during scan");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if !config.has_source_extension(entry.path()) {
            continue;
        }
        files.push(relative_posix(root, entry.path()));
    }
    files.sort();
    debug!(root = %root.display(), files = files.len(), "scanned project");
    files
}

/// SHA-256 hex digest of a byte slice.
pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// A source file read from disk, decoded as UTF-8.
pub struct SourceText {
    pub text: String,
    pub content_hash: String,
}

/// Read one source file, enforcing the size limit and UTF-8 decoding.
pub fn read_source(root: &Path, relative_path: &str, max_bytes: u64) -> Result<SourceText, FileFailure> {
    let absolute = root.join(relative_path);
    let size = std::fs::metadata(&absolute)
        .map_err(|e| FileFailure::read(relative_path, e.to_string()))?
        .len();
    if size > max_bytes {
        return Err(FileFailure::read(
            relative_path,
            format!("file is {size} bytes, larger than the {max_bytes} byte limit"),
        ));
    }
    let bytes = std::fs::read(&absolute).map_err(|e| FileFailure::read(relative_path, e.to_string()))?;
    let content_hash = compute_content_hash(&bytes);
    let mut text = String::from_utf8(bytes)
        .map_err(|e| FileFailure::read(relative_path, format!("not valid UTF-8: {e}")))?;
    if text.starts_with('\u{feff}') {
        text.drain(..'\u{feff}'.len_utf8());
    }
    Ok(SourceText { text, content_hash })
}

/// Fingerprint of a codebase: SHA-256 over sorted relative paths and file
/// contents. Unreadable files contribute only their path.
pub fn codebase_fingerprint(root: &Path, relative_paths: &[String]) -> String {
    let mut sorted: Vec<&String> = relative_paths.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for rel in sorted {
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        if let Ok(bytes) = std::fs::read(root.join(rel)) {
            hasher.update(&bytes);
        }
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
