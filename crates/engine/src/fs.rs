use crate::error::{EngineError, Result};
use async_trait::async_trait;
use context_parser::Language;
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

/// Filesystem collaborator: enumerates and reads project sources
#[async_trait]
pub trait SourceFs: Send + Sync {
    /// Every parseable source file under `root`, sorted
    async fn list_source_files(&self, root: &Path) -> Result<Vec<PathBuf>>;

    async fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// Local disk, `.gitignore` aware
#[derive(Debug, Clone)]
pub struct LocalFs {
    max_file_bytes: u64,
}

impl LocalFs {
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }

    fn scan(root: &Path, max_file_bytes: u64) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let scope_root = root.to_path_buf();
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
        builder.filter_entry(move |entry| !is_ignored_scope(entry.path(), &scope_root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    let path = entry.path();
                    if Language::from_path(path).is_none() {
                        continue;
                    }
                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > max_file_bytes {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                max_file_bytes
                            );
                            continue;
                        }
                    }
                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("Found {} source files under {}", files.len(), root.display());
        files
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new(1_048_576)
    }
}

#[async_trait]
impl SourceFs for LocalFs {
    async fn list_source_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(EngineError::InvalidPath(root.display().to_string()));
        }
        let root = root.to_path_buf();
        let max_file_bytes = self.max_file_bytes;
        Ok(tokio::task::spawn_blocking(move || Self::scan(&root, max_file_bytes)).await?)
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// Project-relative path with `/` separators; used as the file key everywhere.
///
/// `./src/A.java`, `src/../src/A.java` and `<root>/src/A.java` all map to
/// `src/A.java`.
pub fn normalize_path(root: &Path, path: &Path) -> String {
    let root = clean_path(root);
    let path = clean_path(path);
    let relative = path.strip_prefix(&root).unwrap_or(&path);
    let normalized = relative.to_string_lossy();
    if normalized.contains('\\') {
        normalized.replace('\\', "/")
    } else {
        normalized.into_owned()
    }
}

/// Resolve `.` and `..` lexically; the filesystem is never consulted
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped =
                    matches!(out.components().next_back(), Some(Component::Normal(_))) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_ignored_scope(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().any(|component| match component {
        std::path::Component::Normal(name) => {
            let lowered = name.to_string_lossy().to_lowercase();
            IGNORED_SCOPES.contains(&lowered.as_str())
        }
        _ => false,
    })
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // caches / builds
    ".cache",
    "node_modules",
    ".next",
    "build",
    "dist",
    "coverage",
    "target",
    ".venv",
    "venv",
    "__pycache__",
    // vendored code
    "vendor",
    "third_party",
    "third-party",
];
