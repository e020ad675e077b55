use context_graph::DependencyGraph;
use context_parser::ParseResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-file lifecycle.
///
/// `Unparsed → Parsing → ParsedOk | ParsedWithErrors`; a later update of the
/// same file re-enters `Parsing`; a deletion moves a parsed file to `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLifecycle {
    Unparsed,
    Parsing,
    ParsedOk,
    ParsedWithErrors,
    Removed,
}

impl FileLifecycle {
    pub fn after_parse(result: &ParseResult) -> Self {
        if result.is_successful() {
            FileLifecycle::ParsedOk
        } else {
            FileLifecycle::ParsedWithErrors
        }
    }

    pub fn is_parsed(self) -> bool {
        matches!(self, FileLifecycle::ParsedOk | FileLifecycle::ParsedWithErrors)
    }
}

/// What the engine knows about one file
#[derive(Debug, Clone)]
pub struct FileState {
    /// Latest parse; `None` while unparsed and after removal
    pub result: Option<Arc<ParseResult>>,
    pub lifecycle: FileLifecycle,
}

impl FileState {
    pub fn unparsed() -> Self {
        Self {
            result: None,
            lifecycle: FileLifecycle::Unparsed,
        }
    }

    pub fn parsed(result: Arc<ParseResult>) -> Self {
        Self {
            lifecycle: FileLifecycle::after_parse(&result),
            result: Some(result),
        }
    }

    pub fn removed() -> Self {
        Self {
            result: None,
            lifecycle: FileLifecycle::Removed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    BudgetExceeded,
    Cancelled,
}

/// How much of the project the last analysis covered
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisCompletion {
    pub total_files: usize,
    pub parsed_files: usize,
    /// `parsed_files / total_files`; 1.0 for an empty project
    pub ratio: f64,
    pub status: CompletionStatus,
}

impl AnalysisCompletion {
    pub fn new(total_files: usize, parsed_files: usize, status: CompletionStatus) -> Self {
        let ratio = if total_files == 0 {
            1.0
        } else {
            parsed_files as f64 / total_files as f64
        };
        Self {
            total_files,
            parsed_files,
            ratio,
            status,
        }
    }
}

impl Default for AnalysisCompletion {
    fn default() -> Self {
        Self::new(0, 0, CompletionStatus::Complete)
    }
}

/// One immutable version of the project model.
///
/// Writers build the next version from a clone and publish it with a single
/// pointer swap; a reader holding an `Arc<ProjectContext>` keeps a
/// self-consistent view for as long as it likes.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub(crate) root: Option<PathBuf>,
    pub(crate) files: BTreeMap<String, FileState>,
    pub(crate) graph: Arc<DependencyGraph>,
    pub(crate) version: u64,
    pub(crate) completion: AnalysisCompletion,
}

impl ProjectContext {
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn completion(&self) -> AnalysisCompletion {
        self.completion
    }

    /// All tracked files, including unparsed and removed ones
    pub fn files(&self) -> &BTreeMap<String, FileState> {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Latest parse of every file that currently has one
    pub fn parse_results(&self) -> impl Iterator<Item = &Arc<ParseResult>> {
        self.files.values().filter_map(|state| state.result.as_ref())
    }

    pub fn count_in(&self, lifecycle: FileLifecycle) -> usize {
        self.files
            .values()
            .filter(|state| state.lifecycle == lifecycle)
            .count()
    }

    /// Recount completion after an update; the status of the last analysis is kept
    pub(crate) fn recount(&mut self) {
        let total = self
            .files
            .values()
            .filter(|state| state.lifecycle != FileLifecycle::Removed)
            .count();
        let parsed = self
            .files
            .values()
            .filter(|state| state.lifecycle.is_parsed())
            .count();
        self.completion = AnalysisCompletion::new(total, parsed, self.completion.status);
    }
}
