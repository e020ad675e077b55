use crate::config::EngineConfig;
use crate::context::{
    AnalysisCompletion, CompletionStatus, FileLifecycle, FileState, ProjectContext,
};
use crate::error::{EngineError, Result};
use crate::fs::{clean_path, normalize_path, LocalFs, SourceFs};
use crate::limits::{WorkerPermit, WorkerPool, WorkerSnapshot};
use crate::related::{find_related, RelatedCodeQuery, RelatedReference};
use arc_swap::ArcSwap;
use context_graph::{DependencyGraph, FileContribution, FilePatch, GraphBuilder, PatchSummary};
use context_parser::{Language, LanguageParser, LruParseCache, ParseResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One file change fed to [`ContextEngine::update_context`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// New content supplied by the caller (e.g. an unsaved editor buffer)
    Modified { path: String, content: String },
    /// Content changed on disk; re-read through the filesystem collaborator
    Touched { path: String },
    Removed { path: String },
}

impl FileChange {
    pub fn modified(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Modified {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn touched(path: impl Into<String>) -> Self {
        Self::Touched { path: path.into() }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self::Removed { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Modified { path, .. } | Self::Touched { path } | Self::Removed { path } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Parsed { lifecycle: FileLifecycle },
    /// Reparsed to a structurally identical tree; the graph was not touched
    Unchanged,
    Removed,
    /// The previous state of the file is kept
    ReadFailed { message: String },
    /// A newer update for the same path was queued behind this one
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUpdate {
    pub path: String,
    #[serde(flatten)]
    pub outcome: UpdateOutcome,
}

/// Per-file outcome of one update batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Version visible after the batch
    pub version: u64,
    /// `false` when nothing in the batch changed the model
    pub committed: bool,
    pub files: Vec<FileUpdate>,
    pub patch: PatchSummary,
}

impl UpdateReport {
    pub fn outcome(&self, path: &str) -> Option<&UpdateOutcome> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| &f.outcome)
    }
}

/// Owns the project model and serialises every write to it.
///
/// Reads ([`ContextEngine::get_current_context`],
/// [`ContextEngine::find_related_code`]) load the current snapshot and never
/// wait on a writer.
pub struct ContextEngine {
    config: EngineConfig,
    parser: LanguageParser,
    builder: GraphBuilder,
    fs: Arc<dyn SourceFs>,
    workers: WorkerPool,
    current: ArcSwap<ProjectContext>,
    writer: tokio::sync::Mutex<()>,
    parsing: Arc<Mutex<BTreeSet<String>>>,
    coalescer: Coalescer,
}

impl ContextEngine {
    /// Engine over the local filesystem
    pub fn new(config: EngineConfig) -> Result<Self> {
        let fs = Arc::new(LocalFs::new(config.max_file_bytes));
        Self::with_fs(config, fs)
    }

    pub fn with_fs(config: EngineConfig, fs: Arc<dyn SourceFs>) -> Result<Self> {
        config.validate()?;
        let mut parser = LanguageParser::new(config.parser_config())?;
        if config.cache_capacity > 0 {
            parser = parser.with_cache(Arc::new(LruParseCache::new(config.cache_capacity)?));
        }
        Ok(Self {
            workers: WorkerPool::new(config.worker_count),
            config,
            parser,
            builder: GraphBuilder::new(),
            fs,
            current: ArcSwap::from_pointee(ProjectContext::default()),
            writer: tokio::sync::Mutex::new(()),
            parsing: Arc::new(Mutex::new(BTreeSet::new())),
            coalescer: Coalescer::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parser(&self) -> &LanguageParser {
        &self.parser
    }

    pub fn worker_snapshot(&self) -> WorkerSnapshot {
        self.workers.snapshot()
    }

    /// Current snapshot; cheap and never blocks
    pub fn get_current_context(&self) -> Arc<ProjectContext> {
        self.current.load_full()
    }

    /// `Parsing` while a parse of `path` is in flight, else the snapshot state
    pub fn file_state(&self, path: &str) -> Option<FileLifecycle> {
        if lock(&self.parsing).contains(path) {
            return Some(FileLifecycle::Parsing);
        }
        self.current.load().file(path).map(|state| state.lifecycle)
    }

    pub fn find_related_code(&self, query: &RelatedCodeQuery) -> Vec<RelatedReference> {
        let snapshot = self.current.load();
        find_related(
            &snapshot,
            query,
            self.config.related_max_results,
            self.config.related_neighbor_depth,
        )
    }

    pub async fn analyze_project(&self, root: impl AsRef<Path>) -> Result<Arc<ProjectContext>> {
        self.analyze_project_with_cancel(root, CancellationToken::new())
            .await
    }

    /// Full analysis: parse every source file under `root` on the worker pool
    /// and build a fresh graph.
    ///
    /// Stops dispatching when `cancel` fires or the analysis budget runs out;
    /// parses already in flight finish and the partial result is published
    /// with its completion ratio.
    pub async fn analyze_project_with_cancel(
        &self,
        root: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<Arc<ProjectContext>> {
        let root = root.as_ref();
        let root = if root.is_relative() {
            clean_path(&std::env::current_dir()?.join(root))
        } else {
            clean_path(root)
        };
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.analysis_budget();

        let paths = self.fs.list_source_files(&root).await?;
        let _writer = self.writer.lock().await;
        let keys: Vec<String> = paths.iter().map(|p| normalize_path(&root, p)).collect();

        let mut parsing = ParsingGuard::new(&self.parsing);
        let mut handles: Vec<(String, JoinHandle<Result<Loaded>>)> = Vec::new();
        let mut status = CompletionStatus::Complete;
        for (path, key) in paths.iter().zip(&keys) {
            let gate = tokio::select! {
                biased;
                _ = cancel.cancelled() => Gate::Stop(CompletionStatus::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Gate::Stop(CompletionStatus::BudgetExceeded),
                permit = self.workers.acquire() => Gate::Go(permit?),
            };
            let permit = match gate {
                Gate::Go(permit) => permit,
                Gate::Stop(reason) => {
                    status = reason;
                    break;
                }
            };
            parsing.mark(key);
            handles.push((key.clone(), self.spawn_file_task(permit, path.clone(), key, None)));
        }

        let mut files: BTreeMap<String, FileState> = keys
            .iter()
            .map(|key| (key.clone(), FileState::unparsed()))
            .collect();
        let mut contributions = Vec::with_capacity(handles.len());
        let parsed_files = handles.len();
        for (key, handle) in handles {
            let result = match handle.await?? {
                Loaded::Parsed {
                    result,
                    contribution,
                } => {
                    contributions.extend(contribution);
                    result
                }
                Loaded::ReadFailed(message) => {
                    Arc::new(ParseResult::unreadable(language_id(&key), &key, message))
                }
            };
            files.insert(key, FileState::parsed(result));
        }

        let graph = tokio::task::spawn_blocking(move || {
            DependencyGraph::from_contributions(contributions)
        })
        .await?;

        let previous = self.current.load();
        let next = Arc::new(ProjectContext {
            root: Some(root.clone()),
            files,
            graph: Arc::new(graph),
            version: previous.version + 1,
            completion: AnalysisCompletion::new(keys.len(), parsed_files, status),
        });
        self.current.store(next.clone());
        drop(parsing);

        let stats = next.graph().statistics();
        match status {
            CompletionStatus::Complete => log::info!(
                "Analyzed {} files in {:?}: {} nodes, {} edges, {} cycles (version {})",
                parsed_files,
                started.elapsed(),
                stats.node_count,
                stats.edge_count,
                stats.circular_dependency_count,
                next.version()
            ),
            CompletionStatus::BudgetExceeded | CompletionStatus::Cancelled => log::warn!(
                "Analysis of {} stopped ({status:?}) after {:?}: {}/{} files parsed",
                root.display(),
                started.elapsed(),
                parsed_files,
                keys.len()
            ),
        }
        Ok(next)
    }

    /// Reparse the named files and patch the graph as one atomic step.
    ///
    /// Paths may be project-relative or absolute under the analysed root; both
    /// name the same file. Within a batch the last change per path wins;
    /// across concurrent calls a path already queued again by a later call is
    /// skipped here ([`UpdateOutcome::Superseded`]).
    pub async fn update_context(&self, changes: Vec<FileChange>) -> Result<UpdateReport> {
        let root = self.current.load().root.clone().unwrap_or_default();
        let mut batch: BTreeMap<String, FileChange> = BTreeMap::new();
        for change in changes {
            let key = normalize_path(&root, Path::new(change.path().trim()));
            if key.is_empty() {
                return Err(EngineError::InvalidArgument(format!(
                    "change path `{}` does not name a file",
                    change.path()
                )));
            }
            batch.insert(key, change);
        }

        let tickets = self.coalescer.register(batch.keys());
        let outcome = {
            let _writer = self.writer.lock().await;
            self.apply_batch(batch, &tickets).await
        };
        self.coalescer.release(&tickets);
        outcome
    }

    async fn apply_batch(
        &self,
        batch: BTreeMap<String, FileChange>,
        tickets: &BTreeMap<String, u64>,
    ) -> Result<UpdateReport> {
        let current = self.current.load_full();
        let root = current.root.clone().unwrap_or_default();

        let mut outcomes: BTreeMap<String, UpdateOutcome> = BTreeMap::new();
        let mut removals = Vec::new();
        let mut parsing = ParsingGuard::new(&self.parsing);
        let mut handles: Vec<(String, JoinHandle<Result<Loaded>>)> = Vec::new();
        for (path, change) in batch {
            let latest = tickets
                .get(&path)
                .is_some_and(|ticket| self.coalescer.is_latest(&path, *ticket));
            if !latest {
                log::debug!("{path}: superseded by a newer update");
                outcomes.insert(path, UpdateOutcome::Superseded);
                continue;
            }
            let content = match change {
                FileChange::Removed { .. } => {
                    removals.push(path);
                    continue;
                }
                FileChange::Modified { content, .. } => Some(content),
                FileChange::Touched { .. } => None,
            };
            let permit = self.workers.acquire().await?;
            parsing.mark(&path);
            let absolute = root.join(&path);
            handles.push((path.clone(), self.spawn_file_task(permit, absolute, &path, content)));
        }

        let mut files = current.files.clone();
        let mut patches = Vec::new();
        for path in removals {
            let tracked = files
                .get(&path)
                .is_some_and(|state| state.lifecycle != FileLifecycle::Removed);
            if tracked {
                files.insert(path.clone(), FileState::removed());
                patches.push(FilePatch::Remove(path.clone()));
                outcomes.insert(path, UpdateOutcome::Removed);
            } else {
                outcomes.insert(path, UpdateOutcome::Unchanged);
            }
        }

        for (path, handle) in handles {
            let (result, contribution) = match handle.await?? {
                Loaded::Parsed {
                    result,
                    contribution,
                } => (result, contribution),
                Loaded::ReadFailed(message) => {
                    outcomes.insert(path, UpdateOutcome::ReadFailed { message });
                    continue;
                }
            };
            let unchanged = files.get(&path).is_some_and(|state| {
                state.lifecycle.is_parsed()
                    && state
                        .result
                        .as_ref()
                        .is_some_and(|old| same_structure(old, &result))
            });
            if unchanged {
                log::debug!("{path}: AST unchanged, graph patch skipped");
                outcomes.insert(path, UpdateOutcome::Unchanged);
                continue;
            }
            let state = FileState::parsed(result);
            outcomes.insert(
                path.clone(),
                UpdateOutcome::Parsed {
                    lifecycle: state.lifecycle,
                },
            );
            files.insert(path.clone(), state);
            patches.push(match contribution {
                Some(contribution) => FilePatch::Replace(contribution),
                None => FilePatch::Remove(path),
            });
        }

        let files_report: Vec<FileUpdate> = outcomes
            .into_iter()
            .map(|(path, outcome)| FileUpdate { path, outcome })
            .collect();
        if patches.is_empty() {
            return Ok(UpdateReport {
                version: current.version,
                committed: false,
                files: files_report,
                patch: PatchSummary::default(),
            });
        }

        let mut graph = DependencyGraph::clone(&current.graph);
        let (graph, summary) = tokio::task::spawn_blocking(move || {
            let summary = graph.apply_patch(patches);
            (graph, summary)
        })
        .await?;

        let mut next = ProjectContext {
            root: current.root.clone(),
            files,
            graph: Arc::new(graph),
            version: current.version + 1,
            completion: current.completion,
        };
        next.recount();
        let version = next.version;
        self.current.store(Arc::new(next));
        drop(parsing);

        log::info!(
            "Committed version {version}: {} files changed, {} re-resolved, -{} +{} edges",
            summary.changed_files,
            summary.re_resolved_files,
            summary.edges_removed,
            summary.edges_added
        );
        Ok(UpdateReport {
            version,
            committed: true,
            files: files_report,
            patch: summary,
        })
    }

    fn spawn_file_task(
        &self,
        permit: WorkerPermit,
        absolute: PathBuf,
        key: &str,
        content: Option<String>,
    ) -> JoinHandle<Result<Loaded>> {
        let task = FileTask {
            parser: self.parser.clone(),
            builder: self.builder.clone(),
            fs: self.fs.clone(),
            timeout: self.config.parse_timeout(),
        };
        let key = key.to_string();
        tokio::spawn(async move {
            let _permit = permit;
            task.run(absolute, key, content).await
        })
    }
}

impl std::fmt::Debug for ContextEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEngine")
            .field("config", &self.config)
            .field("version", &self.current.load().version())
            .finish()
    }
}

enum Gate {
    Go(WorkerPermit),
    Stop(CompletionStatus),
}

enum Loaded {
    Parsed {
        result: Arc<ParseResult>,
        contribution: Option<FileContribution>,
    },
    ReadFailed(String),
}

/// Read, parse and extract one file; runs on the worker pool
struct FileTask {
    parser: LanguageParser,
    builder: GraphBuilder,
    fs: Arc<dyn SourceFs>,
    timeout: Duration,
}

impl FileTask {
    async fn run(self, absolute: PathBuf, key: String, content: Option<String>) -> Result<Loaded> {
        let language = language_id(&key);
        let started = Instant::now();
        let loaded = tokio::time::timeout(self.timeout, async {
            let text = match content {
                Some(text) => text,
                None => match self.fs.read_to_string(&absolute).await {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("{key}: read failed: {e}");
                        return Ok(Err(e.to_string()));
                    }
                },
            };
            self.parser.parse(&text, language, &key).await.map(Ok)
        })
        .await;

        let result = match loaded {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(message))) => return Ok(Loaded::ReadFailed(message)),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                log::warn!("{key}: parse timeout after {:?}", self.timeout);
                Arc::new(ParseResult::timeout(language, &key, started.elapsed()))
            }
        };

        let builder = self.builder;
        let extracted = result.clone();
        let contribution =
            tokio::task::spawn_blocking(move || extracted.root_node().map(|root| builder.extract(root)))
                .await?;
        Ok(Loaded::Parsed {
            result,
            contribution,
        })
    }
}

fn language_id(path: &str) -> &'static str {
    Language::from_path(path).map_or("unknown", Language::as_str)
}

/// Same tree and same diagnostics; timestamps and timings are ignored
fn same_structure(old: &ParseResult, new: &ParseResult) -> bool {
    old.root_node() == new.root_node() && old.errors() == new.errors()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Paths reported as `Parsing` until the guard drops
struct ParsingGuard {
    set: Arc<Mutex<BTreeSet<String>>>,
    keys: Vec<String>,
}

impl ParsingGuard {
    fn new(set: &Arc<Mutex<BTreeSet<String>>>) -> Self {
        Self {
            set: set.clone(),
            keys: Vec::new(),
        }
    }

    fn mark(&mut self, key: &str) {
        lock(&self.set).insert(key.to_string());
        self.keys.push(key.to_string());
    }
}

impl Drop for ParsingGuard {
    fn drop(&mut self) {
        let mut set = lock(&self.set);
        for key in &self.keys {
            set.remove(key);
        }
    }
}

/// Last-write-wins bookkeeping across concurrent `update_context` calls
#[derive(Default)]
struct Coalescer {
    state: Mutex<CoalescerState>,
}

#[derive(Default)]
struct CoalescerState {
    next_ticket: u64,
    latest: HashMap<String, u64>,
}

impl Coalescer {
    fn register<'a>(&self, paths: impl Iterator<Item = &'a String>) -> BTreeMap<String, u64> {
        let mut state = lock(&self.state);
        let mut tickets = BTreeMap::new();
        for path in paths {
            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.latest.insert(path.clone(), ticket);
            tickets.insert(path.clone(), ticket);
        }
        tickets
    }

    fn is_latest(&self, path: &str, ticket: u64) -> bool {
        lock(&self.state).latest.get(path) == Some(&ticket)
    }

    fn release(&self, tickets: &BTreeMap<String, u64>) {
        let mut state = lock(&self.state);
        for (path, ticket) in tickets {
            if state.latest.get(path) == Some(ticket) {
                state.latest.remove(path);
            }
        }
    }
}
