//! # Context Engine
//!
//! Live structural model of a codebase: per-file ASTs plus the project-wide
//! dependency graph, kept consistent under incremental edits.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> SourceFs (.gitignore aware)
//!     │      └─> Source files
//!     │
//!     ├──> Worker pool (bounded, per-file timeout)
//!     │      └─> ParseResult + graph contribution per file
//!     │
//!     └──> ProjectContext (versioned snapshot, swapped atomically)
//!            ├─ file states + lifecycle
//!            └─ DependencyGraph (patched on update, never half-applied)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_engine::{ContextEngine, EngineConfig, FileChange, RelatedCodeQuery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ContextEngine::new(EngineConfig::default().with_env_overrides())?;
//!     let context = engine.analyze_project("/path/to/project").await?;
//!     println!("{} nodes", context.graph().node_count());
//!
//!     engine
//!         .update_context(vec![FileChange::modified("src/Main.java", "class Main {}")])
//!         .await?;
//!     for hit in engine.find_related_code(&RelatedCodeQuery::new("Main")) {
//!         println!("{} {:.2}", hit.id, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod context;
mod engine;
mod error;
mod fs;
mod limits;
mod related;

pub use config::{
    EngineConfig, ENV_BUDGET_MS, ENV_CACHE_CAPACITY, ENV_MAX_FILE_BYTES, ENV_PARSE_TIMEOUT_MS,
    ENV_WORKERS,
};
pub use context::{AnalysisCompletion, CompletionStatus, FileLifecycle, FileState, ProjectContext};
pub use engine::{ContextEngine, FileChange, FileUpdate, UpdateOutcome, UpdateReport};
pub use error::{EngineError, Result};
pub use fs::{normalize_path, LocalFs, SourceFs};
pub use limits::WorkerSnapshot;
pub use related::{MatchReason, RelatedCodeQuery, RelatedReference};

pub use tokio_util::sync::CancellationToken;
