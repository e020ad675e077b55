//! # Context Graph
//!
//! Dependency graph extracted from the type references in ASTs.
//!
//! ## Architecture
//!
//! ```text
//! AstNode forest
//!     │
//!     ├──> Graph Builder (per file, parallel)
//!     │      ├─ Qualified ids for Class / Method / Variable declarations
//!     │      ├─ Type names from superclass, interfaces, field, parameter,
//!     │      │  return and throws slots
//!     │      └─ Exclusion registry drops primitives and std types
//!     │
//!     └──> Dependency Graph
//!            ├─ Resolve names to declarations (or external placeholders)
//!            ├─ dependencies / dependents (exact inverses)
//!            ├─ Tarjan SCC cycle detection
//!            └─ Incremental file patches with cross-file re-resolution
//! ```

mod builder;
mod error;
mod exclusions;
mod graph;
mod types;

pub use builder::{build_dependency_graph, merge_by_file, referenced_type_names, GraphBuilder};
pub use error::{GraphError, Result};
pub use exclusions::ExclusionRegistry;
pub use graph::{DependencyGraph, PatchSummary};
pub use types::{
    qualified_id, ExtractionCounters, FileContribution, FilePatch, GraphDiagnostics,
    GraphNodeInfo, GraphStatistics, NodeId, Slot, TypeReference, ID_SEPARATOR,
};
