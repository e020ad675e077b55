use context_parser::{Language, NodeKind, SourceLocation};
use serde::Serialize;

/// Qualified node id: `file_path::A.B.c`, or a bare type name for unresolved targets
pub type NodeId = String;

/// Separator between the file path and the ancestor path of a qualified id
pub const ID_SEPARATOR: &str = "::";

/// Build the qualified id for a dotted ancestor path inside `file_path`
pub fn qualified_id(file_path: &str, dotted_path: &str) -> NodeId {
    format!("{file_path}{ID_SEPARATOR}{dotted_path}")
}

/// Metadata of one graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNodeInfo {
    pub id: NodeId,
    /// Simple (last-segment) name
    pub name: String,
    /// `None` for unresolved external placeholders
    pub kind: Option<NodeKind>,
    pub file_path: Option<String>,
    pub location: Option<SourceLocation>,
}

impl GraphNodeInfo {
    pub fn declared(
        id: NodeId,
        name: &str,
        kind: NodeKind,
        file_path: &str,
        location: SourceLocation,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind: Some(kind),
            file_path: Some(file_path.to_string()),
            location: Some(location),
        }
    }

    pub fn external(name: &str) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            kind: None,
            file_path: None,
            location: None,
        }
    }

    pub fn is_external(&self) -> bool {
        self.kind.is_none()
    }
}

/// Structural slot a type reference was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Superclass,
    Interface,
    FieldType,
    ParameterType,
    ReturnType,
    Throws,
}

/// A candidate edge before resolution: `source` mentions type `target_name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeReference {
    pub source: NodeId,
    pub target_name: String,
    pub slot: Slot,
}

/// Soft extraction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionCounters {
    /// Slots whose attribute was missing, empty or malformed
    pub skipped_slots: usize,
    /// Candidates dropped by the exclusion registry
    pub excluded_candidates: usize,
}

impl std::ops::AddAssign for ExtractionCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.skipped_slots += rhs.skipped_slots;
        self.excluded_candidates += rhs.excluded_candidates;
    }
}

/// Everything one file contributes to the graph.
///
/// Kept by the graph after insertion so references can be re-resolved when
/// declarations in other files change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContribution {
    pub file_path: String,
    pub language: Option<Language>,
    pub declarations: Vec<GraphNodeInfo>,
    pub references: Vec<TypeReference>,
    pub counters: ExtractionCounters,
}

impl FileContribution {
    pub fn new(file_path: impl Into<String>, language: Option<Language>) -> Self {
        Self {
            file_path: file_path.into(),
            language,
            ..Self::default()
        }
    }

    /// Simple names of the type declarations (targets other files can resolve to)
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.declarations
            .iter()
            .filter(|d| d.kind == Some(NodeKind::Class))
            .map(|d| d.name.as_str())
    }

    /// Fold another contribution for the same file into this one
    pub fn merge(&mut self, other: FileContribution) {
        for decl in other.declarations {
            if !self.declarations.iter().any(|d| d.id == decl.id) {
                self.declarations.push(decl);
            }
        }
        self.references.extend(other.references);
        self.references.sort();
        self.references.dedup();
        self.counters += other.counters;
        if self.language.is_none() {
            self.language = other.language;
        }
    }
}

/// Aggregate graph statistics; always derived, never set directly
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub average_dependencies: f64,
    pub max_dependencies: usize,
    pub circular_dependency_count: usize,
}

/// Soft diagnostic counters of the current graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphDiagnostics {
    pub skipped_slots: usize,
    pub excluded_candidates: usize,
    /// Edges dropped by consistency repair (target id no longer present)
    pub dropped_edges: usize,
    pub external_nodes: usize,
}

/// One file's change in an incremental patch
#[derive(Debug, Clone)]
pub enum FilePatch {
    /// Replace everything the file contributed
    Replace(FileContribution),
    /// Drop everything the file contributed
    Remove(String),
}

impl FilePatch {
    pub fn file_path(&self) -> &str {
        match self {
            FilePatch::Replace(contribution) => &contribution.file_path,
            FilePatch::Remove(path) => path,
        }
    }
}
