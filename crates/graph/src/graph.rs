use crate::error::{GraphError, Result};
use crate::types::{
    ExtractionCounters, FileContribution, FilePatch, GraphDiagnostics, GraphNodeInfo,
    GraphStatistics, NodeId, TypeReference,
};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Directed type-reference graph over qualified ids.
///
/// `dependencies` and `dependents` are kept as exact inverses. Statistics are
/// recomputed after every build or patch and cannot be set from outside.
///
/// Cloning shares the per-file contributions, so copy-on-write snapshots
/// only pay for the index maps.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<NodeId, GraphNodeInfo>,
    dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Raw per-file contributions, kept for re-resolution during patches
    files: BTreeMap<String, Arc<FileContribution>>,
    /// Simple type name -> declaring Class ids
    symbols: BTreeMap<String, BTreeSet<NodeId>>,
    statistics: GraphStatistics,
    dropped_edges: usize,
}

/// What a patch touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    pub changed_files: usize,
    /// Unchanged files re-resolved because a name they reference changed
    pub re_resolved_files: usize,
    pub edges_removed: usize,
    pub edges_added: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from per-file contributions (one per file path)
    pub fn from_contributions(contributions: Vec<FileContribution>) -> Self {
        let mut graph = Self::new();
        for contribution in contributions {
            graph.insert_declarations(&contribution);
            graph
                .files
                .insert(contribution.file_path.clone(), Arc::new(contribution));
        }

        let edges: Vec<(NodeId, NodeId)> = graph
            .files
            .par_iter()
            .flat_map_iter(|(_, contribution)| graph.resolve_file(contribution))
            .collect();
        for (source, target) in edges {
            graph.insert_edge(source, target);
        }

        graph.refresh_derived(true);
        graph
    }

    /// Replace or remove the contributions of the named files as one unit.
    ///
    /// Edges whose source belongs to a changed file are dropped and re-extracted.
    /// Unchanged files referencing a type name declared (before or after) in a
    /// changed file are re-resolved too, so no edge survives pointing at a
    /// removed declaration.
    pub fn apply_patch(&mut self, patches: Vec<FilePatch>) -> PatchSummary {
        // Last patch for a path wins.
        let mut by_path: BTreeMap<String, FilePatch> = BTreeMap::new();
        for patch in patches {
            by_path.insert(patch.file_path().to_string(), patch);
        }
        let edges_before = self.edge_count();
        let changed_files = by_path.len();

        let mut affected_names: BTreeSet<String> = BTreeSet::new();
        for (path, patch) in &by_path {
            if let Some(old) = self.files.get(path) {
                affected_names.extend(old.type_names().map(str::to_string));
            }
            if let FilePatch::Replace(new) = patch {
                affected_names.extend(new.type_names().map(str::to_string));
            }
        }

        let mut removed_edges: Vec<(NodeId, NodeId)> = Vec::new();
        for path in by_path.keys() {
            removed_edges.extend(self.remove_file(path));
        }

        let mut to_resolve: BTreeSet<String> = BTreeSet::new();
        for (path, patch) in by_path {
            if let FilePatch::Replace(contribution) = patch {
                self.insert_declarations(&contribution);
                self.files.insert(path.clone(), Arc::new(contribution));
                to_resolve.insert(path);
            }
        }

        let dependent_files: Vec<String> = self
            .files
            .iter()
            .filter(|(path, _)| !to_resolve.contains(*path))
            .filter(|(_, c)| {
                c.references
                    .iter()
                    .any(|r| affected_names.contains(&r.target_name))
            })
            .map(|(path, _)| path.clone())
            .collect();
        for path in &dependent_files {
            removed_edges.extend(self.remove_outgoing_of_file(path));
            to_resolve.insert(path.clone());
        }

        let edges: Vec<(NodeId, NodeId)> = to_resolve
            .par_iter()
            .filter_map(|path| self.files.get(path))
            .flat_map_iter(|contribution| self.resolve_file(contribution))
            .collect();
        let edges_removed = removed_edges.len();
        let edges_added = edges.len();
        let removed_set: BTreeSet<(NodeId, NodeId)> = removed_edges.into_iter().collect();
        let added_set: BTreeSet<(NodeId, NodeId)> = edges.iter().cloned().collect();
        for (source, target) in edges {
            self.insert_edge(source, target);
        }

        self.collect_orphan_externals();
        let dropped = self.repair();
        // Cycles only change with the edge set; nodes without edges never form one.
        let recount_cycles = dropped > 0
            || (removed_set != added_set
                && !(added_set.is_subset(&removed_set)
                    && self.statistics.circular_dependency_count == 0));
        self.refresh_derived(recount_cycles);

        let summary = PatchSummary {
            changed_files,
            re_resolved_files: dependent_files.len(),
            edges_removed,
            edges_added,
        };
        log::debug!(
            "Patched dependency graph: {summary:?}, {} -> {} edges",
            edges_before,
            self.edge_count()
        );
        summary
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNodeInfo> {
        self.nodes.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&GraphNodeInfo> {
        self.node(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNodeInfo> {
        self.nodes.values()
    }

    /// Every edge as `(source, target)`, ordered by source then target
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .flat_map(|(source, targets)| targets.iter().map(move |t| (source.as_str(), t.as_str())))
    }

    /// Ids `id` depends on (empty for unknown ids)
    pub fn dependencies(&self, id: &str) -> BTreeSet<NodeId> {
        self.dependencies.get(id).cloned().unwrap_or_default()
    }

    /// Ids depending on `id` (empty for unknown ids)
    pub fn dependents(&self, id: &str) -> BTreeSet<NodeId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }

    pub fn dependency_ids(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(id)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    pub fn dependent_ids(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(id)
            .into_iter()
            .flat_map(|sources| sources.iter().map(String::as_str))
    }

    /// Declarations contributed by one file
    pub fn nodes_in_file(&self, file_path: &str) -> Vec<&GraphNodeInfo> {
        self.files
            .get(file_path)
            .map(|c| {
                c.declarations
                    .iter()
                    .filter_map(|d| self.nodes.get(&d.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes whose simple name is `name`
    pub fn ids_named(&self, name: &str) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.name == name)
            .map(|n| n.id.as_str())
            .collect()
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }

    pub fn statistics(&self) -> GraphStatistics {
        self.statistics
    }

    pub fn diagnostics(&self) -> GraphDiagnostics {
        let mut counters = ExtractionCounters::default();
        for contribution in self.files.values() {
            counters += contribution.counters;
        }
        GraphDiagnostics {
            skipped_slots: counters.skipped_slots,
            excluded_candidates: counters.excluded_candidates,
            dropped_edges: self.dropped_edges,
            external_nodes: self.nodes.values().filter(|n| n.is_external()).count(),
        }
    }

    /// Strongly connected components with more than one node, each as an
    /// id sequence starting at its smallest id and following edges.
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.nodes.keys() {
            graph.add_node(id.as_str());
        }
        for (source, target) in self.edges() {
            graph.add_edge(source, target, ());
        }

        let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| self.order_cycle(&scc.into_iter().collect()))
            .collect();
        cycles.sort();
        cycles
    }

    /// Depth-first walk inside one component, smallest successor first
    fn order_cycle(&self, members: &BTreeSet<&str>) -> Vec<NodeId> {
        let mut ordered = Vec::with_capacity(members.len());
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = members.iter().next().copied().into_iter().collect();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            ordered.push(current.to_string());
            let mut next: Vec<&str> = self
                .dependency_ids(current)
                .filter(|t| members.contains(t) && !visited.contains(t))
                .collect();
            next.reverse();
            stack.extend(next);
        }
        ordered
    }

    fn insert_declarations(&mut self, contribution: &FileContribution) {
        for decl in &contribution.declarations {
            if decl.kind == Some(context_parser::NodeKind::Class) {
                self.symbols
                    .entry(decl.name.clone())
                    .or_default()
                    .insert(decl.id.clone());
            }
            self.nodes.insert(decl.id.clone(), decl.clone());
        }
    }

    /// Target id for a reference from `file_path`; `None` would be a self-loop
    fn resolve(&self, file_path: &str, reference: &TypeReference) -> Option<NodeId> {
        let target = match self.symbols.get(&reference.target_name) {
            Some(candidates) if !candidates.is_empty() => candidates
                .iter()
                .find(|id| {
                    self.nodes
                        .get(*id)
                        .and_then(|n| n.file_path.as_deref())
                        == Some(file_path)
                })
                .or_else(|| candidates.iter().next())
                .cloned()?,
            _ => reference.target_name.clone(),
        };
        (target != reference.source).then_some(target)
    }

    fn resolve_file(&self, contribution: &FileContribution) -> Vec<(NodeId, NodeId)> {
        contribution
            .references
            .iter()
            .filter_map(|r| {
                self.resolve(&contribution.file_path, r)
                    .map(|target| (r.source.clone(), target))
            })
            .collect()
    }

    fn insert_edge(&mut self, source: NodeId, target: NodeId) {
        if source == target {
            return;
        }
        if !self.nodes.contains_key(&target) {
            self.nodes
                .insert(target.clone(), GraphNodeInfo::external(&target));
        }
        self.dependents
            .entry(target.clone())
            .or_default()
            .insert(source.clone());
        self.dependencies.entry(source).or_default().insert(target);
    }

    /// Drop a node's outgoing edges, returning them
    fn remove_outgoing(&mut self, source: &str) -> Vec<(NodeId, NodeId)> {
        let Some(targets) = self.dependencies.remove(source) else {
            return Vec::new();
        };
        for target in &targets {
            if let Some(sources) = self.dependents.get_mut(target) {
                sources.remove(source);
                if sources.is_empty() {
                    self.dependents.remove(target);
                }
            }
        }
        targets
            .into_iter()
            .map(|target| (source.to_string(), target))
            .collect()
    }

    fn remove_outgoing_of_file(&mut self, file_path: &str) -> Vec<(NodeId, NodeId)> {
        let ids: Vec<NodeId> = self
            .files
            .get(file_path)
            .map(|c| c.declarations.iter().map(|d| d.id.clone()).collect())
            .unwrap_or_default();
        ids.iter().flat_map(|id| self.remove_outgoing(id)).collect()
    }

    /// Remove a file's declarations and outgoing edges
    fn remove_file(&mut self, file_path: &str) -> Vec<(NodeId, NodeId)> {
        let removed = self.remove_outgoing_of_file(file_path);
        if let Some(old) = self.files.remove(file_path) {
            for decl in &old.declarations {
                self.nodes.remove(&decl.id);
                if let Some(ids) = self.symbols.get_mut(&decl.name) {
                    ids.remove(&decl.id);
                    if ids.is_empty() {
                        self.symbols.remove(&decl.name);
                    }
                }
            }
        }
        removed
    }

    /// External placeholders nobody references any more
    fn collect_orphan_externals(&mut self) {
        let orphans: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.is_external() && !self.dependents.contains_key(&n.id))
            .map(|n| n.id.clone())
            .collect();
        for id in orphans {
            self.nodes.remove(&id);
        }
    }

    /// Drop edges whose endpoints are gone and rebuild `dependents` if it
    /// ever drifts from the inverse of `dependencies`. Returns the number of
    /// edges dropped.
    fn repair(&mut self) -> usize {
        let nodes = &self.nodes;
        let mut dropped = 0;
        self.dependencies.retain(|source, targets| {
            if !nodes.contains_key(source) {
                dropped += targets.len();
                return false;
            }
            let before = targets.len();
            targets.retain(|t| nodes.contains_key(t) && t != source);
            dropped += before - targets.len();
            !targets.is_empty()
        });

        let mut inverse: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (source, targets) in &self.dependencies {
            for target in targets {
                inverse
                    .entry(target.clone())
                    .or_default()
                    .insert(source.clone());
            }
        }
        if inverse != self.dependents {
            log::warn!("Dependency graph reverse index drifted; rebuilt from forward edges");
            self.dependents = inverse;
        }
        if dropped > 0 {
            log::warn!("Dropped {dropped} dependency edges pointing at removed nodes");
            self.dropped_edges += dropped;
        }
        dropped
    }

    /// Recompute statistics; the Tarjan pass runs only when `recount_cycles`
    fn refresh_derived(&mut self, recount_cycles: bool) {
        let node_count = self.nodes.len();
        let edge_count = self.edge_count();
        let max_dependencies = self
            .dependencies
            .values()
            .map(BTreeSet::len)
            .max()
            .unwrap_or(0);
        let average_dependencies = if node_count == 0 {
            0.0
        } else {
            edge_count as f64 / node_count as f64
        };
        self.statistics = GraphStatistics {
            node_count,
            edge_count,
            average_dependencies,
            max_dependencies,
            circular_dependency_count: if recount_cycles {
                self.detect_cycles().len()
            } else {
                self.statistics.circular_dependency_count
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{qualified_id, Slot};
    use context_parser::{NodeKind, SourceLocation};
    use pretty_assertions::assert_eq;

    fn class(file: &str, name: &str) -> GraphNodeInfo {
        GraphNodeInfo::declared(
            qualified_id(file, name),
            name,
            NodeKind::Class,
            file,
            SourceLocation::file_start(file),
        )
    }

    fn contribution(file: &str, classes: &[&str], refs: &[(&str, &str)]) -> FileContribution {
        let mut c = FileContribution::new(file, None);
        c.declarations = classes.iter().map(|n| class(file, n)).collect();
        c.references = refs
            .iter()
            .map(|(from, to)| TypeReference {
                source: qualified_id(file, from),
                target_name: to.to_string(),
                slot: Slot::FieldType,
            })
            .collect();
        c
    }

    #[test]
    fn three_node_cycle_is_detected() {
        let graph = DependencyGraph::from_contributions(vec![contribution(
            "m.java",
            &["A", "B", "C"],
            &[("A", "B"), ("B", "C"), ("C", "A")],
        )]);
        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0],
            vec!["m.java::A".to_string(), "m.java::B".into(), "m.java::C".into()]
        );
        assert_eq!(graph.statistics().circular_dependency_count, 1);
    }

    #[test]
    fn unresolved_targets_become_external_placeholders() {
        let graph = DependencyGraph::from_contributions(vec![contribution(
            "a.rs",
            &["Car"],
            &[("Car", "Engine"), ("Car", "Car")],
        )]);
        assert_eq!(
            graph.dependencies("a.rs::Car"),
            BTreeSet::from(["Engine".to_string()])
        );
        let engine = graph.node("Engine").unwrap();
        assert!(engine.is_external());
        assert!(graph.dependencies("Engine").is_empty());
        assert_eq!(graph.diagnostics().external_nodes, 1);
    }

    #[test]
    fn same_file_declaration_wins() {
        let graph = DependencyGraph::from_contributions(vec![
            contribution("a.java", &["User", "Svc"], &[("Svc", "User")]),
            contribution("b.java", &["User"], &[]),
        ]);
        assert_eq!(
            graph.dependencies("a.java::Svc"),
            BTreeSet::from(["a.java::User".to_string()])
        );
    }

    #[test]
    fn removing_a_declaring_file_re_resolves_referrers() {
        let mut graph = DependencyGraph::from_contributions(vec![
            contribution("a.java", &["Svc"], &[("Svc", "User")]),
            contribution("b.java", &["User"], &[]),
        ]);
        assert!(graph.dependencies("a.java::Svc").contains("b.java::User"));

        let summary = graph.apply_patch(vec![FilePatch::Remove("b.java".into())]);
        assert_eq!(summary.re_resolved_files, 1);
        assert_eq!(
            graph.dependencies("a.java::Svc"),
            BTreeSet::from(["User".to_string()])
        );
        assert!(!graph.contains("b.java::User"));
        assert!(graph.dependents("b.java::User").is_empty());
        assert_eq!(graph.diagnostics().dropped_edges, 0);
    }

    #[test]
    fn adding_a_declaration_replaces_the_placeholder() {
        let mut graph =
            DependencyGraph::from_contributions(vec![contribution("a.java", &["Svc"], &[("Svc", "User")])]);
        assert!(graph.contains("User"));

        graph.apply_patch(vec![FilePatch::Replace(contribution("u.java", &["User"], &[]))]);
        assert_eq!(
            graph.dependencies("a.java::Svc"),
            BTreeSet::from(["u.java::User".to_string()])
        );
        assert!(!graph.contains("User"));
        assert_eq!(graph.statistics().node_count, 2);
    }

    #[test]
    fn cycle_count_tracks_patches() {
        let mut graph = DependencyGraph::from_contributions(vec![
            contribution("a.java", &["A"], &[("A", "B")]),
            contribution("b.java", &["B"], &[("B", "A")]),
        ]);
        assert_eq!(graph.statistics().circular_dependency_count, 1);

        // Same edges, different declarations: the count carries over.
        graph.apply_patch(vec![FilePatch::Replace(contribution(
            "a.java",
            &["A", "Extra"],
            &[("A", "B")],
        ))]);
        assert_eq!(graph.statistics().circular_dependency_count, 1);

        graph.apply_patch(vec![FilePatch::Replace(contribution("b.java", &["B"], &[]))]);
        assert_eq!(graph.statistics().circular_dependency_count, 0);

        graph.apply_patch(vec![FilePatch::Replace(contribution(
            "b.java",
            &["B"],
            &[("B", "A")],
        ))]);
        assert_eq!(graph.statistics().circular_dependency_count, 1);
        assert_eq!(
            graph.statistics().circular_dependency_count,
            graph.detect_cycles().len()
        );
    }

    #[test]
    fn clones_share_file_contributions() {
        let graph = DependencyGraph::from_contributions(vec![contribution(
            "a.java",
            &["A"],
            &[("A", "B")],
        )]);
        let mut copy = graph.clone();
        assert!(Arc::ptr_eq(&graph.files["a.java"], &copy.files["a.java"]));

        copy.apply_patch(vec![FilePatch::Replace(contribution("a.java", &["A"], &[]))]);
        assert!(!Arc::ptr_eq(&graph.files["a.java"], &copy.files["a.java"]));
        assert_eq!(graph.dependencies("a.java::A").len(), 1);
        assert!(copy.dependencies("a.java::A").is_empty());
    }

    #[test]
    fn statistics_follow_the_edges() {
        let graph = DependencyGraph::from_contributions(vec![contribution(
            "s.py",
            &["A", "B"],
            &[("A", "B"), ("A", "X"), ("B", "X")],
        )]);
        let stats = graph.statistics();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.max_dependencies, 2);
        assert!((stats.average_dependencies - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.circular_dependency_count, 0);
    }
}
