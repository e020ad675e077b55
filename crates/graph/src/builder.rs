use crate::error::{GraphError, Result};
use crate::exclusions::ExclusionRegistry;
use crate::graph::DependencyGraph;
use crate::types::{qualified_id, FileContribution, GraphNodeInfo, NodeId, Slot, TypeReference};
use context_parser::{attr, AstNode, AttrValue, Language, NodeKind};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Dotted or `::`-separated identifier paths inside a type expression
static TYPE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*(?:(?:\.|::)[A-Za-z_$][A-Za-z0-9_$]*)*")
        .expect("type path regex")
});

/// Rust lifetimes (`'a`, `'static`)
static LIFETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'[A-Za-z_][A-Za-z0-9_]*\b").expect("lifetime regex"));

/// Quoted literals in TypeScript union types (`'open' | "closed"`)
static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'"#).expect("string literal regex"));

/// Words that appear in type expressions without naming a type
const TYPE_KEYWORDS: &[&str] = &[
    "extends", "super", "implements", "const", "mut", "dyn", "impl", "where", "as", "is",
    "readonly", "keyof", "typeof", "infer", "asserts", "unique", "in", "out", "new", "final",
    "static", "async", "crate",
];

/// Simple type names referenced by a type expression.
///
/// `Map<UserId, List<Order>>` yields `Map`, `UserId`, `List`, `Order`;
/// qualified paths keep their last segment (`java.util.List` → `List`).
pub fn referenced_type_names(type_text: &str, language: Option<Language>) -> Vec<String> {
    let without_lifetimes = LIFETIME.replace_all(type_text, " ");
    let cleaned = match language {
        Some(Language::Python) => without_lifetimes,
        _ => STRING_LITERAL.replace_all(&without_lifetimes, " ").into_owned().into(),
    };
    let mut names = Vec::new();
    for path in TYPE_PATH.find_iter(&cleaned) {
        let last = path
            .as_str()
            .rsplit(['.', ':'])
            .next()
            .unwrap_or_default();
        if last.is_empty() || TYPE_KEYWORDS.contains(&last) {
            continue;
        }
        if !names.iter().any(|n: &String| n == last) {
            names.push(last.to_string());
        }
    }
    names
}

/// Shape of a slot attribute on a node
enum SlotValue<'a> {
    Absent,
    Values(Vec<&'a str>),
    Malformed,
}

fn slot_value<'a>(node: &'a AstNode, key: &str) -> SlotValue<'a> {
    match node.attribute(key) {
        None => SlotValue::Absent,
        Some(AttrValue::Text(text)) => SlotValue::Values(vec![text.as_str()]),
        Some(AttrValue::List(items)) => SlotValue::Values(items.iter().map(String::as_str).collect()),
        Some(_) => SlotValue::Malformed,
    }
}

/// Extracts type-reference contributions from ASTs and builds graphs from them
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    exclusions: Arc<ExclusionRegistry>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclusions(exclusions: ExclusionRegistry) -> Self {
        Self {
            exclusions: Arc::new(exclusions),
        }
    }

    pub fn exclusions(&self) -> &ExclusionRegistry {
        &self.exclusions
    }

    /// Walk one tree (normally a compilation-unit root) and collect its
    /// declarations and candidate edges. Pure; never fails.
    pub fn extract(&self, root: &AstNode) -> FileContribution {
        let file_path = root.location().file_path.to_string();
        let language = root
            .text_attribute(attr::LANGUAGE)
            .and_then(Language::from_id)
            .or_else(|| Language::from_path(&file_path));

        let mut walk = Walk {
            exclusions: &self.exclusions,
            out: FileContribution::new(file_path, language),
            seen: BTreeSet::new(),
            scope: Vec::new(),
            type_params: Vec::new(),
        };
        walk.visit(root, None);

        let mut out = walk.out;
        out.references.sort();
        out.references.dedup();
        out
    }

    /// Extract every tree in parallel and merge into one graph
    pub fn build(&self, forest: &[AstNode]) -> DependencyGraph {
        let started = Instant::now();
        let contributions: Vec<FileContribution> =
            forest.par_iter().map(|root| self.extract(root)).collect();
        let graph = DependencyGraph::from_contributions(merge_by_file(contributions));
        let stats = graph.statistics();
        log::info!(
            "Built dependency graph: {} nodes, {} edges, {} cycles in {:?}",
            stats.node_count,
            stats.edge_count,
            stats.circular_dependency_count,
            started.elapsed()
        );
        graph
    }

    /// [`GraphBuilder::build`] on the blocking pool
    pub async fn build_async(&self, forest: Vec<AstNode>) -> Result<DependencyGraph> {
        let builder = self.clone();
        tokio::task::spawn_blocking(move || builder.build(&forest))
            .await
            .map_err(|e| GraphError::BuildTask(e.to_string()))
    }
}

/// Build a dependency graph from a forest of ASTs with the standard exclusions
pub async fn build_dependency_graph(forest: Vec<AstNode>) -> Result<DependencyGraph> {
    GraphBuilder::new().build_async(forest).await
}

/// Several trees may share one file path; fold them into one contribution each
pub fn merge_by_file(contributions: Vec<FileContribution>) -> Vec<FileContribution> {
    let mut by_file: BTreeMap<String, FileContribution> = BTreeMap::new();
    for contribution in contributions {
        match by_file.get_mut(&contribution.file_path) {
            Some(existing) => existing.merge(contribution),
            None => {
                by_file.insert(contribution.file_path.clone(), contribution);
            }
        }
    }
    by_file.into_values().collect()
}

struct Walk<'a> {
    exclusions: &'a ExclusionRegistry,
    out: FileContribution,
    seen: BTreeSet<NodeId>,
    scope: Vec<String>,
    /// Generic parameters of every enclosing declaration
    type_params: Vec<String>,
}

/// Languages where type annotations may be left out
fn annotations_optional(language: Option<Language>) -> bool {
    matches!(
        language,
        Some(Language::Python | Language::JavaScript | Language::TypeScript)
    )
}

impl Walk<'_> {
    /// `owner` is the nearest enclosing declaration; locals attach their types to it.
    fn visit(&mut self, node: &AstNode, owner: Option<&NodeId>) {
        let is_local = node.kind() == NodeKind::Variable
            && node.text_attribute(attr::DECLARATION) == Some("local")
            && owner.is_some();

        match (node.kind().is_declaration(), node.name()) {
            (true, Some(name)) if !is_local => {
                self.scope.push(name.to_string());
                let generics_mark = self.type_params.len();
                self.type_params
                    .extend(node.list_attribute(attr::TYPE_PARAMETERS).iter().cloned());
                let id = qualified_id(&self.out.file_path, &self.scope.join("."));
                if self.seen.insert(id.clone()) {
                    self.out.declarations.push(GraphNodeInfo::declared(
                        id.clone(),
                        name,
                        node.kind(),
                        &self.out.file_path,
                        node.location().clone(),
                    ));
                }
                self.collect_slots(node, &id);
                for child in node.children() {
                    self.visit(child, Some(&id));
                }
                self.type_params.truncate(generics_mark);
                self.scope.pop();
            }
            _ => {
                if let (true, Some(owner)) = (is_local, owner) {
                    self.collect_slots(node, owner);
                }
                for child in node.children() {
                    self.visit(child, owner);
                }
            }
        }
    }

    fn collect_slots(&mut self, node: &AstNode, source: &NodeId) {
        match node.kind() {
            NodeKind::Class => {
                self.slot(node, attr::SUPERCLASS, Slot::Superclass, source, false);
                self.slot(node, attr::INTERFACES, Slot::Interface, source, false);
            }
            NodeKind::Method => {
                self.slot(node, attr::PARAMETER_TYPES, Slot::ParameterType, source, false);
                self.slot(node, attr::RETURN_TYPE, Slot::ReturnType, source, false);
                self.slot(node, attr::THROWS, Slot::Throws, source, false);
            }
            NodeKind::Variable => {
                self.slot(node, attr::TYPE, Slot::FieldType, source, true);
            }
            NodeKind::Expression | NodeKind::Statement => {}
        }
    }

    /// Propose every type named in one slot; `required` slots count when absent
    /// unless the language lets annotations be left out
    fn slot(&mut self, node: &AstNode, key: &str, slot: Slot, source: &NodeId, required: bool) {
        let language = self.out.language;
        let optional = annotations_optional(language);
        let values = match slot_value(node, key) {
            SlotValue::Absent => {
                if required && !optional {
                    self.out.counters.skipped_slots += 1;
                }
                return;
            }
            SlotValue::Malformed => {
                log::debug!("{source}: malformed `{key}` attribute skipped");
                self.out.counters.skipped_slots += 1;
                return;
            }
            SlotValue::Values(values) => values,
        };

        for value in values {
            if optional && value.trim().is_empty() {
                continue;
            }
            let names = referenced_type_names(value, language);
            if names.is_empty() {
                self.out.counters.skipped_slots += 1;
                continue;
            }
            for name in names {
                if self.type_params.contains(&name) || self.exclusions.is_excluded(language, &name)
                {
                    self.out.counters.excluded_candidates += 1;
                    continue;
                }
                self.out.references.push(TypeReference {
                    source: source.clone(),
                    target_name: name,
                    slot,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_parser::SourceLocation;
    use pretty_assertions::assert_eq;

    fn loc() -> SourceLocation {
        SourceLocation::file_start("Svc.java")
    }

    #[test]
    fn type_expressions_are_tokenized() {
        assert_eq!(
            referenced_type_names("Map<UserId, List<com.acme.Order>>", Some(Language::Java)),
            vec!["Map", "UserId", "List", "Order"]
        );
        assert_eq!(
            referenced_type_names("&'a mut crate::model::Car", Some(Language::Rust)),
            vec!["Car"]
        );
        assert_eq!(
            referenced_type_names("List<? extends Shape>[]", Some(Language::Java)),
            vec!["List", "Shape"]
        );
        assert_eq!(
            referenced_type_names("'open' | Status", Some(Language::TypeScript)),
            vec!["Status"]
        );
        assert_eq!(
            referenced_type_names("\"UserService\"", Some(Language::Python)),
            vec!["UserService"]
        );
        assert!(referenced_type_names("()", Some(Language::Rust)).is_empty());
    }

    #[test]
    fn slots_become_references_and_exclusions_are_counted() {
        let method = AstNode::builder(NodeKind::Method, loc())
            .name("handle")
            .list_attr(
                attr::PARAMETER_TYPES,
                vec!["int".into(), "String".into(), "boolean".into()],
            )
            .attr(attr::RETURN_TYPE, "CustomReturnType")
            .list_attr(attr::THROWS, vec!["CustomException".into()])
            .build();
        let class = AstNode::builder(NodeKind::Class, loc())
            .name("Svc")
            .child(method)
            .build();
        let root = AstNode::builder(NodeKind::Statement, loc())
            .attr(attr::LANGUAGE, "java")
            .child(class)
            .build();

        let contribution = GraphBuilder::new().extract(&root);
        assert_eq!(contribution.language, Some(Language::Java));
        let ids: Vec<_> = contribution.declarations.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["Svc.java::Svc", "Svc.java::Svc.handle"]);

        let targets: Vec<_> = contribution
            .references
            .iter()
            .map(|r| (r.source.as_str(), r.target_name.as_str(), r.slot))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("Svc.java::Svc.handle", "CustomException", Slot::Throws),
                ("Svc.java::Svc.handle", "CustomReturnType", Slot::ReturnType),
            ]
        );
        assert_eq!(contribution.counters.excluded_candidates, 3);
    }

    #[test]
    fn locals_attach_to_enclosing_method_and_untyped_slots_are_counted() {
        let local = AstNode::builder(NodeKind::Variable, loc())
            .name("w")
            .attr(attr::DECLARATION, "local")
            .attr(attr::TYPE, "Worker")
            .build();
        let untyped = AstNode::builder(NodeKind::Variable, loc())
            .name("cache")
            .attr(attr::DECLARATION, "field")
            .build();
        let malformed = AstNode::builder(NodeKind::Variable, loc())
            .name("odd")
            .attr(attr::TYPE, true)
            .build();
        let method = AstNode::builder(NodeKind::Method, loc())
            .name("run")
            .child(local)
            .build();
        let class = AstNode::builder(NodeKind::Class, loc())
            .name("A")
            .children([method, untyped, malformed])
            .build();

        let contribution = GraphBuilder::new().extract(&class);
        assert!(contribution
            .declarations
            .iter()
            .all(|d| d.id != "Svc.java::A.run.w"));
        assert_eq!(contribution.references.len(), 1);
        assert_eq!(contribution.references[0].source, "Svc.java::A.run");
        assert_eq!(contribution.references[0].target_name, "Worker");
        assert_eq!(contribution.counters.skipped_slots, 2);
    }
}
