use crate::context::ProjectContext;
use context_graph::{qualified_id, DependencyGraph, NodeId};
use context_parser::{attr, AstNode, AttrValue, NodeKind, SourceLocation};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

const EXACT_NAME: f64 = 1.0;
const NAME_PREFIX: f64 = 0.8;
const NAME_SUBSTRING: f64 = 0.6;
const ATTRIBUTE: f64 = 0.4;

/// Local related-code lookup over names, attributes and graph adjacency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedCodeQuery {
    pub text: String,
    /// Falls back to `EngineConfig::related_max_results`
    pub max_results: Option<usize>,
    /// Falls back to `EngineConfig::related_neighbor_depth`
    pub neighbor_depth: Option<usize>,
}

impl RelatedCodeQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_results: None,
            neighbor_depth: None,
        }
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    #[must_use]
    pub fn with_neighbor_depth(mut self, depth: usize) -> Self {
        self.neighbor_depth = Some(depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchReason {
    ExactName,
    NamePrefix,
    NameSubstring,
    Attribute { key: String },
    /// Reached from a direct match through dependencies or dependents
    Neighbor { via: NodeId, distance: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedReference {
    pub id: NodeId,
    pub name: String,
    pub kind: Option<NodeKind>,
    pub file_path: Option<String>,
    pub location: Option<SourceLocation>,
    pub score: f64,
    pub reason: MatchReason,
}

pub(crate) fn find_related(
    context: &ProjectContext,
    query: &RelatedCodeQuery,
    default_max_results: usize,
    default_depth: usize,
) -> Vec<RelatedReference> {
    let needle = query.text.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let max_results = query.max_results.unwrap_or(default_max_results);
    let depth = query.neighbor_depth.unwrap_or(default_depth);
    let graph = context.graph();

    let mut hits = Hits::default();
    for node in graph.nodes() {
        let name = node.name.to_lowercase();
        if name == needle {
            hits.offer(&node.id, EXACT_NAME, MatchReason::ExactName);
        } else if name.starts_with(&needle) {
            hits.offer(&node.id, NAME_PREFIX, MatchReason::NamePrefix);
        } else if name.contains(&needle) {
            hits.offer(&node.id, NAME_SUBSTRING, MatchReason::NameSubstring);
        }
    }
    for result in context.parse_results() {
        if let Some(root) = result.root_node() {
            let mut walk = AttributeWalk {
                file_path: root.location().file_path.to_string(),
                needle: &needle,
                graph,
                scope: Vec::new(),
                hits: &mut hits,
            };
            walk.visit(root, false);
        }
    }

    let seeds: Vec<(NodeId, f64)> = hits
        .scores
        .iter()
        .map(|(id, (score, _))| (id.clone(), *score))
        .collect();
    for (seed, score) in seeds {
        expand(graph, &seed, score, depth, &mut hits);
    }

    let mut references: Vec<RelatedReference> = hits
        .scores
        .into_iter()
        .filter_map(|(id, (score, reason))| {
            let node = graph.node(&id)?;
            Some(RelatedReference {
                name: node.name.clone(),
                kind: node.kind,
                file_path: node.file_path.clone(),
                location: node.location.clone(),
                id,
                score,
                reason,
            })
        })
        .collect();
    references.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    references.truncate(max_results);
    references
}

#[derive(Default)]
struct Hits {
    scores: BTreeMap<NodeId, (f64, MatchReason)>,
}

impl Hits {
    /// Keep the best score per id; ties keep the earlier reason
    fn offer(&mut self, id: &str, score: f64, reason: MatchReason) {
        match self.scores.get_mut(id) {
            Some(existing) if existing.0 >= score => {}
            Some(existing) => *existing = (score, reason),
            None => {
                self.scores.insert(id.to_string(), (score, reason));
            }
        }
    }
}

/// Breadth-first over both edge directions; relevance is `score / (distance + 1)`
fn expand(graph: &DependencyGraph, seed: &str, score: f64, depth: usize, hits: &mut Hits) {
    let mut visited = std::collections::BTreeSet::from([seed.to_string()]);
    let mut queue = VecDeque::from([(seed.to_string(), 0usize)]);
    while let Some((id, distance)) = queue.pop_front() {
        if distance == depth {
            continue;
        }
        let neighbors: Vec<&str> = graph
            .dependency_ids(&id)
            .chain(graph.dependent_ids(&id))
            .collect();
        for neighbor in neighbors {
            if !visited.insert(neighbor.to_string()) {
                continue;
            }
            let distance = distance + 1;
            hits.offer(
                neighbor,
                score / (distance as f64 + 1.0),
                MatchReason::Neighbor {
                    via: seed.to_string(),
                    distance,
                },
            );
            queue.push_back((neighbor.to_string(), distance));
        }
    }
}

/// Rebuilds graph ids the way extraction does, so attribute hits land on graph nodes
struct AttributeWalk<'a> {
    file_path: String,
    needle: &'a str,
    graph: &'a DependencyGraph,
    scope: Vec<String>,
    hits: &'a mut Hits,
}

impl AttributeWalk<'_> {
    fn visit(&mut self, node: &AstNode, has_owner: bool) {
        let is_local = node.kind() == NodeKind::Variable
            && node.text_attribute(attr::DECLARATION) == Some("local")
            && has_owner;

        match (node.kind().is_declaration(), node.name()) {
            (true, Some(name)) if !is_local => {
                self.scope.push(name.to_string());
                let id = qualified_id(&self.file_path, &self.scope.join("."));
                if self.graph.contains(&id) {
                    if let Some(key) = matching_attribute(node, self.needle) {
                        self.hits.offer(&id, ATTRIBUTE, MatchReason::Attribute { key });
                    }
                }
                for child in node.children() {
                    self.visit(child, true);
                }
                self.scope.pop();
            }
            _ => {
                for child in node.children() {
                    self.visit(child, has_owner);
                }
            }
        }
    }
}

fn matching_attribute(node: &AstNode, needle: &str) -> Option<String> {
    node.attributes().iter().find_map(|(key, value)| {
        let hit = match value {
            AttrValue::Text(text) => text.to_lowercase().contains(needle),
            AttrValue::List(items) => items.iter().any(|i| i.to_lowercase().contains(needle)),
            AttrValue::Flag(_) | AttrValue::Number(_) => false,
        };
        hit.then(|| key.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FileState;
    use context_graph::GraphBuilder;
    use context_parser::{ParseResult, SourceLocation};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn context_of(roots: Vec<AstNode>) -> ProjectContext {
        let graph = GraphBuilder::new().build(&roots);
        let mut context = ProjectContext {
            graph: Arc::new(graph),
            ..ProjectContext::default()
        };
        for root in roots {
            let path = root.location().file_path.to_string();
            let result = ParseResult::new(
                Some(root),
                "java",
                path.clone(),
                Vec::new(),
                Vec::new(),
                Duration::ZERO,
                1,
                1,
            );
            context.files.insert(path, FileState::parsed(Arc::new(result)));
        }
        context
    }

    fn class(path: &str, name: &str, superclass: Option<&str>) -> AstNode {
        let location = SourceLocation::file_start(path);
        let class = AstNode::builder(NodeKind::Class, location.clone())
            .name(name)
            .maybe_attr(attr::SUPERCLASS, superclass.map(str::to_string))
            .build();
        AstNode::builder(NodeKind::Statement, location)
            .attr(attr::LANGUAGE, "java")
            .child(class)
            .build()
    }

    #[test]
    fn name_matches_rank_above_neighbors() {
        let context = context_of(vec![
            class("Order.java", "Order", Some("Entity")),
            class("OrderService.java", "OrderService", Some("Order")),
            class("Billing.java", "Billing", Some("OrderService")),
        ]);

        let results = find_related(&context, &RelatedCodeQuery::new("order"), 20, 1);
        let ranked: Vec<(&str, f64)> = results.iter().map(|r| (r.id.as_str(), r.score)).collect();
        assert_eq!(
            ranked,
            vec![
                ("Order.java::Order", 1.0),
                ("OrderService.java::OrderService", 0.8),
                ("Entity", 0.5),
                ("Billing.java::Billing", 0.4),
            ]
        );
        assert_eq!(
            results[2].reason,
            MatchReason::Neighbor {
                via: "Order.java::Order".to_string(),
                distance: 1
            }
        );
    }

    #[test]
    fn attribute_values_are_searched() {
        let context = context_of(vec![class("Cart.java", "Cart", Some("Basket"))]);
        let results = find_related(
            &context,
            &RelatedCodeQuery::new("bask").with_neighbor_depth(0),
            20,
            1,
        );
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Basket", "Cart.java::Cart"]);
        assert_eq!(
            results[1].reason,
            MatchReason::Attribute {
                key: "superclass".to_string()
            }
        );
    }

    #[test]
    fn blank_query_finds_nothing_and_limit_applies() {
        let context = context_of(vec![
            class("A.java", "Alpha", None),
            class("B.java", "Alphabet", None),
        ]);
        assert!(find_related(&context, &RelatedCodeQuery::new("  "), 20, 1).is_empty());
        let results = find_related(
            &context,
            &RelatedCodeQuery::new("alpha").with_max_results(1),
            20,
            1,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "A.java::Alpha");
    }
}
