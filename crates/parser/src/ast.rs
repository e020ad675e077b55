//! Canonical AST shared by every language front-end.
//!
//! Nodes are immutable once built: fields are private, there are no `&mut`
//! accessors, and a re-parse always produces a fresh tree. Kind-specific
//! helpers ([`ClassView`], [`MethodView`], [`VariableView`]) are read-only
//! projections over `children` and `attributes`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Attribute keys written by the front-ends and read by the graph builder
pub mod attr {
    pub const LANGUAGE: &str = "language";
    pub const DECLARATION: &str = "declaration";
    pub const SUPERCLASS: &str = "superclass";
    pub const INTERFACES: &str = "interfaces";
    pub const TYPE: &str = "type";
    pub const PARAMETERS: &str = "parameters";
    pub const PARAMETER_TYPES: &str = "parameter_types";
    pub const RETURN_TYPE: &str = "return_type";
    pub const THROWS: &str = "throws";
    /// Generic parameters declared by a class or method (`T`, `K`)
    pub const TYPE_PARAMETERS: &str = "type_parameters";
    pub const MODIFIERS: &str = "modifiers";
    pub const PATH: &str = "path";
    pub const CALLEE: &str = "callee";
}

/// Node discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Class,
    Method,
    Variable,
    Expression,
    Statement,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Expression => "expression",
            Self::Statement => "statement",
        }
    }

    /// Kinds that declare something addressable by a qualified id
    pub const fn is_declaration(self) -> bool {
        matches!(self, Self::Class | Self::Method | Self::Variable)
    }
}

/// Attribute value attached to a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Number(i64),
    Text(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// File path plus 1-based line/column range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_path: Arc<str>,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceLocation {
    pub fn new(
        file_path: impl Into<Arc<str>>,
        start_line: usize,
        start_column: usize,
        end_line: usize,
        end_column: usize,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Location used for synthetic nodes and whole-file diagnostics
    pub fn file_start(file_path: impl Into<Arc<str>>) -> Self {
        Self::new(file_path, 1, 1, 1, 1)
    }

    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// Immutable AST node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstNode {
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    location: SourceLocation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<AstNode>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, AttrValue>,
}

impl AstNode {
    /// Start building a node
    pub fn builder(kind: NodeKind, location: SourceLocation) -> NodeBuilder {
        NodeBuilder {
            kind,
            name: None,
            location,
            children: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn children(&self) -> &[AstNode] {
        &self.children
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Text attribute, `None` when absent or of another shape
    pub fn text_attribute(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(AttrValue::as_text)
    }

    /// List attribute, empty when absent or of another shape
    pub fn list_attribute(&self, key: &str) -> &[String] {
        self.attribute(key)
            .and_then(AttrValue::as_list)
            .unwrap_or_default()
    }

    /// Direct children of the given kind, in source order
    pub fn find_children_by_kind(&self, kind: NodeKind) -> Vec<&AstNode> {
        self.children.iter().filter(|c| c.kind == kind).collect()
    }

    /// First direct child carrying `name`
    pub fn find_child_by_name(&self, name: &str) -> Option<&AstNode> {
        self.children.iter().find(|c| c.name() == Some(name))
    }

    /// Every node of `kind` in the subtree, pre-order
    pub fn find_descendants_by_kind(&self, kind: NodeKind) -> Vec<&AstNode> {
        let mut found = Vec::new();
        self.traverse(&mut |node, _| {
            if node.kind == kind {
                found.push(node);
            }
        });
        found
    }

    /// Pre-order walk; the visitor receives each node and its depth (root = 0)
    pub fn traverse<'a, F>(&'a self, visitor: &mut F)
    where
        F: FnMut(&'a AstNode, usize),
    {
        let mut stack: Vec<(&'a AstNode, usize)> = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            visitor(node, depth);
            for child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }

    /// Levels in the tree; a leaf has depth 1
    pub fn depth(&self) -> usize {
        let mut max = 0;
        self.traverse(&mut |_, depth| max = max.max(depth + 1));
        max
    }

    /// Nodes in the subtree including `self`
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |_, _| count += 1);
        count
    }

    pub fn as_class(&self) -> Option<ClassView<'_>> {
        (self.kind == NodeKind::Class).then_some(ClassView(self))
    }

    pub fn as_method(&self) -> Option<MethodView<'_>> {
        (self.kind == NodeKind::Method).then_some(MethodView(self))
    }

    pub fn as_variable(&self) -> Option<VariableView<'_>> {
        (self.kind == NodeKind::Variable).then_some(VariableView(self))
    }
}

/// Builder for [`AstNode`]; consumed by `build`, so a finished node cannot change
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    kind: NodeKind,
    name: Option<String>,
    location: SourceLocation,
    children: Vec<AstNode>,
    attributes: BTreeMap<String, AttrValue>,
}

impl NodeBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn maybe_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Set a text attribute only when a value is present
    #[must_use]
    pub fn maybe_attr(self, key: &str, value: Option<String>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }

    /// Set a list attribute only when non-empty
    #[must_use]
    pub fn list_attr(self, key: &str, values: Vec<String>) -> Self {
        if values.is_empty() {
            self
        } else {
            self.attr(key, values)
        }
    }

    #[must_use]
    pub fn child(mut self, child: AstNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = AstNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn build(self) -> AstNode {
        AstNode {
            kind: self.kind,
            name: self.name,
            location: self.location,
            children: self.children,
            attributes: self.attributes,
        }
    }
}

/// Read-only view over a `Class` node
#[derive(Debug, Clone, Copy)]
pub struct ClassView<'a>(&'a AstNode);

impl<'a> ClassView<'a> {
    pub fn node(&self) -> &'a AstNode {
        self.0
    }

    pub fn superclass(&self) -> Option<&'a str> {
        self.0.text_attribute(attr::SUPERCLASS)
    }

    pub fn interfaces(&self) -> &'a [String] {
        self.0.list_attribute(attr::INTERFACES)
    }

    pub fn methods(&self) -> impl Iterator<Item = &'a AstNode> {
        self.0.children.iter().filter(|c| c.kind == NodeKind::Method)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'a AstNode> {
        self.0.children.iter().filter(|c| c.kind == NodeKind::Variable)
    }

    pub fn nested_classes(&self) -> impl Iterator<Item = &'a AstNode> {
        self.0.children.iter().filter(|c| c.kind == NodeKind::Class)
    }
}

/// Read-only view over a `Method` node
#[derive(Debug, Clone, Copy)]
pub struct MethodView<'a>(&'a AstNode);

impl<'a> MethodView<'a> {
    pub fn node(&self) -> &'a AstNode {
        self.0
    }

    pub fn parameters(&self) -> &'a [String] {
        self.0.list_attribute(attr::PARAMETERS)
    }

    pub fn parameter_types(&self) -> &'a [String] {
        self.0.list_attribute(attr::PARAMETER_TYPES)
    }

    pub fn return_type(&self) -> Option<&'a str> {
        self.0.text_attribute(attr::RETURN_TYPE)
    }

    pub fn throws(&self) -> &'a [String] {
        self.0.list_attribute(attr::THROWS)
    }

    pub fn modifiers(&self) -> &'a [String] {
        self.0.list_attribute(attr::MODIFIERS)
    }

    /// Call-site expressions anywhere in the body
    pub fn calls(&self) -> Vec<&'a AstNode> {
        self.0.find_descendants_by_kind(NodeKind::Expression)
    }
}

/// Read-only view over a `Variable` node
#[derive(Debug, Clone, Copy)]
pub struct VariableView<'a>(&'a AstNode);

impl<'a> VariableView<'a> {
    pub fn node(&self) -> &'a AstNode {
        self.0
    }

    pub fn type_name(&self) -> Option<&'a str> {
        self.0.text_attribute(attr::TYPE)
    }
}
