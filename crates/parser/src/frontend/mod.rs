//! Tree-sitter front-ends lowering concrete syntax into [`AstNode`] trees.
//!
//! Fatal/recoverable boundary shared by every language:
//!
//! | condition | outcome |
//! |---|---|
//! | unbalanced `()[]{}` (lexical pre-scan) while tree-sitter also reports an error | `ParseError` (`UnbalancedDelimiter`) |
//! | tree-sitter `ERROR` node | `ParseError` (`Syntax`) |
//! | tree-sitter `MISSING` token other than `;` | `ParseError` (`MissingToken`) |
//! | tree-sitter `MISSING ";"` | `ParseWarning` (statement boundary inferred) |
//! | source over `max_source_bytes` | `ParseError` (`ResourceLimit`), no tree |
//! | tree-sitter timeout | `ParseError` (`Timeout`), no tree |
//!
//! Every outcome except the last two still carries a best-effort tree.
//!
//! The pre-scan is lexical, so JSX text such as `<p>Don't</p>` can fool it;
//! its findings only stand when the grammar agrees the input is broken.

mod java;
mod javascript;
mod python;
mod rust;

use crate::ast::{attr, AstNode, NodeKind, SourceLocation};
use crate::config::ParserConfig;
use crate::delimiters;
use crate::language::{Grammar, Language};
use crate::types::{ParseError, ParseErrorKind, ParseResult, ParseWarning};
use std::sync::Arc;
use std::time::Instant;
use tree_sitter::Node;

const MAX_DIAGNOSTICS: usize = 64;
const SNIPPET_CHARS: usize = 40;

/// Lowering context: source text plus the file every location points at
pub(crate) struct Cx<'a> {
    pub src: &'a str,
    pub file: Arc<str>,
}

impl<'a> Cx<'a> {
    pub fn new(src: &'a str, file_path: &str) -> Self {
        Self {
            src,
            file: Arc::from(file_path),
        }
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        self.src.get(node.byte_range()).unwrap_or("")
    }

    pub fn loc(&self, node: Node<'_>) -> SourceLocation {
        let start = node.start_position();
        let end = node.end_position();
        SourceLocation::new(
            self.file.clone(),
            start.row + 1,
            start.column + 1,
            end.row + 1,
            end.column + 1,
        )
    }

    /// Text of a named field child
    pub fn field(&self, node: Node<'_>, name: &str) -> Option<&'a str> {
        node.child_by_field_name(name).map(|child| self.text(child))
    }

    /// Field text with internal whitespace collapsed (`Map< K ,V >` → `Map<K, V>` style)
    pub fn type_text(&self, node: Node<'_>) -> String {
        normalize_type(self.text(node))
    }

    pub fn node(&self, kind: NodeKind, node: Node<'_>) -> crate::ast::NodeBuilder {
        AstNode::builder(kind, self.loc(node))
    }
}

/// Collapse whitespace runs in a type expression
pub(crate) fn normalize_type(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Named children, collected so callers can iterate without holding a cursor
pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// First named child of a given kind
pub(crate) fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|c| c.kind() == kind)
}

/// Names declared in a `type_parameters` field: `<T, K extends Key>`, `<'a, T: Ord>`
pub(crate) fn type_parameter_names(cx: &Cx<'_>, node: Node<'_>) -> Vec<String> {
    let Some(params) = node.child_by_field_name("type_parameters") else {
        return Vec::new();
    };
    named_children(params)
        .into_iter()
        .filter_map(|param| {
            let name = match param.kind() {
                "lifetime" => return None,
                "type_identifier" | "identifier" => param,
                _ => param
                    .child_by_field_name("name")
                    .or_else(|| param.child_by_field_name("left"))
                    .or_else(|| {
                        named_children(param)
                            .into_iter()
                            .find(|c| matches!(c.kind(), "type_identifier" | "identifier"))
                    })?,
            };
            let text = cx.text(name);
            (!text.is_empty() && !text.starts_with('\'')).then(|| text.to_string())
        })
        .collect()
}

/// Decision taken for one syntax node while scanning a body
pub(crate) enum Visit {
    /// Emit a node and keep scanning its syntax children
    EmitAndDescend(AstNode),
    /// Emit a node and skip its syntax subtree
    Emit(AstNode),
    Descend,
    Skip,
}

/// Scan a body subtree, emitting AST nodes chosen by `visit`
pub(crate) fn scan_body<F>(node: Node<'_>, out: &mut Vec<AstNode>, visit: &mut F)
where
    F: FnMut(Node<'_>) -> Visit,
{
    for child in named_children(node) {
        match visit(child) {
            Visit::EmitAndDescend(ast) => {
                out.push(ast);
                scan_body(child, out, visit);
            }
            Visit::Emit(ast) => out.push(ast),
            Visit::Descend => scan_body(child, out, visit),
            Visit::Skip => {}
        }
    }
}

/// Parse `text` with `grammar`, producing a complete [`ParseResult`]
pub(crate) fn parse_source(
    grammar: impl Into<Grammar>,
    text: &str,
    file_path: &str,
    config: &ParserConfig,
) -> ParseResult {
    let started = Instant::now();
    let grammar = grammar.into();
    let language = grammar.language;
    let lang_id = language.as_str();

    if text.len() > config.max_source_bytes {
        let error = ParseError::new(
            ParseErrorKind::ResourceLimit,
            format!(
                "source is {} bytes, over the {} byte limit",
                text.len(),
                config.max_source_bytes
            ),
            SourceLocation::file_start(file_path),
        );
        return ParseResult::failure(lang_id, file_path, error, started.elapsed());
    }

    let cx = Cx::new(text, file_path);
    let mut parser = match grammar.new_parser() {
        Ok(parser) => parser,
        Err(e) => {
            log::error!("{} grammar unavailable: {e}", grammar.id());
            let error = ParseError::new(
                ParseErrorKind::Syntax,
                e.to_string(),
                SourceLocation::file_start(file_path),
            );
            return ParseResult::failure(lang_id, file_path, error, started.elapsed());
        }
    };
    if config.timeout_micros > 0 {
        parser.set_timeout_micros(config.timeout_micros);
    }

    let Some(tree) = parser.parse(text, None) else {
        log::warn!("{file_path}: tree-sitter gave up after {:?}", started.elapsed());
        return ParseResult::timeout(lang_id, file_path, started.elapsed());
    };
    let syntax_root = tree.root_node();

    let mut errors = delimiter_errors(&cx, text, language, syntax_root);
    let (syntax_errors, warnings, syntax_node_count) = collect_diagnostics(&cx, syntax_root);
    errors.extend(syntax_errors);
    errors.sort_by_key(|e| (e.location.start_line, e.location.start_column));
    errors.truncate(MAX_DIAGNOSTICS);

    let declarations = match language {
        Language::Java => java::lower(&cx, syntax_root),
        Language::Rust => rust::lower(&cx, syntax_root),
        Language::Python => python::lower(&cx, syntax_root),
        Language::JavaScript | Language::TypeScript => javascript::lower(&cx, syntax_root),
    };

    let root = cx
        .node(NodeKind::Statement, syntax_root)
        .attr(attr::LANGUAGE, lang_id)
        .attr(attr::DECLARATION, "compilation_unit")
        .children(declarations)
        .build();

    let line_count = text.lines().count();
    ParseResult::new(
        Some(root),
        lang_id,
        file_path,
        errors,
        warnings,
        started.elapsed(),
        line_count,
        syntax_node_count,
    )
}

/// Pre-scan findings, kept only when the syntax tree is flagged too
fn delimiter_errors(
    cx: &Cx<'_>,
    text: &str,
    language: Language,
    root: Node<'_>,
) -> Vec<ParseError> {
    if !root.has_error() {
        return Vec::new();
    }
    delimiters::check(text, language)
        .into_iter()
        .map(|issue| {
            ParseError::new(
                ParseErrorKind::UnbalancedDelimiter,
                issue.message,
                SourceLocation::new(
                    cx.file.clone(),
                    issue.line,
                    issue.column,
                    issue.line,
                    issue.column + 1,
                ),
            )
        })
        .collect()
}

/// Cheap success predicate: tree-sitter error flags plus delimiter scan, no AST
pub(crate) fn is_valid(grammar: Grammar, text: &str, config: &ParserConfig) -> bool {
    if text.len() > config.max_source_bytes {
        return false;
    }
    let Ok(mut parser) = grammar.new_parser() else {
        return false;
    };
    if config.timeout_micros > 0 {
        parser.set_timeout_micros(config.timeout_micros);
    }
    let Some(tree) = parser.parse(text, None) else {
        return false;
    };
    let root = tree.root_node();
    if !root.has_error() {
        return true;
    }
    if !delimiters::check(text, grammar.language).is_empty() {
        return false;
    }
    let cx = Cx::new(text, "");
    collect_diagnostics(&cx, root).0.is_empty()
}

/// Walk the syntax tree once: count nodes, turn ERROR/MISSING into diagnostics
fn collect_diagnostics(cx: &Cx<'_>, root: Node<'_>) -> (Vec<ParseError>, Vec<ParseWarning>, usize) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut count = 0;
    let mut stack: Vec<(Node<'_>, bool)> = vec![(root, false)];

    while let Some((node, inside_error)) = stack.pop() {
        count += 1;

        if !inside_error {
            if node.is_missing() {
                let token = node.kind();
                if token == ";" {
                    warnings.push(ParseWarning::new(
                        "missing `;` inferred at statement boundary",
                        cx.loc(node),
                    ));
                } else {
                    errors.push(ParseError::new(
                        ParseErrorKind::MissingToken,
                        format!("missing `{token}`"),
                        cx.loc(node),
                    ));
                }
            } else if node.is_error() {
                let snippet: String = cx.text(node).chars().take(SNIPPET_CHARS).collect();
                errors.push(ParseError::new(
                    ParseErrorKind::Syntax,
                    format!("syntax error near `{}`", normalize_type(&snippet)),
                    cx.loc(node),
                ));
            }
        }

        let nested_error = inside_error || node.is_error();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push((child, nested_error));
        }
    }

    warnings.sort_by_key(|w| (w.location.start_line, w.location.start_column));
    warnings.truncate(MAX_DIAGNOSTICS);
    (errors, warnings, count)
}
