//! JavaScript and TypeScript share one lowering; TypeScript-only syntax
//! (interfaces, type annotations, `implements`) simply never appears in JS trees.

use super::{named_children, scan_body, type_parameter_names, Cx, Visit};
use crate::ast::{attr, AstNode, NodeKind};
use tree_sitter::Node;

const CLASS_DECLARATIONS: &[&str] = &["class_declaration", "abstract_class_declaration", "class"];
const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];
const MODIFIER_TOKENS: &[&str] = &[
    "static", "async", "get", "set", "readonly", "abstract", "override", "declare", "*",
];

pub(super) fn lower(cx: &Cx<'_>, root: Node<'_>) -> Vec<AstNode> {
    let mut out = Vec::new();
    items(cx, root, &mut out);
    out
}

fn items(cx: &Cx<'_>, container: Node<'_>, out: &mut Vec<AstNode>) {
    for item in named_children(container) {
        match item.kind() {
            "import_statement" => {
                let path = cx
                    .field(item, "source")
                    .unwrap_or_default()
                    .trim_matches(|c| c == '"' || c == '\'');
                out.push(
                    cx.node(NodeKind::Statement, item)
                        .attr(attr::DECLARATION, "import")
                        .attr(attr::PATH, path)
                        .build(),
                );
            }
            "export_statement" => {
                if let Some(decl) = item.child_by_field_name("declaration") {
                    out.extend(declaration(cx, decl));
                }
            }
            _ => out.extend(declaration(cx, item)),
        }
    }
}

fn declaration(cx: &Cx<'_>, node: Node<'_>) -> Vec<AstNode> {
    match node.kind() {
        kind if CLASS_DECLARATIONS.contains(&kind) => vec![class(cx, node)],
        "interface_declaration" => vec![interface(cx, node)],
        "enum_declaration" => vec![cx
            .node(NodeKind::Class, node)
            .maybe_name(cx.field(node, "name").map(str::to_string))
            .attr(attr::DECLARATION, "enum")
            .build()],
        "type_alias_declaration" => vec![cx
            .node(NodeKind::Class, node)
            .maybe_name(cx.field(node, "name").map(str::to_string))
            .attr(attr::DECLARATION, "type_alias")
            .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, node))
            .maybe_attr(
                attr::SUPERCLASS,
                node.child_by_field_name("value").map(|v| cx.type_text(v)),
            )
            .build()],
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            vec![function(cx, node, None, "function")]
        }
        "lexical_declaration" | "variable_declaration" => declarators(cx, node, "variable"),
        _ => Vec::new(),
    }
}

/// Text of a `type_annotation` without its leading `:`
fn annotation(cx: &Cx<'_>, node: Option<Node<'_>>) -> Option<String> {
    let node = node?;
    let text = cx.text(node).trim_start().trim_start_matches(':');
    let text = super::normalize_type(text);
    (!text.is_empty()).then_some(text)
}

fn modifiers(cx: &Cx<'_>, node: Node<'_>) -> Vec<String> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|c| c.kind() == "accessibility_modifier" || MODIFIER_TOKENS.contains(&c.kind()))
        .map(|c| cx.text(c).to_string())
        .collect()
}

fn class(cx: &Cx<'_>, node: Node<'_>) -> AstNode {
    let mut superclass = None;
    let mut interfaces = Vec::new();
    if let Some(heritage) = named_children(node)
        .into_iter()
        .find(|c| c.kind() == "class_heritage")
    {
        for clause in named_children(heritage) {
            match clause.kind() {
                "extends_clause" => {
                    superclass = clause.child_by_field_name("value").map(|v| cx.type_text(v));
                }
                "implements_clause" => {
                    interfaces.extend(named_children(clause).into_iter().map(|t| cx.type_text(t)));
                }
                // JavaScript: `class_heritage` holds the extended expression directly.
                _ if superclass.is_none() => superclass = Some(cx.type_text(clause)),
                _ => {}
            }
        }
    }

    let mut members = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(body) {
            match member.kind() {
                "method_definition" | "method_signature" | "abstract_method_signature" => {
                    let declaration = match cx.field(member, "name") {
                        Some("constructor") => "constructor",
                        _ => "method",
                    };
                    members.push(function(cx, member, None, declaration));
                }
                "public_field_definition" | "field_definition" => {
                    let name = cx
                        .field(member, "name")
                        .or_else(|| cx.field(member, "property"))
                        .map(str::to_string);
                    members.push(
                        cx.node(NodeKind::Variable, member)
                            .maybe_name(name)
                            .attr(attr::DECLARATION, "field")
                            .maybe_attr(attr::TYPE, annotation(cx, member.child_by_field_name("type")))
                            .list_attr(attr::MODIFIERS, modifiers(cx, member))
                            .build(),
                    );
                }
                _ => {}
            }
        }
    }

    cx.node(NodeKind::Class, node)
        .maybe_name(cx.field(node, "name").map(str::to_string))
        .attr(attr::DECLARATION, "class")
        .maybe_attr(attr::SUPERCLASS, superclass)
        .list_attr(attr::INTERFACES, interfaces)
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, node))
        .list_attr(attr::MODIFIERS, modifiers(cx, node))
        .children(members)
        .build()
}

fn interface(cx: &Cx<'_>, node: Node<'_>) -> AstNode {
    let extends: Vec<String> = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "extends_type_clause")
        .flat_map(named_children)
        .map(|t| cx.type_text(t))
        .collect();

    let mut members = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(body) {
            match member.kind() {
                "method_signature" => members.push(function(cx, member, None, "method")),
                "property_signature" => members.push(
                    cx.node(NodeKind::Variable, member)
                        .maybe_name(cx.field(member, "name").map(str::to_string))
                        .attr(attr::DECLARATION, "field")
                        .maybe_attr(attr::TYPE, annotation(cx, member.child_by_field_name("type")))
                        .build(),
                ),
                _ => {}
            }
        }
    }

    cx.node(NodeKind::Class, node)
        .maybe_name(cx.field(node, "name").map(str::to_string))
        .attr(attr::DECLARATION, "interface")
        .list_attr(attr::INTERFACES, extends)
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, node))
        .children(members)
        .build()
}

/// Method for a function-like node; `name` overrides the node's own name field
/// (arrow functions take the name of the variable they are bound to).
fn function(cx: &Cx<'_>, node: Node<'_>, name: Option<&str>, declaration: &str) -> AstNode {
    let mut names = Vec::new();
    let mut types = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        for param in named_children(params) {
            let (pname, ty) = match param.kind() {
                "required_parameter" | "optional_parameter" => (
                    cx.field(param, "pattern").unwrap_or_default(),
                    annotation(cx, param.child_by_field_name("type")),
                ),
                "assignment_pattern" => (cx.field(param, "left").unwrap_or_default(), None),
                "identifier" | "rest_pattern" | "object_pattern" | "array_pattern" => {
                    (cx.text(param), None)
                }
                _ => continue,
            };
            names.push(super::normalize_type(pname));
            types.push(ty.unwrap_or_default());
        }
    } else if let Some(single) = node.child_by_field_name("parameter") {
        // `x => ...`
        names.push(cx.text(single).to_string());
        types.push(String::new());
    }

    let mut body_nodes = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        body_items(cx, body, &mut body_nodes);
    }

    let name = name
        .map(str::to_string)
        .or_else(|| cx.field(node, "name").map(str::to_string));
    cx.node(NodeKind::Method, node)
        .maybe_name(name)
        .attr(attr::DECLARATION, declaration)
        .list_attr(attr::PARAMETERS, names)
        .list_attr(attr::PARAMETER_TYPES, types)
        .maybe_attr(attr::RETURN_TYPE, annotation(cx, node.child_by_field_name("return_type")))
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, node))
        .list_attr(attr::MODIFIERS, modifiers(cx, node))
        .children(body_nodes)
        .build()
}

/// `const a: T = ..., b = () => ...`: Variables, or Methods for function values
fn declarators(cx: &Cx<'_>, node: Node<'_>, declaration: &str) -> Vec<AstNode> {
    named_children(node)
        .into_iter()
        .filter(|d| d.kind() == "variable_declarator")
        .map(|d| {
            let name = cx.field(d, "name");
            match d.child_by_field_name("value") {
                Some(value) if FUNCTION_VALUES.contains(&value.kind()) => {
                    function(cx, value, name, "function")
                }
                _ => cx
                    .node(NodeKind::Variable, d)
                    .maybe_name(name.map(str::to_string))
                    .attr(attr::DECLARATION, declaration)
                    .maybe_attr(attr::TYPE, annotation(cx, d.child_by_field_name("type")))
                    .build(),
            }
        })
        .collect()
}

fn body_items(cx: &Cx<'_>, body: Node<'_>, out: &mut Vec<AstNode>) {
    scan_body(body, out, &mut |node| match node.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut locals = declarators(cx, node, "local");
            let has_function = locals.iter().any(|l| l.kind() == NodeKind::Method);
            let emitted = match locals.len() {
                0 => return Visit::Descend,
                1 => locals.remove(0),
                _ => cx
                    .node(NodeKind::Statement, node)
                    .attr(attr::DECLARATION, "local_group")
                    .children(locals)
                    .build(),
            };
            if has_function {
                Visit::Emit(emitted)
            } else {
                Visit::EmitAndDescend(emitted)
            }
        }
        "call_expression" | "new_expression" => {
            let field = if node.kind() == "new_expression" {
                "constructor"
            } else {
                "function"
            };
            let callee = cx.field(node, field).map(super::normalize_type).unwrap_or_default();
            let name = callee.rsplit(['.', '?']).next().unwrap_or_default().to_string();
            Visit::EmitAndDescend(
                cx.node(NodeKind::Expression, node)
                    .name(name)
                    .attr(attr::CALLEE, callee)
                    .build(),
            )
        }
        kind if CLASS_DECLARATIONS.contains(&kind) && kind != "class" => Visit::Emit(class(cx, node)),
        "function_declaration" | "generator_function_declaration" => {
            Visit::Emit(function(cx, node, None, "function"))
        }
        // Anonymous callbacks belong to no named declaration.
        "arrow_function" | "function_expression" | "function" | "class" => Visit::Skip,
        _ => Visit::Descend,
    });
}
