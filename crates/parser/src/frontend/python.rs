use super::{named_children, scan_body, Cx, Visit};
use crate::ast::{attr, AstNode, NodeKind};
use tree_sitter::Node;

pub(super) fn lower(cx: &Cx<'_>, root: Node<'_>) -> Vec<AstNode> {
    let mut out = Vec::new();
    block(cx, root, Scope::Module, &mut out);
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Module,
    Class,
}

fn block(cx: &Cx<'_>, container: Node<'_>, scope: Scope, out: &mut Vec<AstNode>) {
    for stmt in named_children(container) {
        match stmt.kind() {
            "import_statement" | "import_from_statement" => out.push(import(cx, stmt)),
            "class_definition" => out.push(class(cx, stmt, Vec::new())),
            "function_definition" => out.push(function(cx, stmt, scope, Vec::new())),
            "decorated_definition" => {
                if let Some(node) = decorated(cx, stmt, scope) {
                    out.push(node);
                }
            }
            "expression_statement" => {
                for expr in named_children(stmt) {
                    if let Some(var) = assignment(cx, expr, field_label(scope)) {
                        out.push(var);
                    }
                }
            }
            _ => {}
        }
    }
}

fn field_label(scope: Scope) -> &'static str {
    match scope {
        Scope::Module => "global",
        Scope::Class => "field",
    }
}

fn import(cx: &Cx<'_>, stmt: Node<'_>) -> AstNode {
    let path = match stmt.kind() {
        "import_from_statement" => cx.field(stmt, "module_name").unwrap_or_default(),
        _ => cx.field(stmt, "name").unwrap_or_default(),
    };
    let path = path.split(" as ").next().unwrap_or_default().trim();
    cx.node(NodeKind::Statement, stmt)
        .attr(attr::DECLARATION, "import")
        .attr(attr::PATH, path)
        .build()
}

fn decorated(cx: &Cx<'_>, stmt: Node<'_>, scope: Scope) -> Option<AstNode> {
    let decorators: Vec<String> = named_children(stmt)
        .into_iter()
        .filter(|d| d.kind() == "decorator")
        .map(|d| {
            let text = cx.text(d).trim_start_matches('@');
            text.split('(').next().unwrap_or(text).trim().to_string()
        })
        .collect();
    let definition = stmt.child_by_field_name("definition")?;
    match definition.kind() {
        "class_definition" => Some(class(cx, definition, decorators)),
        "function_definition" => Some(function(cx, definition, scope, decorators)),
        _ => None,
    }
}

fn class(cx: &Cx<'_>, node: Node<'_>, decorators: Vec<String>) -> AstNode {
    // First positional base is the superclass, the rest are mixins/interfaces.
    let mut bases: Vec<String> = node
        .child_by_field_name("superclasses")
        .map(|args| {
            named_children(args)
                .into_iter()
                .filter(|a| !matches!(a.kind(), "keyword_argument" | "comment"))
                .map(|a| cx.type_text(a))
                .collect()
        })
        .unwrap_or_default();
    let superclass = (!bases.is_empty()).then(|| bases.remove(0));

    let mut members = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        block(cx, body, Scope::Class, &mut members);
    }

    cx.node(NodeKind::Class, node)
        .maybe_name(cx.field(node, "name").map(str::to_string))
        .attr(attr::DECLARATION, "class")
        .maybe_attr(attr::SUPERCLASS, superclass)
        .list_attr(attr::INTERFACES, bases)
        .list_attr(attr::MODIFIERS, decorators)
        .children(members)
        .build()
}

fn function(cx: &Cx<'_>, node: Node<'_>, scope: Scope, mut modifiers: Vec<String>) -> AstNode {
    if node.child(0).is_some_and(|first| first.kind() == "async") {
        modifiers.insert(0, "async".to_string());
    }

    let mut names = Vec::new();
    let mut types = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        for (index, param) in named_children(params).into_iter().enumerate() {
            let (name, ty) = match param.kind() {
                "identifier" => (cx.text(param).to_string(), String::new()),
                "typed_parameter" => (
                    named_children(param)
                        .into_iter()
                        .find(|c| c.kind() == "identifier")
                        .map(|c| cx.text(c).to_string())
                        .unwrap_or_default(),
                    param
                        .child_by_field_name("type")
                        .map(|t| cx.type_text(t))
                        .unwrap_or_default(),
                ),
                "default_parameter" | "typed_default_parameter" => (
                    cx.field(param, "name").unwrap_or_default().to_string(),
                    param
                        .child_by_field_name("type")
                        .map(|t| cx.type_text(t))
                        .unwrap_or_default(),
                ),
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (cx.text(param).to_string(), String::new())
                }
                _ => continue,
            };
            if scope == Scope::Class && index == 0 && (name == "self" || name == "cls") {
                continue;
            }
            names.push(name);
            types.push(ty);
        }
    }

    let mut body_nodes = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        body_items(cx, body, &mut body_nodes);
    }

    let declaration = match (scope, cx.field(node, "name")) {
        (Scope::Class, Some("__init__")) => "constructor",
        (Scope::Class, _) => "method",
        (Scope::Module, _) => "function",
    };

    cx.node(NodeKind::Method, node)
        .maybe_name(cx.field(node, "name").map(str::to_string))
        .attr(attr::DECLARATION, declaration)
        .list_attr(attr::PARAMETERS, names)
        .list_attr(attr::PARAMETER_TYPES, types)
        .maybe_attr(
            attr::RETURN_TYPE,
            node.child_by_field_name("return_type").map(|t| cx.type_text(t)),
        )
        .list_attr(attr::MODIFIERS, modifiers)
        .children(body_nodes)
        .build()
}

/// `name: T = value` or `name = value` with a plain identifier target
fn assignment(cx: &Cx<'_>, expr: Node<'_>, declaration: &str) -> Option<AstNode> {
    if expr.kind() != "assignment" {
        return None;
    }
    let left = expr.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    Some(
        cx.node(NodeKind::Variable, expr)
            .name(cx.text(left))
            .attr(attr::DECLARATION, declaration)
            .maybe_attr(
                attr::TYPE,
                expr.child_by_field_name("type").map(|t| cx.type_text(t)),
            )
            .build(),
    )
}

fn body_items(cx: &Cx<'_>, body: Node<'_>, out: &mut Vec<AstNode>) {
    scan_body(body, out, &mut |node| match node.kind() {
        "assignment" => match assignment(cx, node, "local") {
            Some(var) => Visit::EmitAndDescend(var),
            None => Visit::Descend,
        },
        "call" => {
            let callee = cx
                .field(node, "function")
                .map(super::normalize_type)
                .unwrap_or_default();
            let name = callee.rsplit('.').next().unwrap_or_default().to_string();
            Visit::EmitAndDescend(
                cx.node(NodeKind::Expression, node)
                    .name(name)
                    .attr(attr::CALLEE, callee)
                    .build(),
            )
        }
        "class_definition" => Visit::Emit(class(cx, node, Vec::new())),
        "function_definition" => Visit::Emit(function(cx, node, Scope::Module, Vec::new())),
        "decorated_definition" => match decorated(cx, node, Scope::Module) {
            Some(nested) => Visit::Emit(nested),
            None => Visit::Skip,
        },
        "lambda" => Visit::Skip,
        _ => Visit::Descend,
    });
}
