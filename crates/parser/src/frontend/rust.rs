use super::{child_of_kind, named_children, scan_body, type_parameter_names, Cx, Visit};
use crate::ast::{attr, AstNode, NodeKind};
use tree_sitter::Node;

pub(super) fn lower(cx: &Cx<'_>, root: Node<'_>) -> Vec<AstNode> {
    let mut out = Vec::new();
    items(cx, root, &mut out);
    out
}

fn items(cx: &Cx<'_>, container: Node<'_>, out: &mut Vec<AstNode>) {
    for item in named_children(container) {
        if let Some(node) = item_node(cx, item) {
            out.push(node);
        }
    }
}

fn item_node(cx: &Cx<'_>, item: Node<'_>) -> Option<AstNode> {
    let node = match item.kind() {
        "use_declaration" => cx
            .node(NodeKind::Statement, item)
            .attr(attr::DECLARATION, "import")
            .attr(
                attr::PATH,
                cx.field(item, "argument").map(super::normalize_type).unwrap_or_default(),
            )
            .build(),
        "struct_item" | "union_item" => {
            let mut fields = Vec::new();
            if let Some(body) = item.child_by_field_name("body") {
                field_list(cx, body, &mut fields);
            }
            type_node(cx, item, item.kind().trim_end_matches("_item"))
                .children(fields)
                .build()
        }
        "enum_item" => {
            let mut variants = Vec::new();
            if let Some(body) = item.child_by_field_name("body") {
                for variant in named_children(body) {
                    if variant.kind() != "enum_variant" {
                        continue;
                    }
                    let mut payload = Vec::new();
                    if let Some(fields) = variant.child_by_field_name("body") {
                        field_list(cx, fields, &mut payload);
                    }
                    let types: Vec<String> = payload
                        .iter()
                        .filter_map(|f| f.text_attribute(attr::TYPE).map(str::to_string))
                        .collect();
                    variants.push(
                        cx.node(NodeKind::Variable, variant)
                            .maybe_name(cx.field(variant, "name").map(str::to_string))
                            .attr(attr::DECLARATION, "variant")
                            .maybe_attr(attr::TYPE, (!types.is_empty()).then(|| types.join(", ")))
                            .build(),
                    );
                }
            }
            type_node(cx, item, "enum").children(variants).build()
        }
        "trait_item" => {
            let bounds: Vec<String> = item
                .child_by_field_name("bounds")
                .map(|b| {
                    named_children(b)
                        .into_iter()
                        .filter(|t| t.kind() != "lifetime")
                        .map(|t| cx.type_text(t))
                        .collect()
                })
                .unwrap_or_default();
            let mut members = Vec::new();
            if let Some(body) = item.child_by_field_name("body") {
                items(cx, body, &mut members);
            }
            type_node(cx, item, "trait")
                .list_attr(attr::INTERFACES, bounds)
                .children(members)
                .build()
        }
        "impl_item" => {
            let target = item.child_by_field_name("type")?;
            let interfaces: Vec<String> = item
                .child_by_field_name("trait")
                .map(|t| vec![cx.type_text(t)])
                .unwrap_or_default();
            let mut members = Vec::new();
            if let Some(body) = item.child_by_field_name("body") {
                items(cx, body, &mut members);
            }
            cx.node(NodeKind::Class, item)
                .name(base_type_name(cx, target))
                .attr(attr::DECLARATION, "impl")
                .list_attr(attr::INTERFACES, interfaces)
                .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, item))
                .children(members)
                .build()
        }
        "function_item" | "function_signature_item" => function(cx, item),
        "mod_item" => {
            let mut members = Vec::new();
            if let Some(body) = item.child_by_field_name("body") {
                items(cx, body, &mut members);
            }
            // Modules are named scopes; they are modelled as Class so ids nest under them.
            type_node(cx, item, "module").children(members).build()
        }
        "const_item" | "static_item" => cx
            .node(NodeKind::Variable, item)
            .maybe_name(cx.field(item, "name").map(str::to_string))
            .attr(attr::DECLARATION, item.kind().trim_end_matches("_item"))
            .maybe_attr(attr::TYPE, item.child_by_field_name("type").map(|t| cx.type_text(t)))
            .list_attr(attr::MODIFIERS, modifiers(cx, item))
            .build(),
        "type_item" => type_node(cx, item, "type_alias")
            .maybe_attr(
                attr::SUPERCLASS,
                item.child_by_field_name("type").map(|t| cx.type_text(t)),
            )
            .build(),
        _ => return None,
    };
    Some(node)
}

fn type_node(cx: &Cx<'_>, item: Node<'_>, declaration: &str) -> crate::ast::NodeBuilder {
    cx.node(NodeKind::Class, item)
        .maybe_name(cx.field(item, "name").map(str::to_string))
        .attr(attr::DECLARATION, declaration)
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, item))
        .list_attr(attr::MODIFIERS, modifiers(cx, item))
}

/// `Foo` from `Foo`, `Foo<T>`, `crate::a::Foo` or `&Foo`
fn base_type_name(cx: &Cx<'_>, ty: Node<'_>) -> String {
    match ty.kind() {
        "generic_type" => ty
            .child_by_field_name("type")
            .map(|inner| base_type_name(cx, inner))
            .unwrap_or_else(|| cx.type_text(ty)),
        "scoped_type_identifier" => cx
            .field(ty, "name")
            .map(str::to_string)
            .unwrap_or_else(|| cx.type_text(ty)),
        "reference_type" => ty
            .child_by_field_name("type")
            .map(|inner| base_type_name(cx, inner))
            .unwrap_or_else(|| cx.type_text(ty)),
        _ => cx.type_text(ty),
    }
}

fn modifiers(cx: &Cx<'_>, item: Node<'_>) -> Vec<String> {
    let mut mods = Vec::new();
    if let Some(vis) = child_of_kind(item, "visibility_modifier") {
        mods.push(super::normalize_type(cx.text(vis)));
    }
    if let Some(fm) = child_of_kind(item, "function_modifiers") {
        mods.extend(cx.text(fm).split_whitespace().map(str::to_string));
    }
    mods
}

fn field_list(cx: &Cx<'_>, body: Node<'_>, out: &mut Vec<AstNode>) {
    match body.kind() {
        "field_declaration_list" => {
            for field in named_children(body) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                out.push(
                    cx.node(NodeKind::Variable, field)
                        .maybe_name(cx.field(field, "name").map(str::to_string))
                        .attr(attr::DECLARATION, "field")
                        .maybe_attr(
                            attr::TYPE,
                            field.child_by_field_name("type").map(|t| cx.type_text(t)),
                        )
                        .list_attr(attr::MODIFIERS, modifiers(cx, field))
                        .build(),
                );
            }
        }
        "ordered_field_declaration_list" => {
            let mut cursor = body.walk();
            let types: Vec<Node<'_>> = body.children_by_field_name("type", &mut cursor).collect();
            for (index, ty) in types.into_iter().enumerate() {
                out.push(
                    cx.node(NodeKind::Variable, ty)
                        .name(index.to_string())
                        .attr(attr::DECLARATION, "field")
                        .attr(attr::TYPE, cx.type_text(ty))
                        .build(),
                );
            }
        }
        _ => {}
    }
}

fn function(cx: &Cx<'_>, item: Node<'_>) -> AstNode {
    let mut names = Vec::new();
    let mut types = Vec::new();
    let mut has_self = false;
    if let Some(params) = item.child_by_field_name("parameters") {
        for param in named_children(params) {
            match param.kind() {
                "parameter" => {
                    names.push(cx.field(param, "pattern").unwrap_or_default().to_string());
                    types.push(
                        param
                            .child_by_field_name("type")
                            .map(|t| cx.type_text(t))
                            .unwrap_or_default(),
                    );
                }
                "self_parameter" => has_self = true,
                _ => {}
            }
        }
    }

    let mut body_nodes = Vec::new();
    if let Some(body) = item.child_by_field_name("body") {
        body_items(cx, body, &mut body_nodes);
    }

    cx.node(NodeKind::Method, item)
        .maybe_name(cx.field(item, "name").map(str::to_string))
        .attr(attr::DECLARATION, if has_self { "method" } else { "function" })
        .list_attr(attr::PARAMETERS, names)
        .list_attr(attr::PARAMETER_TYPES, types)
        .maybe_attr(
            attr::RETURN_TYPE,
            item.child_by_field_name("return_type").map(|t| cx.type_text(t)),
        )
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, item))
        .list_attr(attr::MODIFIERS, modifiers(cx, item))
        .children(body_nodes)
        .build()
}

fn body_items(cx: &Cx<'_>, body: Node<'_>, out: &mut Vec<AstNode>) {
    scan_body(body, out, &mut |node| match node.kind() {
        "let_declaration" => {
            let pattern = node.child_by_field_name("pattern");
            let name = pattern
                .filter(|p| p.kind() == "identifier")
                .map(|p| cx.text(p).to_string());
            match name {
                Some(name) => Visit::EmitAndDescend(
                    cx.node(NodeKind::Variable, node)
                        .name(name)
                        .attr(attr::DECLARATION, "local")
                        .maybe_attr(
                            attr::TYPE,
                            node.child_by_field_name("type").map(|t| cx.type_text(t)),
                        )
                        .build(),
                ),
                None => Visit::Descend,
            }
        }
        "call_expression" => {
            let callee = cx
                .field(node, "function")
                .map(super::normalize_type)
                .unwrap_or_default();
            let name = callee
                .rsplit(['.', ':'])
                .next()
                .unwrap_or_default()
                .to_string();
            Visit::EmitAndDescend(
                cx.node(NodeKind::Expression, node)
                    .name(name)
                    .attr(attr::CALLEE, callee)
                    .build(),
            )
        }
        "function_item" | "struct_item" | "enum_item" | "trait_item" | "impl_item"
        | "mod_item" => match item_node(cx, node) {
            Some(nested) => Visit::Emit(nested),
            None => Visit::Skip,
        },
        "macro_invocation" => Visit::Skip,
        _ => Visit::Descend,
    });
}
