use super::{child_of_kind, named_children, scan_body, type_parameter_names, Cx, Visit};
use crate::ast::{attr, AstNode, NodeKind};
use tree_sitter::Node;

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

pub(super) fn lower(cx: &Cx<'_>, root: Node<'_>) -> Vec<AstNode> {
    let mut out = Vec::new();
    for child in named_children(root) {
        match child.kind() {
            "import_declaration" => out.push(import(cx, child)),
            kind if TYPE_DECLARATIONS.contains(&kind) => out.push(type_declaration(cx, child)),
            _ => {}
        }
    }
    out
}

fn import(cx: &Cx<'_>, node: Node<'_>) -> AstNode {
    let path = cx
        .text(node)
        .trim_start_matches("import")
        .trim()
        .trim_start_matches("static ")
        .trim_end_matches(';')
        .trim()
        .to_string();
    cx.node(NodeKind::Statement, node)
        .attr(attr::DECLARATION, "import")
        .attr(attr::PATH, path)
        .build()
}

fn modifiers(cx: &Cx<'_>, node: Node<'_>) -> Vec<String> {
    let Some(mods) = child_of_kind(node, "modifiers") else {
        return Vec::new();
    };
    let mut cursor = mods.walk();
    mods.children(&mut cursor)
        .map(|m| cx.text(m).to_string())
        .collect()
}

/// Types listed under a `type_list` (directly or inside a wrapper node)
fn type_list(cx: &Cx<'_>, wrapper: Option<Node<'_>>) -> Vec<String> {
    let Some(wrapper) = wrapper else {
        return Vec::new();
    };
    let list = child_of_kind(wrapper, "type_list").unwrap_or(wrapper);
    named_children(list)
        .into_iter()
        .map(|t| cx.type_text(t))
        .collect()
}

fn type_declaration(cx: &Cx<'_>, node: Node<'_>) -> AstNode {
    let declaration = node.kind().trim_end_matches("_declaration").to_string();

    let superclass = node
        .child_by_field_name("superclass")
        .and_then(|sc| named_children(sc).into_iter().next())
        .map(|t| cx.type_text(t));

    let mut interfaces = type_list(cx, node.child_by_field_name("interfaces"));
    if interfaces.is_empty() {
        // Interfaces extend other interfaces via `extends_interfaces`.
        interfaces = type_list(cx, child_of_kind(node, "extends_interfaces"));
    }

    let mut members = Vec::new();
    if node.kind() == "record_declaration" {
        if let Some(params) = node.child_by_field_name("parameters") {
            for (name, ty, param) in parameters(cx, params) {
                members.push(
                    cx.node(NodeKind::Variable, param)
                        .name(name)
                        .attr(attr::TYPE, ty)
                        .attr(attr::DECLARATION, "record_component")
                        .build(),
                );
            }
        }
    }
    if let Some(body) = node.child_by_field_name("body") {
        class_body(cx, body, &mut members);
    }

    cx.node(NodeKind::Class, node)
        .maybe_name(cx.field(node, "name").map(str::to_string))
        .attr(attr::DECLARATION, declaration)
        .maybe_attr(attr::SUPERCLASS, superclass)
        .list_attr(attr::INTERFACES, interfaces)
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, node))
        .list_attr(attr::MODIFIERS, modifiers(cx, node))
        .children(members)
        .build()
}

fn class_body(cx: &Cx<'_>, body: Node<'_>, out: &mut Vec<AstNode>) {
    for member in named_children(body) {
        match member.kind() {
            "method_declaration" | "constructor_declaration" | "compact_constructor_declaration"
            | "annotation_type_element_declaration" => out.push(method(cx, member)),
            "field_declaration" | "constant_declaration" => {
                out.extend(variables(cx, member, "field"));
            }
            "enum_body_declarations" => class_body(cx, member, out),
            kind if TYPE_DECLARATIONS.contains(&kind) => out.push(type_declaration(cx, member)),
            _ => {}
        }
    }
}

/// `(name, type, node)` for each formal parameter
fn parameters<'t>(cx: &Cx<'_>, params: Node<'t>) -> Vec<(String, String, Node<'t>)> {
    let mut out = Vec::new();
    for param in named_children(params) {
        match param.kind() {
            "formal_parameter" => {
                let name = cx.field(param, "name").unwrap_or_default().to_string();
                let ty = param
                    .child_by_field_name("type")
                    .map(|t| cx.type_text(t))
                    .unwrap_or_default();
                let dims = cx.field(param, "dimensions").unwrap_or_default();
                out.push((name, format!("{ty}{dims}"), param));
            }
            "spread_parameter" => {
                let mut ty = String::new();
                let mut name = String::new();
                for part in named_children(param) {
                    match part.kind() {
                        "modifiers" => {}
                        "variable_declarator" => {
                            name = cx.field(part, "name").unwrap_or_default().to_string();
                        }
                        _ if ty.is_empty() => ty = cx.type_text(part),
                        _ => {}
                    }
                }
                out.push((name, format!("{ty}..."), param));
            }
            _ => {}
        }
    }
    out
}

fn method(cx: &Cx<'_>, node: Node<'_>) -> AstNode {
    let (names, types): (Vec<String>, Vec<String>) = node
        .child_by_field_name("parameters")
        .map(|params| {
            parameters(cx, params)
                .into_iter()
                .map(|(name, ty, _)| (name, ty))
                .unzip()
        })
        .unwrap_or_default();

    let declaration = match node.kind() {
        "constructor_declaration" | "compact_constructor_declaration" => "constructor",
        _ => "method",
    };
    let throws: Vec<String> = child_of_kind(node, "throws")
        .map(|t| {
            named_children(t)
                .into_iter()
                .map(|ty| cx.type_text(ty))
                .collect()
        })
        .unwrap_or_default();

    let mut body_nodes = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        body_items(cx, body, &mut body_nodes);
    }

    cx.node(NodeKind::Method, node)
        .maybe_name(cx.field(node, "name").map(str::to_string))
        .attr(attr::DECLARATION, declaration)
        .maybe_attr(
            attr::RETURN_TYPE,
            node.child_by_field_name("type").map(|t| cx.type_text(t)),
        )
        .list_attr(attr::PARAMETERS, names)
        .list_attr(attr::PARAMETER_TYPES, types)
        .list_attr(attr::THROWS, throws)
        .list_attr(attr::TYPE_PARAMETERS, type_parameter_names(cx, node))
        .list_attr(attr::MODIFIERS, modifiers(cx, node))
        .children(body_nodes)
        .build()
}

/// Field, constant and local declarations: one Variable per declarator
fn variables(cx: &Cx<'_>, node: Node<'_>, declaration: &str) -> Vec<AstNode> {
    let ty = node
        .child_by_field_name("type")
        .map(|t| cx.type_text(t))
        .unwrap_or_default();
    let mods = modifiers(cx, node);
    let mut cursor = node.walk();
    node.children_by_field_name("declarator", &mut cursor)
        .map(|declarator| {
            let dims = cx.field(declarator, "dimensions").unwrap_or_default();
            cx.node(NodeKind::Variable, declarator)
                .maybe_name(cx.field(declarator, "name").map(str::to_string))
                .attr(attr::DECLARATION, declaration)
                .attr(attr::TYPE, format!("{ty}{dims}"))
                .list_attr(attr::MODIFIERS, mods.clone())
                .build()
        })
        .collect()
}

fn body_items(cx: &Cx<'_>, body: Node<'_>, out: &mut Vec<AstNode>) {
    scan_body(body, out, &mut |node| match node.kind() {
        "local_variable_declaration" => {
            let mut locals = variables(cx, node, "local");
            match locals.len() {
                1 => Visit::EmitAndDescend(locals.remove(0)),
                _ => {
                    // Several declarators: wrap them so the scan stays one-in-one-out.
                    let group = cx
                        .node(NodeKind::Statement, node)
                        .attr(attr::DECLARATION, "local_group")
                        .children(locals)
                        .build();
                    Visit::EmitAndDescend(group)
                }
            }
        }
        "method_invocation" => {
            let name = cx.field(node, "name").unwrap_or_default();
            let callee = match cx.field(node, "object") {
                Some(object) => format!("{object}.{name}"),
                None => name.to_string(),
            };
            Visit::EmitAndDescend(
                cx.node(NodeKind::Expression, node)
                    .name(name)
                    .attr(attr::CALLEE, super::normalize_type(&callee))
                    .build(),
            )
        }
        kind if TYPE_DECLARATIONS.contains(&kind) => Visit::Emit(type_declaration(cx, node)),
        // Anonymous class bodies and lambdas belong to no named declaration.
        "class_body" | "lambda_expression" => Visit::Skip,
        _ => Visit::Descend,
    });
}

#[cfg(test)]
mod tests {
    use crate::ast::{attr, NodeKind};
    use crate::config::ParserConfig;
    use crate::frontend::parse_source;
    use crate::language::Language;
    use pretty_assertions::assert_eq;

    fn parse(code: &str) -> crate::ParseResult {
        parse_source(Language::Java, code, "Test.java", &ParserConfig::default())
    }

    #[test]
    fn method_slots_are_captured() {
        let result = parse(
            "class Svc extends Base implements A, B<C> {\n\
             private final Repo repo;\n\
             public CustomReturnType handle(int a, String b, boolean c) throws CustomException, IOException { return null; }\n\
             }",
        );
        assert!(result.is_successful(), "{:?}", result.errors());
        let root = result.root_node().unwrap();
        let class = root.find_child_by_name("Svc").unwrap();
        assert_eq!(class.text_attribute(attr::SUPERCLASS), Some("Base"));
        assert_eq!(
            class.list_attribute(attr::INTERFACES).to_vec(),
            vec!["A".to_string(), "B<C>".to_string()]
        );

        let field = class.find_child_by_name("repo").unwrap();
        assert_eq!(field.kind(), NodeKind::Variable);
        assert_eq!(field.text_attribute(attr::TYPE), Some("Repo"));

        let method = class.find_child_by_name("handle").unwrap().as_method().unwrap();
        assert_eq!(method.return_type(), Some("CustomReturnType"));
        assert_eq!(
            method.parameter_types().to_vec(),
            vec!["int".to_string(), "String".to_string(), "boolean".to_string()]
        );
        assert_eq!(
            method.throws().to_vec(),
            vec!["CustomException".to_string(), "IOException".to_string()]
        );
    }

    #[test]
    fn interfaces_extending_interfaces() {
        let result = parse("interface Repo extends Store<User>, Closeable { User find(long id); }");
        let root = result.root_node().unwrap();
        let repo = root.find_child_by_name("Repo").unwrap();
        assert_eq!(repo.text_attribute(attr::DECLARATION), Some("interface"));
        assert_eq!(repo.list_attribute(attr::INTERFACES).len(), 2);
        assert!(repo.find_child_by_name("find").is_some());
    }

    #[test]
    fn calls_and_locals_become_body_nodes() {
        let result = parse(
            "class A { void run() { Worker w = factory.create(); w.start(); } }",
        );
        let root = result.root_node().unwrap();
        let run = root
            .find_child_by_name("A")
            .and_then(|a| a.find_child_by_name("run"))
            .unwrap();
        let local = run.find_child_by_name("w").unwrap();
        assert_eq!(local.text_attribute(attr::TYPE), Some("Worker"));
        let callees: Vec<_> = run
            .find_descendants_by_kind(NodeKind::Expression)
            .iter()
            .filter_map(|e| e.text_attribute(attr::CALLEE))
            .collect();
        assert_eq!(callees, vec!["factory.create", "w.start"]);
    }

    #[test]
    fn generic_parameters_are_recorded() {
        let result = parse(
            "class Cache<K extends Comparable<K>, V> { V value; <R> R map(Fn<V, R> f) { return null; } }",
        );
        assert!(result.is_successful(), "{:?}", result.errors());
        let root = result.root_node().unwrap();
        let cache = root.find_child_by_name("Cache").unwrap();
        assert_eq!(
            cache.list_attribute(attr::TYPE_PARAMETERS).to_vec(),
            vec!["K".to_string(), "V".to_string()]
        );
        let map = cache.find_child_by_name("map").unwrap();
        assert_eq!(map.list_attribute(attr::TYPE_PARAMETERS).to_vec(), vec!["R".to_string()]);
    }

    #[test]
    fn broken_member_keeps_partial_tree() {
        let result = parse("class A { int x = 1 }");
        assert_eq!(result.is_successful(), result.errors().is_empty());
        let root = result.root_node().expect("best-effort tree");
        assert!(root.node_count() >= 1);
    }
}
