// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only queries over a [`SyntaxTree`].
//!
//! Every query returns results in document order and is deterministic for a
//! given snapshot.

use std::collections::HashSet;

use tree_sitter::Node;

use super::tree::{line_of, node_ref, SyntaxTree};
use super::types::{
    ArgumentInfo, CallInfo, DefInfo, DefKind, ImportInfo, ImportedName, NodeRef,
};

const IMPORT_KINDS: [&str; 3] = [
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

/// All import statements in the tree, nested ones included.
pub fn find_imports(tree: &SyntaxTree) -> Vec<ImportInfo> {
    let mut imports = Vec::new();

    tree.walk(|node, path| {
        match node.kind() {
            "import_statement" => {
                let reference = node_ref(node, path);
                let mut cursor = node.walk();
                for name_node in node.children_by_field_name("name", &mut cursor) {
                    let imported = imported_name(tree, name_node);
                    imports.push(ImportInfo {
                        module: imported.name.clone(),
                        names: vec![imported],
                        is_from: false,
                        line: line_of(node),
                        text: tree.text(node).to_string(),
                        top_level: path.len() == 1,
                        node: reference.clone(),
                    });
                }
                false
            }
            "import_from_statement" | "future_import_statement" => {
                let module = if node.kind() == "future_import_statement" {
                    "__future__".to_string()
                } else {
                    node.child_by_field_name("module_name")
                        .map(|m| compact(tree.text(m)))
                        .unwrap_or_default()
                };

                let mut names = Vec::new();
                let mut cursor = node.walk();
                for name_node in node.children_by_field_name("name", &mut cursor) {
                    names.push(imported_name(tree, name_node));
                }
                for i in 0..node.child_count() {
                    if let Some(child) = node.child(i) {
                        if child.kind() == "wildcard_import" {
                            names.push(ImportedName {
                                name: "*".to_string(),
                                alias: None,
                            });
                        }
                    }
                }

                imports.push(ImportInfo {
                    module,
                    names,
                    is_from: true,
                    line: line_of(node),
                    text: tree.text(node).to_string(),
                    top_level: path.len() == 1,
                    node: node_ref(node, path),
                });
                false
            }
            _ => true,
        }
    });

    imports
}

fn imported_name(tree: &SyntaxTree, node: Node<'_>) -> ImportedName {
    if node.kind() == "aliased_import" {
        ImportedName {
            name: node
                .child_by_field_name("name")
                .map(|n| compact(tree.text(n)))
                .unwrap_or_default(),
            alias: node
                .child_by_field_name("alias")
                .map(|n| tree.text(n).to_string()),
        }
    } else {
        ImportedName {
            name: compact(tree.text(node)),
            alias: None,
        }
    }
}

/// Calls whose callee matches `name_pattern`, in document order.
///
/// A pattern without a dot matches the last segment of the callee, so
/// `Agent` matches both `Agent(...)` and `agents.Agent(...)`. A dotted
/// pattern must match the callee or a dotted suffix of it. `*` matches
/// every call.
pub fn find_calls(tree: &SyntaxTree, name_pattern: &str) -> Vec<CallInfo> {
    let mut calls = Vec::new();

    tree.walk(|node, path| {
        if node.kind() == "call" {
            if let Some(call) = call_info(tree, node, path) {
                if callee_matches(&call, name_pattern) {
                    calls.push(call);
                }
            }
        }
        true
    });

    calls
}

fn callee_matches(call: &CallInfo, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if pattern.contains('.') {
        call.callee == pattern
            || call
                .callee
                .strip_suffix(pattern)
                .is_some_and(|head| head.ends_with('.'))
    } else {
        call.name == pattern
    }
}

fn call_info(tree: &SyntaxTree, node: Node<'_>, path: &[u32]) -> Option<CallInfo> {
    let function = node.child_by_field_name("function")?;
    let callee = compact(tree.text(function));
    let name = callee.rsplit('.').next().unwrap_or(&callee).to_string();
    let root_binding = callee.split('.').next().unwrap_or(&callee).to_string();

    let mut arguments = Vec::new();
    if let Some(args) = node.child_by_field_name("arguments") {
        if args.kind() == "argument_list" {
            for i in 0..args.named_child_count() {
                let Some(arg) = args.named_child(i) else {
                    continue;
                };
                match arg.kind() {
                    "comment" => {}
                    "keyword_argument" => {
                        let keyword = arg
                            .child_by_field_name("name")
                            .map(|n| tree.text(n).to_string());
                        let value_node = arg.child_by_field_name("value");
                        arguments.push(ArgumentInfo {
                            keyword,
                            value: value_node
                                .map(|v| tree.text(v).to_string())
                                .unwrap_or_default(),
                            list_elements: value_node
                                .filter(|v| v.kind() == "list")
                                .map(|v| list_elements(tree, v)),
                        });
                    }
                    _ => arguments.push(ArgumentInfo {
                        keyword: None,
                        value: tree.text(arg).to_string(),
                        list_elements: None,
                    }),
                }
            }
        }
    }

    Some(CallInfo {
        callee,
        name,
        root_binding,
        arguments,
        line: line_of(node),
        snippet: tree
            .text(node)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string(),
        node: node_ref(node, path),
    })
}

/// Element texts of a `list` literal node, comments excluded.
pub(crate) fn list_elements(tree: &SyntaxTree, list: Node<'_>) -> Vec<String> {
    (0..list.named_child_count())
        .filter_map(|i| list.named_child(i))
        .filter(|n| n.kind() != "comment")
        .map(|n| tree.text(n).to_string())
        .collect()
}

/// Order ambiguous call matches by proximity to the framework entry point.
///
/// Calls whose callee goes through one of `bindings` come first, then
/// shallower calls, then document order.
pub fn rank_calls(mut calls: Vec<CallInfo>, bindings: &HashSet<String>) -> Vec<CallInfo> {
    calls.sort_by_key(|call| (!bindings.contains(&call.root_binding), call.node.depth()));
    calls
}

/// Function and class definitions of the requested kind, in document order.
pub fn find_defs(tree: &SyntaxTree, kind: DefKind) -> Vec<DefInfo> {
    let mut defs = Vec::new();

    tree.walk(|node, path| {
        if kind.matches(node.kind()) {
            let decorators = node
                .parent()
                .filter(|p| p.kind() == "decorated_definition")
                .map(|p| {
                    (0..p.named_child_count())
                        .filter_map(|i| p.named_child(i))
                        .filter(|n| n.kind() == "decorator")
                        .map(|n| tree.text(n).to_string())
                        .collect()
                })
                .unwrap_or_default();

            defs.push(DefInfo {
                name: node
                    .child_by_field_name("name")
                    .map(|n| tree.text(n).to_string())
                    .unwrap_or_default(),
                kind: if node.kind() == "class_definition" {
                    DefKind::Class
                } else {
                    DefKind::Function
                },
                line: line_of(node),
                decorators,
                node: node_ref(node, path),
            });
        }
        true
    });

    defs
}

/// Where module-level insertions go: the last top-level import, else a
/// leading module docstring, else the module itself.
pub fn import_anchor(tree: &SyntaxTree) -> NodeRef {
    let root = tree.root();
    let mut anchor = None;
    let mut docstring = None;

    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else { continue };
        if IMPORT_KINDS.contains(&child.kind()) {
            anchor = Some(node_ref(child, &[i as u32]));
        } else if docstring.is_none() && anchor.is_none() && is_docstring(child) {
            docstring = Some(node_ref(child, &[i as u32]));
        }
    }

    anchor.or(docstring).unwrap_or_else(NodeRef::root)
}

fn is_docstring(node: Node<'_>) -> bool {
    node.kind() == "expression_statement"
        && node.named_child_count() == 1
        && node.named_child(0).is_some_and(|n| n.kind() == "string")
        && node
            .prev_named_sibling()
            .map_or(true, |prev| prev.kind() == "comment")
}

/// Byte offset for insertions at the top of a module with no anchor: the
/// start of the first non-comment statement.
pub fn module_insert_offset(tree: &SyntaxTree) -> usize {
    let root = tree.root();
    (0..root.named_child_count())
        .filter_map(|i| root.named_child(i))
        .find(|n| n.kind() != "comment")
        .map(|n| n.start_byte())
        .unwrap_or(tree.source().len())
}

/// Collapse all whitespace out of a dotted name.
fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
