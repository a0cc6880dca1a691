// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tolerant Python parsing into immutable tree snapshots.
//!
//! A [`SyntaxTree`] owns its source text and the tree-sitter tree built from
//! it. Snapshots are never edited in place: a textual change means a fresh
//! [`parse`] call. Malformed regions become `ERROR` or missing nodes and the
//! rest of the tree stays queryable.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

use tree_sitter::{Node, Parser, Tree};

use crate::error::ParseError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::types::{NodeRef, SyntaxErrorInfo, SyntaxErrorKind};

/// Reusable Python parser.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    /// Create a parser configured for the Python grammar.
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::LanguageInit(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse `text` into a snapshot. Syntax errors do not fail the parse.
    pub fn parse(&mut self, text: &str) -> Result<SyntaxTree, ParseError> {
        let start = Instant::now();

        let tree = self
            .parser
            .parse(text, None)
            .ok_or_else(|| ParseError::NoTree(format!("{} bytes of input", text.len())))?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("ast.parse", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        Ok(SyntaxTree {
            source: Arc::from(text),
            tree,
        })
    }
}

thread_local! {
    static PARSER: RefCell<Option<PythonParser>> = const { RefCell::new(None) };
}

/// Parse Python source using a per-thread parser.
pub fn parse(text: &str) -> Result<SyntaxTree, ParseError> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(PythonParser::new()?);
        }
        match slot.as_mut() {
            Some(parser) => parser.parse(text),
            None => Err(ParseError::LanguageInit("parser unavailable".to_string())),
        }
    })
}

/// Immutable parse snapshot: source text plus its syntax tree.
#[derive(Clone)]
pub struct SyntaxTree {
    source: Arc<str>,
    tree: Tree,
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("bytes", &self.source.len())
            .field("has_errors", &self.has_errors())
            .finish()
    }
}

impl SyntaxTree {
    /// Source text the tree was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root `module` node.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`.
    pub fn text(&self, node: Node<'_>) -> &str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    /// Whether any error or missing node exists in the tree.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// All localized syntax errors, in document order.
    pub fn errors(&self) -> Vec<SyntaxErrorInfo> {
        let mut errors = Vec::new();
        let root = self.tree.root_node();
        if root.has_error() {
            self.collect_errors(root, &mut errors);
        }
        errors
    }

    fn collect_errors(&self, node: Node<'_>, out: &mut Vec<SyntaxErrorInfo>) {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let (kind, snippet) = if node.is_missing() {
                (SyntaxErrorKind::Missing, format!("missing {}", node.kind()))
            } else {
                let text = self.text(node);
                (
                    SyntaxErrorKind::Error,
                    text.lines().next().unwrap_or("").trim().to_string(),
                )
            };
            out.push(SyntaxErrorInfo {
                kind,
                line: pos.row as u32 + 1,
                column: pos.column as u32,
                snippet,
            });
            return;
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                if child.has_error() {
                    self.collect_errors(child, out);
                }
            }
        }
    }

    /// Resolve a stable node reference against this snapshot.
    ///
    /// Returns `None` when the path does not exist. The caller checks the
    /// node kind.
    pub fn resolve(&self, node_ref: &NodeRef) -> Option<Node<'_>> {
        let mut node = self.tree.root_node();
        for &index in &node_ref.path {
            node = node.child(index as usize)?;
        }
        Some(node)
    }

    /// Visit every node in document order, passing its child path.
    ///
    /// The visitor returns `false` to skip a node's descendants.
    pub fn walk<'a, F>(&'a self, mut visit: F)
    where
        F: FnMut(Node<'a>, &[u32]) -> bool,
    {
        let mut path = Vec::new();
        walk_node(self.tree.root_node(), &mut path, &mut visit);
    }
}

fn walk_node<'a, F>(node: Node<'a>, path: &mut Vec<u32>, visit: &mut F)
where
    F: FnMut(Node<'a>, &[u32]) -> bool,
{
    if !visit(node, path) {
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            path.push(i as u32);
            walk_node(child, path, visit);
            path.pop();
        }
    }
}

/// Build a [`NodeRef`] for a node visited at `path`.
pub(crate) fn node_ref(node: Node<'_>, path: &[u32]) -> NodeRef {
    NodeRef {
        kind: node.kind().to_string(),
        path: path.to_vec(),
    }
}

/// 1-indexed start line of a node.
pub(crate) fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_source() {
        let tree = parse("import os\n\nprint(os.getcwd())\n").unwrap();
        assert!(!tree.has_errors());
        assert!(tree.errors().is_empty());
        assert_eq!(tree.root().kind(), "module");
    }

    #[test]
    fn test_parse_tolerates_errors() {
        let source = "import os\n\ndef broken(:\n    pass\n\nx = 1\n";
        let tree = parse(source).unwrap();
        assert!(tree.has_errors());

        let errors = tree.errors();
        assert!(!errors.is_empty());
        assert_eq!(errors[0].line, 3);

        // The rest of the module is still there.
        let mut saw_import = false;
        tree.walk(|node, _| {
            if node.kind() == "import_statement" {
                saw_import = true;
            }
            true
        });
        assert!(saw_import);
    }

    #[test]
    fn test_resolve_round_trips_paths() {
        let tree = parse("a = 1\nfoo(bar, baz=2)\n").unwrap();
        let mut refs = Vec::new();
        tree.walk(|node, path| {
            if node.kind() == "call" {
                refs.push(node_ref(node, path));
            }
            true
        });
        assert_eq!(refs.len(), 1);

        let node = tree.resolve(&refs[0]).unwrap();
        assert_eq!(node.kind(), "call");
        assert_eq!(tree.text(node), "foo(bar, baz=2)");
        assert_eq!(line_of(node), 2);
    }

    #[test]
    fn test_resolve_missing_path() {
        let tree = parse("x = 1\n").unwrap();
        let bogus = NodeRef {
            kind: "call".to_string(),
            path: vec![5, 9],
        };
        assert!(tree.resolve(&bogus).is_none());
    }

    #[test]
    fn test_python_parser_reuse() {
        let mut parser = PythonParser::new().unwrap();
        let first = parser.parse("x = 1\n").unwrap();
        let second = parser.parse("y = (\n").unwrap();
        assert!(!first.has_errors());
        assert!(second.has_errors());
        assert_eq!(first.source(), "x = 1\n");
    }
}
