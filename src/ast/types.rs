// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Types produced by the syntax-tree query API.

use serde::{Deserialize, Serialize};

/// Stable reference to a syntax node: node kind plus the ordinal child path
/// from the tree root.
///
/// Byte offsets shift as soon as any edit lands above a node; the child path
/// of an unedited tree does not, so plans carry `NodeRef`s and the injector
/// resolves them against the tree it is about to patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    /// tree-sitter node kind (e.g. `call`, `import_from_statement`).
    pub kind: String,
    /// Child indices from the root, one per level.
    pub path: Vec<u32>,
}

impl NodeRef {
    /// Reference to the tree root.
    pub fn root() -> Self {
        Self {
            kind: "module".to_string(),
            path: Vec::new(),
        }
    }

    /// Nesting depth below the root.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Whether this node is a direct child of the module.
    pub fn is_top_level(&self) -> bool {
        self.path.len() == 1
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self.path.iter().map(|i| i.to_string()).collect();
        write!(f, "{}@{}", self.kind, path.join("."))
    }
}

/// A name brought in by an import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    /// Name as exported by the module (dotted for plain imports).
    pub name: String,
    /// Local alias, if renamed.
    pub alias: Option<String>,
}

impl ImportedName {
    /// The identifier this import binds in the importing module.
    pub fn binding(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.name.split('.').next().unwrap_or(&self.name).to_string(),
        }
    }
}

/// An import statement (`import x` or `from x import y`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Module path. For `import a, b` one `ImportInfo` is produced per module.
    pub module: String,
    /// Names bound by the statement. For plain imports this is the module.
    pub names: Vec<ImportedName>,
    /// Whether this is a `from ... import ...` form.
    pub is_from: bool,
    /// Line number (1-indexed).
    pub line: u32,
    /// Full statement text.
    pub text: String,
    /// Whether the statement is a direct child of the module.
    pub top_level: bool,
    /// Reference to the statement node.
    pub node: NodeRef,
}

impl ImportInfo {
    /// Identifiers bound in the importing module.
    pub fn bindings(&self) -> Vec<String> {
        self.names.iter().map(ImportedName::binding).collect()
    }

    /// Whether the module is `package` or a submodule of it.
    pub fn is_from_package(&self, package_module: &str) -> bool {
        self.module == package_module
            || self
                .module
                .strip_prefix(package_module)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// One argument in a call's argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentInfo {
    /// Keyword name for `name=value` arguments.
    pub keyword: Option<String>,
    /// Source text of the value expression (or the whole argument).
    pub value: String,
    /// Element texts when the value is a list literal.
    pub list_elements: Option<Vec<String>>,
}

/// A call expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    /// Full callee text (e.g. `agents.Agent`).
    pub callee: String,
    /// Last dotted segment of the callee (e.g. `Agent`).
    pub name: String,
    /// First dotted segment of the callee, the local binding it goes through.
    pub root_binding: String,
    /// Arguments in source order.
    pub arguments: Vec<ArgumentInfo>,
    /// Line number (1-indexed).
    pub line: u32,
    /// First line of the call's source text.
    pub snippet: String,
    /// Reference to the `call` node.
    pub node: NodeRef,
}

impl CallInfo {
    /// Value text of a keyword argument, if present.
    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|a| a.keyword.as_deref() == Some(name))
            .map(|a| a.value.as_str())
    }
}

/// Kind of definition to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefKind {
    Function,
    Class,
    Any,
}

impl DefKind {
    pub(crate) fn matches(&self, node_kind: &str) -> bool {
        match self {
            Self::Function => node_kind == "function_definition",
            Self::Class => node_kind == "class_definition",
            Self::Any => matches!(node_kind, "function_definition" | "class_definition"),
        }
    }
}

/// A function or class definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefInfo {
    pub name: String,
    /// `Function` or `Class`; never `Any`.
    pub kind: DefKind,
    /// Line number (1-indexed).
    pub line: u32,
    /// Decorator source texts, outermost first.
    pub decorators: Vec<String>,
    pub node: NodeRef,
}

/// Kind of syntax problem recorded by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxErrorKind {
    /// Unparseable region wrapped in an `ERROR` node.
    Error,
    /// Token the parser had to invent to recover.
    Missing,
}

/// A localized syntax error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxErrorInfo {
    pub kind: SyntaxErrorKind,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column (0-indexed, bytes).
    pub column: u32,
    /// First line of the offending text (or the missing node kind).
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ref_display() {
        let node = NodeRef {
            kind: "call".to_string(),
            path: vec![0, 3, 1],
        };
        assert_eq!(node.to_string(), "call@0.3.1");
        assert_eq!(node.depth(), 3);
        assert!(!node.is_top_level());
        assert_eq!(NodeRef::root().to_string(), "module@");
    }

    #[test]
    fn test_imported_name_binding() {
        let plain = ImportedName {
            name: "google.adk.agents".to_string(),
            alias: None,
        };
        assert_eq!(plain.binding(), "google");

        let aliased = ImportedName {
            name: "pydantic_ai".to_string(),
            alias: Some("pai".to_string()),
        };
        assert_eq!(aliased.binding(), "pai");
    }

    #[test]
    fn test_is_from_package() {
        let import = ImportInfo {
            module: "langchain.agents".to_string(),
            names: vec![],
            is_from: true,
            line: 1,
            text: String::new(),
            top_level: true,
            node: NodeRef::root(),
        };
        assert!(import.is_from_package("langchain"));
        assert!(import.is_from_package("langchain.agents"));
        assert!(!import.is_from_package("langchain_openai"));
        assert!(!import.is_from_package("lang"));
    }
}
