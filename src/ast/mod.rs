// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Python syntax trees and the query API used by detection and planning.
//!
//! Parsing is tolerant: a file with a syntax error still yields a tree whose
//! broken regions are isolated in error nodes. Trees are immutable
//! snapshots and nodes are addressed across stages by [`NodeRef`].
//!
//! # Example
//!
//! ```rust
//! use agent_instrumentor::ast::{find_calls, parse};
//!
//! let tree = parse("from agents import Agent\nagent = Agent(name='a')\n").unwrap();
//! let calls = find_calls(&tree, "Agent");
//! assert_eq!(calls.len(), 1);
//! assert_eq!(calls[0].line, 2);
//! ```

mod query;
mod source;
mod tree;
mod types;

pub use query::{find_calls, find_defs, find_imports, import_anchor, module_insert_offset, rank_calls};
pub(crate) use query::list_elements;
pub use source::{content_hash, SourceFile};
pub use tree::{parse, PythonParser, SyntaxTree};
pub(crate) use tree::line_of;
pub use types::{
    ArgumentInfo, CallInfo, DefInfo, DefKind, ImportInfo, ImportedName, NodeRef,
    SyntaxErrorInfo, SyntaxErrorKind,
};
