// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code injector.
//!
//! Resolves each injection point against the file's tree, renders it as a
//! [`TextEdit`], applies all edits bottom-to-top and re-parses exactly once.

use std::collections::HashSet;
use std::time::Instant;

use tracing::debug;
use tree_sitter::Node;

use crate::ast::{module_insert_offset, parse, NodeRef, SourceFile, SyntaxTree};
use crate::error::InjectError;
use crate::patterns::MergeMode;
use crate::plan::{EditKind, EditPlan, InjectionPoint};
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::edit::{apply_edits, TextEdit};

/// Edited text, its tree and the edits that produced it.
#[derive(Debug, Clone)]
pub struct Injection {
    pub text: String,
    pub tree: SyntaxTree,
    pub edits: Vec<TextEdit>,
}

/// Applies edit plans to source files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeInjector;

impl CodeInjector {
    pub fn new() -> Self {
        Self
    }

    /// Render every point of `plan` as a text edit against `file`.
    pub fn edits_for(&self, file: &SourceFile, plan: &EditPlan) -> Result<Vec<TextEdit>, InjectError> {
        let mut seen: HashSet<(&NodeRef, &'static str)> = HashSet::new();
        for point in plan.points() {
            if !seen.insert((&point.anchor, point.kind.tag())) {
                return Err(InjectError::DuplicateAnchor {
                    anchor: point.anchor.to_string(),
                    kind: point.kind.tag().to_string(),
                });
            }
        }

        let tree = file.tree();
        plan.points()
            .iter()
            .map(|point| {
                let node = resolve(tree, point)?;
                match &point.kind {
                    EditKind::InsertImport => Ok(statement_insert(tree, node, point, "\n", "\n")),
                    EditKind::InsertAfter => Ok(statement_insert(tree, node, point, "\n\n", "\n\n")),
                    EditKind::AddOrMergeArgument { keyword, mode } => {
                        argument_edit(tree, node, point, keyword, *mode)
                    }
                }
            })
            .collect()
    }

    /// Apply `plan` to `file` and re-parse the result once.
    pub fn apply(&self, file: &SourceFile, plan: &EditPlan) -> Result<Injection, InjectError> {
        let start = Instant::now();

        let edits = self.edits_for(file, plan)?;
        let text = apply_edits(file.original(), &edits)?;
        let tree = parse(&text)?;

        debug!(
            path = %file.path().display(),
            edits = edits.len(),
            "Applied edit plan"
        );

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("inject.apply", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        Ok(Injection { text, tree, edits })
    }
}

fn resolve<'t>(tree: &'t SyntaxTree, point: &InjectionPoint) -> Result<Node<'t>, InjectError> {
    let node = tree
        .resolve(&point.anchor)
        .ok_or_else(|| InjectError::UnresolvedAnchor(point.anchor.to_string()))?;
    if node.kind() != point.anchor.kind {
        return Err(InjectError::AnchorKindMismatch {
            anchor: point.anchor.to_string(),
            expected: point.anchor.kind.clone(),
            found: node.kind().to_string(),
        });
    }
    Ok(node)
}

/// Insert a block after a statement, or at the top of the module when the
/// anchor is the module itself.
fn statement_insert(
    tree: &SyntaxTree,
    node: Node<'_>,
    point: &InjectionPoint,
    separator: &str,
    trailer: &str,
) -> TextEdit {
    let source = tree.source();
    let rank = point.kind.rank();

    if point.anchor.path.is_empty() {
        let offset = module_insert_offset(tree);
        let lead = if offset > 0 && !source[..offset].ends_with('\n') {
            "\n"
        } else {
            ""
        };
        return TextEdit::insert(
            point.id,
            offset,
            format!("{}{}{}", lead, point.payload, trailer),
            rank,
        );
    }

    let offset = end_of_line(source, node.end_byte());
    TextEdit::insert(point.id, offset, format!("{}{}", separator, point.payload), rank)
}

/// Move `offset` past trailing whitespace and a comment on the same line.
fn end_of_line(source: &str, offset: usize) -> usize {
    let line_end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    let rest = source[offset..line_end].trim();
    if rest.is_empty() || rest.starts_with('#') {
        line_end
    } else {
        offset
    }
}

fn argument_edit(
    tree: &SyntaxTree,
    call: Node<'_>,
    point: &InjectionPoint,
    keyword: &str,
    mode: MergeMode,
) -> Result<TextEdit, InjectError> {
    let inapplicable = |message: &str| InjectError::Inapplicable {
        edit_id: point.id,
        message: message.to_string(),
    };
    let expr = point.payload.as_str();

    let args = call
        .child_by_field_name("arguments")
        .ok_or_else(|| inapplicable("call has no argument list"))?;
    if args.kind() != "argument_list" {
        return Err(inapplicable("call takes a bare generator expression"));
    }

    let named: Vec<Node<'_>> = (0..args.named_child_count())
        .filter_map(|i| args.named_child(i))
        .filter(|n| n.kind() != "comment")
        .collect();

    let existing = named.iter().find(|n| {
        n.kind() == "keyword_argument"
            && n.child_by_field_name("name").map(|name| tree.text(name)) == Some(keyword)
    });

    if let Some(argument) = existing {
        if mode == MergeMode::Value {
            return Err(inapplicable("keyword is already set"));
        }
        let value = argument
            .child_by_field_name("value")
            .ok_or_else(|| inapplicable("keyword argument has no value"))?;

        if value.kind() == "list" {
            let last = (0..value.named_child_count())
                .filter_map(|i| value.named_child(i))
                .filter(|n| n.kind() != "comment")
                .last();
            return Ok(match last {
                Some(last) => TextEdit::insert(point.id, last.end_byte(), format!(", {}", expr), 2),
                None => TextEdit::insert(point.id, value.start_byte() + 1, expr, 2),
            });
        }

        let old = tree.text(value);
        let merged = if old == "None" {
            format!("[{}]", expr)
        } else if is_primary(value) {
            format!("[*{}, {}]", old, expr)
        } else {
            format!("[*({}), {}]", old, expr)
        };
        return Ok(TextEdit::replace(
            point.id,
            value.start_byte(),
            value.end_byte(),
            merged,
        ));
    }

    let entry = match mode {
        MergeMode::List => format!("{}=[{}]", keyword, expr),
        MergeMode::Value => format!("{}={}", keyword, expr),
    };
    let Some(last) = named.last() else {
        let close = args.end_byte().saturating_sub(1);
        return Ok(TextEdit::insert(point.id, close, entry, 2));
    };

    let multiline = args.start_position().row != args.end_position().row;
    if !multiline {
        return Ok(TextEdit::insert(point.id, last.end_byte(), format!(", {}", entry), 2));
    }

    let source = tree.source();
    let indent = line_indent(source, last.start_byte());
    let trailing_comma = (0..args.child_count())
        .filter_map(|i| args.child(i))
        .find(|n| n.kind() == "," && n.start_byte() >= last.end_byte());

    Ok(match trailing_comma {
        Some(comma) => TextEdit::insert(
            point.id,
            end_of_line(source, comma.end_byte()),
            format!("\n{}{},", indent, entry),
            2,
        ),
        None => {
            let line_end = end_of_line(source, last.end_byte());
            TextEdit::replace(
                point.id,
                last.end_byte(),
                line_end,
                format!(",{}\n{}{}", &source[last.end_byte()..line_end], indent, entry),
            )
        }
    })
}

/// Expressions that can follow `*` without parentheses.
fn is_primary(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "identifier"
            | "attribute"
            | "call"
            | "subscript"
            | "parenthesized_expression"
            | "list"
            | "tuple"
    )
}

/// Leading whitespace of the line containing `offset`.
fn line_indent(source: &str, offset: usize) -> &str {
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line = &source[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}
