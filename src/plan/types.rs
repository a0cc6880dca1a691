// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Edit plan types.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ast::NodeRef;
use crate::error::PlanConflictError;
use crate::patterns::MergeMode;

/// What an injection point does to its anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditKind {
    /// Add import lines after the anchor statement.
    InsertImport,
    /// Add a code block after the anchor statement.
    InsertAfter,
    /// Ensure keyword `keyword` of the anchor call includes the payload.
    AddOrMergeArgument { keyword: String, mode: MergeMode },
}

impl EditKind {
    /// Discriminant name, used for the per-anchor uniqueness check.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InsertImport => "insert_import",
            Self::InsertAfter => "insert_after",
            Self::AddOrMergeArgument { .. } => "add_or_merge_argument",
        }
    }

    /// Order of edits sharing an insertion offset: imports first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::InsertImport => 0,
            Self::InsertAfter => 1,
            Self::AddOrMergeArgument { .. } => 2,
        }
    }
}

/// A planned, not yet applied edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionPoint {
    /// Position in the plan, used as the edit id in diagnostics.
    pub id: usize,
    pub anchor: NodeRef,
    pub kind: EditKind,
    /// Text to insert (imports, init code) or the argument expression.
    pub payload: String,
    /// Pattern(s) the edit came from, comma-separated when coalesced.
    pub pattern_id: String,
    /// 1-indexed line of the anchor in the planned-against tree.
    pub line: u32,
}

/// Ordered edits for one file. Immutable once built.
#[derive(Debug, Clone)]
pub struct EditPlan {
    path: PathBuf,
    points: Vec<InjectionPoint>,
    conflict: Option<PlanConflictError>,
}

impl EditPlan {
    /// A plan from points. Ids are reassigned to the list positions.
    pub fn new(path: impl Into<PathBuf>, mut points: Vec<InjectionPoint>) -> Self {
        for (id, point) in points.iter_mut().enumerate() {
            point.id = id;
        }
        Self {
            path: path.into(),
            points,
            conflict: None,
        }
    }

    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Vec::new())
    }

    /// A rejected plan: carries the conflict and no edits.
    pub fn conflicted(path: impl Into<PathBuf>, conflict: PlanConflictError) -> Self {
        Self {
            path: path.into(),
            points: Vec::new(),
            conflict: Some(conflict),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn points(&self) -> &[InjectionPoint] {
        &self.points
    }

    pub fn conflict(&self) -> Option<&PlanConflictError> {
        self.conflict.as_ref()
    }

    pub fn has_conflict(&self) -> bool {
        self.conflict.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Distinct pattern ids contributing to the plan.
    pub fn pattern_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .points
            .iter()
            .flat_map(|p| p.pattern_id.split(','))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
