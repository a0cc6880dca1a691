// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-file pipeline states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Where a file is in its pipeline.
///
/// ```text
/// Scanned -> Detected -> Planned -> Injected -> Validated -> Committed
///               |           |          |            |
///               v           v          v            v
///            Skipped     Skipped   RolledBack   RolledBack
/// ```
///
/// `Planned -> RolledBack` covers a plan the injector refuses to apply.
/// `Validated -> RolledBack` covers a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Scanned,
    Detected,
    Planned,
    Injected,
    Validated,
    Committed,
    RolledBack,
    Skipped,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanned => "scanned",
            Self::Detected => "detected",
            Self::Planned => "planned",
            Self::Injected => "injected",
            Self::Validated => "validated",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Skipped)
    }

    /// Whether `next` may follow `self`.
    pub fn can_transition_to(&self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Scanned, Detected)
                | (Detected, Planned)
                | (Detected, Skipped)
                | (Planned, Injected)
                | (Planned, Skipped)
                | (Planned, RolledBack)
                | (Injected, Validated)
                | (Injected, RolledBack)
                | (Validated, Committed)
                | (Validated, RolledBack)
        )
    }

    /// Checked transition.
    pub fn advance(self, next: FileState) -> Result<FileState, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
