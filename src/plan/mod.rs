// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Edit planning.
//!
//! An [`EditPlan`] is an ordered list of [`InjectionPoint`]s anchored to
//! [`NodeRef`](crate::ast::NodeRef)s rather than byte offsets. Plans are
//! built fresh per run and discarded after validation.

mod planner;
mod types;

pub use planner::{contains_block, normalize_block, InjectionPlanner, NormalizedBlock, PlanInput};
pub use types::{EditKind, EditPlan, InjectionPoint};
