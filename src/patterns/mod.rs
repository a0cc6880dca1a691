// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instrumentation patterns and where they come from.
//!
//! Patterns are looked up through a [`PatternProvider`] and memoised per
//! run by [`PatternCache`], which falls back to the platform descriptor's
//! built-in patterns when the provider is absent or cannot answer.

mod cache;
mod pattern;
mod provider;

pub use cache::PatternCache;
pub use pattern::{CallSiteRule, InstrumentationPattern, MergeMode, PatternTemplate};
pub use provider::{DirPatternProvider, PatternProvider, StaticPatternProvider};
#[cfg(test)]
pub use provider::MockPatternProvider;
