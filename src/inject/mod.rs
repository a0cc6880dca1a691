// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code injection.
//!
//! Edits are `(span, replacement)` pairs into the immutable original text;
//! tree nodes are never mutated.

mod edit;
mod injector;

pub use edit::{apply_edits, TextEdit};
pub use injector::{CodeInjector, Injection};
