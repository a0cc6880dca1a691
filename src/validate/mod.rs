// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Validation and commit.
//!
//! Injected text is re-parsed before anything touches disk. Valid text goes
//! through the optional [`Formatter`] and is then written with
//! [`commit_atomic`]; invalid text is rolled back to the original buffer.

mod commit;
mod formatter;
mod validator;

pub use commit::{commit, commit_atomic};
pub use formatter::{CommandFormatter, Formatter, NoopFormatter, FORMAT_TIMEOUT};
pub use validator::{bisect, Culprit, ValidationResult, Validator};
