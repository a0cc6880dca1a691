// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Post-injection validation.
//!
//! The injected text must parse without error nodes. When it does not, the
//! edits are bisected to find the one that broke the file; the caller then
//! rolls back to the original buffer.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ast::{parse, SourceFile, SyntaxErrorInfo};
use crate::error::ValidationError;
use crate::inject::{apply_edits, Injection, TextEdit};
use crate::plan::EditPlan;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::formatter::{Formatter, NoopFormatter};

/// The edit that introduced a syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Culprit {
    pub edit_id: usize,
    pub pattern_id: String,
    /// Line of the edit's anchor.
    pub line: u32,
}

/// Outcome of validating one file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub success: bool,
    /// Syntax errors of the injected text. Empty on success.
    pub errors: Vec<SyntaxErrorInfo>,
    /// Text to commit on success; the original text on failure.
    pub text: String,
    /// Set when validation failed and bisection isolated an edit.
    pub culprit: Option<Culprit>,
    /// Set when the formatter failed and unformatted text was kept.
    pub format_error: Option<String>,
}

impl ValidationResult {
    /// The failure as an error value, if validation failed.
    pub fn error(&self) -> Option<ValidationError> {
        if self.success {
            return None;
        }
        Some(ValidationError::SyntaxBroken {
            count: self.errors.len(),
            line: self.errors.first().map_or(0, |e| e.line),
        })
    }
}

/// Re-parses injected text and runs the formatting pass.
pub struct Validator {
    formatter: Arc<dyn Formatter>,
}

impl Validator {
    pub fn new(formatter: Arc<dyn Formatter>) -> Self {
        Self { formatter }
    }

    pub fn without_formatter() -> Self {
        Self::new(Arc::new(NoopFormatter))
    }

    /// Validate `injection`, the result of applying `plan` to `file`.
    pub async fn validate(
        &self,
        file: &SourceFile,
        plan: &EditPlan,
        injection: &Injection,
    ) -> ValidationResult {
        let start = Instant::now();

        let result = if injection.tree.has_errors() {
            let errors = injection.tree.errors();
            let culprit = bisect(file.original(), &injection.edits).and_then(|edit_id| {
                plan.points().iter().find(|p| p.id == edit_id).map(|p| Culprit {
                    edit_id,
                    pattern_id: p.pattern_id.clone(),
                    line: p.line,
                })
            });
            warn!(
                path = %file.path().display(),
                errors = errors.len(),
                edit_id = ?culprit.as_ref().map(|c| c.edit_id),
                pattern_id = ?culprit.as_ref().map(|c| c.pattern_id.as_str()),
                "Injected code does not parse"
            );
            ValidationResult {
                success: false,
                errors,
                text: file.original().to_string(),
                culprit,
                format_error: None,
            }
        } else {
            let (text, format_error) = self.format(&injection.text).await;
            ValidationResult {
                success: true,
                errors: Vec::new(),
                text,
                culprit: None,
                format_error,
            }
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("validate.run", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        result
    }

    /// Formatted text, or the input with the reason formatting was dropped.
    async fn format(&self, text: &str) -> (String, Option<String>) {
        match self.formatter.format(text).await {
            Ok(formatted) if breaks(&formatted) => {
                let reason = format!("{} produced unparsable output", self.formatter.name());
                warn!("{}; keeping unformatted text", reason);
                (text.to_string(), Some(reason))
            }
            Ok(formatted) => (formatted, None),
            Err(e) => {
                warn!(error = %e, "Formatting failed; keeping unformatted text");
                (text.to_string(), Some(e.to_string()))
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::without_formatter()
    }
}

/// Find the edit that breaks parsing.
///
/// Each edit is first applied alone to `original`; the first one that breaks
/// the parse is the culprit. When every edit parses alone, growing prefixes
/// are applied and the last edit of the first broken prefix is blamed.
pub fn bisect(original: &str, edits: &[TextEdit]) -> Option<usize> {
    for edit in edits {
        let broken = apply_edits(original, std::slice::from_ref(edit))
            .map_or(true, |text| breaks(&text));
        if broken {
            debug!(edit_id = edit.edit_id, "Edit breaks the file on its own");
            return Some(edit.edit_id);
        }
    }

    (1..=edits.len()).find_map(|k| {
        let broken = apply_edits(original, &edits[..k]).map_or(true, |text| breaks(&text));
        broken.then(|| edits[k - 1].edit_id)
    })
}

fn breaks(text: &str) -> bool {
    parse(text).map_or(true, |tree| tree.has_errors())
}
