// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Run report.
//!
//! The aggregate result of one run and the contract surfaced to the CLI.
//! File pipelines never touch it directly: each hands a [`FileOutcome`] to
//! the single task that owns the report.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::detect::FrameworkMatch;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::state::FileState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Pipeline stage a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scan,
    Detect,
    Pattern,
    Plan,
    Inject,
    Validate,
    Format,
    Commit,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scan => "scan",
            Self::Detect => "detect",
            Self::Pattern => "pattern",
            Self::Plan => "plan",
            Self::Inject => "inject",
            Self::Validate => "validate",
            Self::Format => "format",
            Self::Commit => "commit",
            Self::Pipeline => "pipeline",
        })
    }
}

/// A non-fatal problem with enough context to reproduce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity,
            stage,
            file: None,
            pattern_id: None,
            edit_id: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, stage, message)
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, stage, message)
    }

    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, stage, message)
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_pattern(mut self, pattern_id: impl Into<String>) -> Self {
        self.pattern_id = Some(pattern_id.into());
        self
    }

    pub fn with_edit(mut self, edit_id: usize) -> Self {
        self.edit_id = Some(edit_id);
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.severity)?;
        if let Some(file) = &self.file {
            write!(f, " {}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
        }
        if let Some(id) = &self.pattern_id {
            write!(f, " (pattern {})", id)?;
        }
        if let Some(id) = self.edit_id {
            write!(f, " (edit {})", id)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// What one file pipeline hands back to the report.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub state: FileState,
    pub diagnostics: Vec<Diagnostic>,
    /// At least one pattern was resolved for this file.
    pub platform_used: bool,
}

impl FileOutcome {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: FileState::Scanned,
            diagnostics: Vec::new(),
            platform_used: false,
        }
    }

    /// Move to `next`. An illegal move is recorded as a diagnostic and the
    /// state is left as it was.
    pub fn advance(&mut self, next: FileState) -> &mut Self {
        match self.state.advance(next) {
            Ok(state) => self.state = state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State machine violation");
                let diagnostic = Diagnostic::error(Stage::Pipeline, e.to_string())
                    .with_file(self.path.clone());
                self.diagnostics.push(diagnostic);
            }
        }
        self
    }

    /// Attach a diagnostic for this file.
    pub fn push(&mut self, diagnostic: Diagnostic) -> &mut Self {
        let diagnostic = if diagnostic.file.is_none() {
            diagnostic.with_file(self.path.clone())
        } else {
            diagnostic
        };
        self.diagnostics.push(diagnostic);
        self
    }
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub root: PathBuf,
    pub platform: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub files_scanned: usize,
    pub frameworks_detected: Vec<FrameworkMatch>,
    pub platforms_used: Vec<String>,
    /// Committed files; with `dry_run`, the files that would be written.
    pub files_modified: Vec<PathBuf>,
    pub files_rolled_back: Vec<PathBuf>,
    pub files_skipped: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn new(root: impl Into<PathBuf>, platform: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            root: root.into(),
            platform: platform.into(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            cancelled: false,
            files_scanned: 0,
            frameworks_detected: Vec::new(),
            platforms_used: Vec::new(),
            files_modified: Vec::new(),
            files_rolled_back: Vec::new(),
            files_skipped: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Fold one terminal file outcome into the report.
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome.state {
            FileState::Committed => self.files_modified.push(outcome.path),
            FileState::RolledBack => self.files_rolled_back.push(outcome.path),
            FileState::Skipped => self.files_skipped.push(outcome.path),
            state => {
                let diagnostic = Diagnostic::error(
                    Stage::Pipeline,
                    format!("File pipeline ended in non-terminal state {}", state),
                )
                .with_file(outcome.path.clone());
                self.diagnostics.push(diagnostic);
                self.files_skipped.push(outcome.path);
            }
        }
        if outcome.platform_used && !self.platforms_used.contains(&self.platform) {
            self.platforms_used.push(self.platform.clone());
        }
        self.diagnostics.extend(outcome.diagnostics);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_outcome(outcome.state.as_str());
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Stamp the end time and sort file lists for stable output.
    pub fn finish(&mut self) {
        self.files_modified.sort();
        self.files_rolled_back.sort();
        self.files_skipped.sort();
        self.finished_at = Some(Utc::now());
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Diagnostics attached to `file`.
    pub fn diagnostics_for<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| d.file.as_deref() == Some(file))
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(path: &str, state: FileState) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from(path),
            state,
            diagnostics: Vec::new(),
            platform_used: true,
        }
    }

    #[test]
    fn test_record_by_state() {
        let mut report = RunReport::new("/proj", "langfuse", false);
        report.record(outcome("b.py", FileState::Committed));
        report.record(outcome("a.py", FileState::Committed));
        report.record(outcome("c.py", FileState::RolledBack));
        report.record(outcome("d.py", FileState::Skipped));
        report.finish();

        assert_eq!(report.files_modified, vec![PathBuf::from("a.py"), PathBuf::from("b.py")]);
        assert_eq!(report.files_rolled_back, vec![PathBuf::from("c.py")]);
        assert_eq!(report.files_skipped, vec![PathBuf::from("d.py")]);
        assert_eq!(report.platforms_used, vec!["langfuse".to_string()]);
        assert!(report.finished_at.is_some());
        assert!(!report.has_errors());
    }

    #[test]
    fn test_non_terminal_outcome_is_flagged() {
        let mut report = RunReport::new("/proj", "langfuse", false);
        report.record(outcome("a.py", FileState::Planned));
        assert_eq!(report.files_skipped.len(), 1);
        assert!(report.has_errors());
        assert_eq!(report.diagnostics[0].stage, Stage::Pipeline);
    }

    #[test]
    fn test_outcome_illegal_advance() {
        let mut outcome = FileOutcome::new("a.py");
        outcome.advance(FileState::Committed);
        assert_eq!(outcome.state, FileState::Scanned);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].file.as_deref(), Some(Path::new("a.py")));

        outcome.advance(FileState::Detected).advance(FileState::Skipped);
        assert_eq!(outcome.state, FileState::Skipped);
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::error(Stage::Validate, "broken")
            .with_file("agent.py")
            .with_line(4)
            .with_pattern("langfuse/langchain")
            .with_edit(2);
        assert_eq!(
            diagnostic.to_string(),
            "[validate] error agent.py:4 (pattern langfuse/langchain) (edit 2): broken"
        );
    }

    #[test]
    fn test_report_json() {
        let mut report = RunReport::new("/proj", "langfuse", true);
        let mut outcome = FileOutcome::new("a.py");
        outcome.push(Diagnostic::warning(Stage::Format, "black missing"));
        outcome.advance(FileState::Detected).advance(FileState::Skipped);
        report.record(outcome);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["diagnostics"][0]["stage"], "format");
        assert_eq!(json["diagnostics"][0]["file"], "a.py");
        assert!(json["diagnostics"][0].get("edit_id").is_none());
        assert_eq!(report.diagnostics_for(Path::new("a.py")).count(), 1);
    }
}
