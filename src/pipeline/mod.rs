// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-file pipelines and the run that drives them.
//!
//! Each file moves `Scanned -> Detected -> Planned -> Injected -> Validated`
//! and ends `Committed`, `RolledBack` or `Skipped`. Files are independent;
//! a failure in one never aborts the others.
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_instrumentor::config::InstrumentConfig;
//! use agent_instrumentor::pipeline::Runner;
//!
//! let runner = Runner::discover(InstrumentConfig::default())?;
//! let report = runner.run(Path::new("./my-agent"), None).await?;
//! println!("{} files instrumented", report.files_modified.len());
//! ```

mod report;
mod runner;
mod state;

pub use report::{Diagnostic, FileOutcome, RunReport, Severity, Stage};
pub use runner::{ProgressCallback, RunProgress, Runner, Scan};
pub use state::FileState;
