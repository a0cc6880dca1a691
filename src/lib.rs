// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agent-instrumentor - observability instrumentation for agent codebases.
//!
//! Detects which agent framework a Python project uses, plans edits from an
//! instrumentation pattern, applies them as span-based text patches and
//! commits a file only after the result re-parses cleanly.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Run configuration loading and merging
//! - [`telemetry`] - Tracing and metrics infrastructure
//! - [`ast`] - Tolerant Python parsing, queries and stable node references
//! - [`detect`] - Framework catalog, manifest reading and detection
//! - [`platforms`] - Observability platform descriptors and registry
//! - [`patterns`] - Instrumentation patterns, providers and the per-run memo
//! - [`plan`] - Injection points and the conflict-checked planner
//! - [`inject`] - Reverse-order span edits
//! - [`validate`] - Re-parse, bisection, formatting and atomic commit
//! - [`pipeline`] - File state machine, worker pool and run report
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_instrumentor::config::{load_config, CliOptions};
//! use agent_instrumentor::pipeline::Runner;
//!
//! let config = load_config(root, CliOptions::default())?;
//! let report = Runner::discover(config)?.run(root, None).await?;
//! for diagnostic in &report.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! ```

pub mod ast;
pub mod config;
pub mod detect;
pub mod error;
pub mod inject;
pub mod patterns;
pub mod pipeline;
pub mod plan;
pub mod platforms;
pub mod telemetry;
pub mod validate;

// Re-export commonly used types at crate root
pub use config::{InstrumentConfig, InstrumentationLevel, InstrumentationTarget};
pub use error::{
    CommitError, ConfigError, DetectionError, InjectError, ParseError, PatternError,
    PlanConflictError, RegistryError, Result, RunError, ValidationError,
};
pub use pipeline::{Diagnostic, FileState, RunReport, Runner};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
