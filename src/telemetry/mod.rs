// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and run metrics.
//!
//! Pipeline stages log through `tracing`; each file is processed inside a
//! span carrying its path. With the `telemetry` feature each stage also
//! records its latency in [`GLOBAL_METRICS`], and every file its terminal
//! state.
//!
//! ```rust,ignore
//! use agent_instrumentor::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_verbosity(1))?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Metrics, MetricsSnapshot, StageTiming, GLOBAL_METRICS};
