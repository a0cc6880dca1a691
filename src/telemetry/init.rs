// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Log subscriber setup for the command-line tool.
//!
//! Everything is written to stderr. Stdout carries the run report, which
//! has to stay parseable when `--json` is given.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Crate target used in filter directives.
const CRATE_TARGET: &str = "agent_instrumentor";

/// How run logs are rendered.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level for this crate's events when `RUST_LOG` is unset.
    pub level: Level,

    /// Level for every other crate.
    pub dependency_level: Level,

    /// Log when per-file spans close, with their busy time.
    pub file_span_timing: bool,

    /// Source location on each event.
    pub include_file_line: bool,

    /// `None` picks colors when stderr is a terminal.
    pub ansi_colors: Option<bool>,

    /// Directive replacing both levels, e.g. `agent_instrumentor::plan=trace`.
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            dependency_level: Level::ERROR,
            file_span_timing: false,
            include_file_line: false,
            ansi_colors: None,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Per-file span timings and source locations at debug level.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            dependency_level: Level::WARN,
            file_span_timing: true,
            include_file_line: true,
            ansi_colors: None,
            filter_directive: None,
        }
    }

    /// Errors only, no colors.
    pub fn production() -> Self {
        Self {
            level: Level::ERROR,
            ansi_colors: Some(false),
            ..Self::default()
        }
    }

    /// Everything from this crate, plain text.
    pub fn testing() -> Self {
        Self {
            level: Level::TRACE,
            file_span_timing: true,
            include_file_line: true,
            ansi_colors: Some(false),
            filter_directive: Some(format!("{}=trace", CRATE_TARGET)),
            ..Self::default()
        }
    }

    /// Map a `-v` count: none shows warnings, `-v` shows per-run progress,
    /// `-vv` planning decisions with per-file timings and `-vvv` traces.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::default(),
            1 => Self::default().with_level(Level::INFO),
            2 => Self::development(),
            _ => Self {
                dependency_level: Level::DEBUG,
                ..Self::development().with_level(Level::TRACE)
            },
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = Some(ansi);
        self
    }

    /// The directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        match &self.filter_directive {
            Some(directive) => directive.clone(),
            None => format!(
                "{},{}={}",
                self.dependency_level.as_str().to_lowercase(),
                CRATE_TARGET,
                self.level.as_str().to_lowercase()
            ),
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.filter_directive.is_none() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::try_new(self.directive())
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }
}

/// Returned by [`init_telemetry`]. Hold it until the process exits.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let span_events = if config.file_span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let ansi = config
        .ansi_colors
        .unwrap_or_else(|| io::stderr().is_terminal());

    let fmt_layer = fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_target(config.include_file_line)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_quiet() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, Level::WARN);
        assert!(!config.file_span_timing);
        assert_eq!(config.directive(), "error,agent_instrumentor=warn");
    }

    #[test]
    fn test_presets() {
        let dev = TelemetryConfig::development();
        assert_eq!(dev.level, Level::DEBUG);
        assert!(dev.file_span_timing);
        assert_eq!(dev.directive(), "warn,agent_instrumentor=debug");

        let prod = TelemetryConfig::production();
        assert_eq!(prod.directive(), "error,agent_instrumentor=error");
        assert_eq!(prod.ansi_colors, Some(false));

        assert_eq!(TelemetryConfig::testing().directive(), "agent_instrumentor=trace");
    }

    #[test]
    fn test_from_verbosity() {
        assert_eq!(TelemetryConfig::from_verbosity(0).level, Level::WARN);
        assert_eq!(TelemetryConfig::from_verbosity(1).level, Level::INFO);
        assert_eq!(TelemetryConfig::from_verbosity(2).level, Level::DEBUG);

        let trace = TelemetryConfig::from_verbosity(5);
        assert_eq!(trace.level, Level::TRACE);
        assert!(trace.include_file_line);
        assert_eq!(trace.directive(), "debug,agent_instrumentor=trace");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = TelemetryConfig::from_verbosity(2)
            .with_filter("agent_instrumentor::plan=trace")
            .with_ansi(false);
        assert_eq!(config.directive(), "agent_instrumentor::plan=trace");
        assert_eq!(config.ansi_colors, Some(false));
    }
}
