// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the workspace file format and the resolved run configuration,
//! supporting JSON and YAML formats.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Level of instrumentation detail. Each level implies a target set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentationLevel {
    Minimal,
    #[default]
    Standard,
    Comprehensive,
}

impl InstrumentationLevel {
    /// Targets instrumented at this level.
    pub fn targets(&self) -> Vec<InstrumentationTarget> {
        use InstrumentationTarget::*;
        match self {
            Self::Minimal => vec![LlmCalls],
            Self::Standard => vec![Tools, LlmCalls, Chains, Errors],
            Self::Comprehensive => InstrumentationTarget::ALL.to_vec(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl FromStr for InstrumentationLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "standard" => Ok(Self::Standard),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(ConfigError::InvalidValue {
                field: "level".to_string(),
                message: format!("unknown level '{}'", other),
            }),
        }
    }
}

/// Agent components that can be instrumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentationTarget {
    Tools,
    LlmCalls,
    Rag,
    Memory,
    Chains,
    Errors,
    SubAgents,
    Prompts,
}

impl InstrumentationTarget {
    pub const ALL: [InstrumentationTarget; 8] = [
        Self::Tools,
        Self::LlmCalls,
        Self::Rag,
        Self::Memory,
        Self::Chains,
        Self::Errors,
        Self::SubAgents,
        Self::Prompts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::LlmCalls => "llm_calls",
            Self::Rag => "rag",
            Self::Memory => "memory",
            Self::Chains => "chains",
            Self::Errors => "errors",
            Self::SubAgents => "sub_agents",
            Self::Prompts => "prompts",
        }
    }
}

impl FromStr for InstrumentationTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "targets".to_string(),
                message: format!("unknown target '{}'", s),
            })
    }
}

impl std::fmt::Display for InstrumentationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workspace configuration file contents.
/// Can be defined in .instrumentor.json, .instrumentor.yaml or
/// .instrumentor/config.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Observability platform to target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Instrumentation level preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<InstrumentationLevel>,

    /// Explicit targets (overrides the level's target set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<InstrumentationTarget>>,

    /// Frameworks to instrument (empty = all detected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frameworks: Option<Vec<String>>,

    /// Glob patterns of files to leave alone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,

    /// Worker count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_jobs: Option<usize>,

    /// Minimum detection confidence for a framework to be instrumented
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,

    /// Run everything except the final write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// External formatter command reading stdin and writing stdout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatter: Option<Vec<String>>,

    /// Extra directories scanned for platform descriptors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_dirs: Option<Vec<PathBuf>>,

    /// Directories holding `<framework>.<platform>.yaml` pattern files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_dirs: Option<Vec<PathBuf>>,
}

/// Default exclude globs: tests and virtual environments.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/test_*.py",
    "**/*_test.py",
    "**/tests/**",
    "**/.venv/**",
    "**/venv/**",
    "**/site-packages/**",
    "**/__pycache__/**",
];

/// Default minimum confidence.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

/// Default platform.
pub const DEFAULT_PLATFORM: &str = "langfuse";

/// Resolved run configuration with all values set.
///
/// This is the single configuration value the engine consumes; it never
/// reads process arguments itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentConfig {
    pub platform: String,
    pub level: InstrumentationLevel,
    pub targets: Vec<InstrumentationTarget>,
    pub frameworks: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub parallel_jobs: usize,
    pub min_confidence: f64,
    pub dry_run: bool,
    pub formatter: Option<Vec<String>>,
    pub platform_dirs: Vec<PathBuf>,
    pub pattern_dirs: Vec<PathBuf>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self::preset(InstrumentationLevel::Standard)
    }
}

impl InstrumentConfig {
    /// Configuration for a level preset.
    pub fn preset(level: InstrumentationLevel) -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            level,
            targets: level.targets(),
            frameworks: Vec::new(),
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            parallel_jobs: default_parallel_jobs(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            dry_run: false,
            formatter: None,
            platform_dirs: Vec::new(),
            pattern_dirs: Vec::new(),
        }
    }

    /// Whether a target is in scope for this run.
    pub fn should_instrument(&self, target: InstrumentationTarget) -> bool {
        self.targets.contains(&target)
    }

    /// Whether a framework is in scope (all are when the list is empty).
    pub fn includes_framework(&self, framework: &str) -> bool {
        self.frameworks.is_empty() || self.frameworks.iter().any(|f| f == framework)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "platform".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "minConfidence".to_string(),
                message: format!("{} is outside [0, 1]", self.min_confidence),
            });
        }
        if self.parallel_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallelJobs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.formatter.as_ref().is_some_and(|cmd| cmd.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "formatter".to_string(),
                message: "command must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_parallel_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
