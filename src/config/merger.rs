// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{InstrumentConfig, InstrumentationLevel, InstrumentationTarget, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub platform: Option<String>,
    pub level: Option<InstrumentationLevel>,
    pub targets: Option<Vec<InstrumentationTarget>>,
    pub frameworks: Option<Vec<String>>,
    /// Added to the configured exclude list rather than replacing it.
    pub exclude: Vec<String>,
    pub jobs: Option<usize>,
    pub min_confidence: Option<f64>,
    pub dry_run: Option<bool>,
    pub formatter: Option<Vec<String>>,
    pub platform_dirs: Vec<PathBuf>,
    pub pattern_dirs: Vec<PathBuf>,
}

/// Default configuration values.
pub fn default_config() -> InstrumentConfig {
    InstrumentConfig::default()
}

/// Merge configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Workspace config (.instrumentor.json / .instrumentor.yaml)
/// 3. Preset defaults
///
/// Choosing a level resets the target set to that level's preset; explicit
/// targets from the same or a higher source win over it.
pub fn merge_config(workspace: Option<WorkspaceConfig>, cli: CliOptions) -> InstrumentConfig {
    let mut result = default_config();

    // Apply workspace config
    if let Some(config) = workspace {
        apply_workspace_config(&mut result, &config);
    }

    // Apply CLI options (highest precedence)
    apply_cli_options(&mut result, &cli);

    result
}

fn apply_level(result: &mut InstrumentConfig, level: InstrumentationLevel) {
    result.level = level;
    result.targets = level.targets();
}

fn apply_workspace_config(result: &mut InstrumentConfig, config: &WorkspaceConfig) {
    if let Some(level) = config.level {
        apply_level(result, level);
    }

    if let Some(ref targets) = config.targets {
        result.targets = targets.clone();
    }

    if let Some(ref platform) = config.platform {
        result.platform = platform.clone();
    }

    if let Some(ref frameworks) = config.frameworks {
        result.frameworks = frameworks.clone();
    }

    if let Some(ref patterns) = config.exclude_patterns {
        result.exclude_patterns = patterns.clone();
    }

    if let Some(jobs) = config.parallel_jobs {
        result.parallel_jobs = jobs;
    }

    if let Some(min_confidence) = config.min_confidence {
        result.min_confidence = min_confidence;
    }

    if let Some(dry_run) = config.dry_run {
        result.dry_run = dry_run;
    }

    if config.formatter.is_some() {
        result.formatter = config.formatter.clone();
    }

    if let Some(ref dirs) = config.platform_dirs {
        result.platform_dirs.extend(dirs.iter().cloned());
    }

    if let Some(ref dirs) = config.pattern_dirs {
        result.pattern_dirs.extend(dirs.iter().cloned());
    }
}

fn apply_cli_options(result: &mut InstrumentConfig, cli: &CliOptions) {
    if let Some(level) = cli.level {
        apply_level(result, level);
    }

    if let Some(ref targets) = cli.targets {
        result.targets = targets.clone();
    }

    if let Some(ref platform) = cli.platform {
        result.platform = platform.clone();
    }

    if let Some(ref frameworks) = cli.frameworks {
        result.frameworks = frameworks.clone();
    }

    for pattern in &cli.exclude {
        if !result.exclude_patterns.contains(pattern) {
            result.exclude_patterns.push(pattern.clone());
        }
    }

    if let Some(jobs) = cli.jobs {
        result.parallel_jobs = jobs;
    }

    if let Some(min_confidence) = cli.min_confidence {
        result.min_confidence = min_confidence;
    }

    if let Some(dry_run) = cli.dry_run {
        result.dry_run = dry_run;
    }

    if cli.formatter.is_some() {
        result.formatter = cli.formatter.clone();
    }

    result.platform_dirs.extend(cli.platform_dirs.iter().cloned());
    result.pattern_dirs.extend(cli.pattern_dirs.iter().cloned());
}
