// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Run configuration.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Workspace config: .instrumentor.json, .instrumentor.yaml, or .instrumentor/config.json
//! - CLI options: converted from command-line arguments by the binary
//!
//! Configuration is merged with precedence (CLI > workspace > preset defaults)
//! into one [`InstrumentConfig`] value.

mod loader;
mod merger;
mod types;

// Re-export public types
pub use loader::{
    get_global_config_dir, get_platform_plugin_dir, load_config_file, load_workspace_config,
    CONFIG_FILES, GLOBAL_CONFIG_DIR, PLATFORM_PLUGIN_DIR,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    InstrumentConfig, InstrumentationLevel, InstrumentationTarget, WorkspaceConfig,
    DEFAULT_EXCLUDES, DEFAULT_MIN_CONFIDENCE, DEFAULT_PLATFORM,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load, merge and validate all configuration sources for a workspace.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<InstrumentConfig, ConfigError> {
    let workspace = load_workspace_config(workspace_root)?;
    let config = merge_config(workspace, cli_options);
    config.validate()?;
    Ok(config)
}
