// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading the workspace configuration from JSON and YAML files.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::WorkspaceConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".instrumentor.json",
    ".instrumentor.yaml",
    ".instrumentor/config.json",
];

/// Global directory name under the user's home.
pub const GLOBAL_CONFIG_DIR: &str = ".agent-instrumentor";

/// Subdirectory of the global directory holding platform descriptors.
pub const PLATFORM_PLUGIN_DIR: &str = "platforms";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// The fixed location scanned for user platform descriptors.
pub fn get_platform_plugin_dir() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(PLATFORM_PLUGIN_DIR))
}

/// Load workspace configuration from the workspace root.
///
/// Searches for config files in the following order:
/// 1. .instrumentor.json
/// 2. .instrumentor.yaml
/// 3. .instrumentor/config.json
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        "json" => serde_json::from_str(&content).map_err(ConfigError::from),
        other => Err(ConfigError::InvalidFormat(format!(
            "unsupported config extension '{}' for {}",
            other,
            path.display()
        ))),
    }
}
