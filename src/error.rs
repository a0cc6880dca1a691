// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the instrumentation engine.
//!
//! Each stage of the per-file pipeline has its own strongly-typed error,
//! defined with `thiserror`. File-level errors are folded into the run
//! report as diagnostics; only [`RunError`] aborts a run. `anyhow` is used
//! at the binary edge for propagation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing or querying a syntax tree.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("Failed to initialise parser: {0}")]
    LanguageInit(String),

    #[error("Parser produced no tree for {0}")]
    NoTree(String),

    #[error("Source already contains {count} syntax error(s), first at line {line}")]
    PreexistingErrors { count: usize, line: u32 },

    #[error("Source is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Failure to bring a source file into memory.
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Errors that can occur during framework detection.
#[derive(Error, Debug, Clone)]
pub enum DetectionError {
    #[error("Dependency manifest unreadable: {0}")]
    ManifestUnreadable(String),

    #[error("Invalid manifest entry in {file}: {message}")]
    InvalidEntry { file: String, message: String },

    #[error("IO error during detection: {0}")]
    IoError(String),
}

impl From<std::io::Error> for DetectionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Self::ManifestUnreadable(err.to_string())
            }
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Errors from the platform registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Platform not found: {0}")]
    NotFound(String),

    #[error("No usable platform descriptors were loaded")]
    Empty,

    #[error("Descriptor {source_name} is missing capabilities: {}", missing.join(", "))]
    MissingCapabilities {
        source_name: String,
        missing: Vec<String>,
    },

    #[error("Invalid descriptor {source_name}: {message}")]
    InvalidDescriptor { source_name: String, message: String },

    #[error("Duplicate platform name: {0}")]
    Duplicate(String),

    #[error("IO error reading plugin directory: {0}")]
    IoError(String),
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors from pattern lookup.
///
/// `Clone` so that one memoised failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("No instrumentation pattern for {framework} on {platform}")]
    NotFound { framework: String, platform: String },

    #[error("Pattern provider failed: {0}")]
    ProviderFailed(String),

    #[error("Invalid pattern {id}: {message}")]
    Invalid { id: String, message: String },
}

impl PatternError {
    /// Create a not-found error for a framework/platform pair.
    pub fn not_found(framework: impl Into<String>, platform: impl Into<String>) -> Self {
        Self::NotFound {
            framework: framework.into(),
            platform: platform.into(),
        }
    }

    /// Whether this error means "no knowledge" rather than "lookup broke".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Two pattern sources target the same anchor node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Conflicting edits on {anchor} (line {line}) from patterns {}", pattern_ids.join(", "))]
pub struct PlanConflictError {
    /// Display form of the contested node reference.
    pub anchor: String,
    /// 1-indexed line of the contested node.
    pub line: u32,
    /// Pattern ids that collided.
    pub pattern_ids: Vec<String>,
}

/// Errors raised while applying an edit plan to text.
#[derive(Error, Debug, Clone)]
pub enum InjectError {
    #[error("Node reference {0} does not resolve in the current tree")]
    UnresolvedAnchor(String),

    #[error("Node reference {anchor} resolved to {found}, expected {expected}")]
    AnchorKindMismatch {
        anchor: String,
        expected: String,
        found: String,
    },

    #[error("Plan contains two {kind} edits for node {anchor}")]
    DuplicateAnchor { anchor: String, kind: String },

    #[error("Edit {edit_id} cannot be applied: {message}")]
    Inapplicable { edit_id: usize, message: String },

    #[error("Re-parse after injection failed: {0}")]
    Reparse(#[from] ParseError),
}

/// Post-edit validation failure.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Edited source has {count} syntax error(s); first at line {line}")]
    SyntaxBroken { count: usize, line: u32 },

    #[error("Formatter failed: {0}")]
    FormatFailed(String),
}

/// Errors that abort a file's commit.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("File changed on disk since scan: {0}")]
    ChangedOnDisk(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for CommitError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// A file pipeline tried to move between states out of order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

/// Run-level failures. Everything else is a per-file diagnostic.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Platform registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Target path is not a directory: {0}")]
    InvalidTarget(PathBuf),

    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidExclude { pattern: String, message: String },

    #[error("Run cancelled")]
    Cancelled,
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
