// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Platform registry.
//!
//! Built once per process from the embedded descriptors plus any descriptor
//! files found in plugin directories, then shared read-only. A candidate
//! that fails the capability check is skipped and recorded as a
//! [`RegistryDiagnostic`]; only an empty registry is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::get_platform_plugin_dir;
use crate::error::RegistryError;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::descriptor::{PlatformDescriptor, YamlPlatform};

const BUILTIN_DESCRIPTORS: [(&str, &str); 4] = [
    ("builtin/langfuse.yaml", include_str!("builtin/langfuse.yaml")),
    ("builtin/langsmith.yaml", include_str!("builtin/langsmith.yaml")),
    ("builtin/phoenix.yaml", include_str!("builtin/phoenix.yaml")),
    ("builtin/datadog.yaml", include_str!("builtin/datadog.yaml")),
];

const DESCRIPTOR_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// A descriptor candidate that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryDiagnostic {
    pub source: String,
    pub message: String,
}

/// Read-only, name-sorted set of platform descriptors.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    platforms: BTreeMap<String, Arc<dyn PlatformDescriptor>>,
    diagnostics: Vec<RegistryDiagnostic>,
}

impl PlatformRegistry {
    pub fn builder() -> PlatformRegistryBuilder {
        PlatformRegistryBuilder::new()
    }

    /// Built-ins, then the global plugin directory, then `extra_dirs`.
    pub fn discover(extra_dirs: &[PathBuf]) -> Result<Self, RegistryError> {
        let mut builder = PlatformRegistryBuilder::new();
        builder.with_builtins();
        if let Some(dir) = get_platform_plugin_dir() {
            builder.with_dir(&dir);
        }
        for dir in extra_dirs {
            builder.with_dir(dir);
        }
        builder.build()
    }

    /// Look up a platform by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn PlatformDescriptor>, RegistryError> {
        self.platforms
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    /// All descriptors, sorted by name.
    pub fn list_all(&self) -> Vec<Arc<dyn PlatformDescriptor>> {
        self.platforms.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.platforms.keys().map(String::as_str).collect()
    }

    /// Candidates skipped while building.
    pub fn diagnostics(&self) -> &[RegistryDiagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

/// Builder for constructing a [`PlatformRegistry`].
pub struct PlatformRegistryBuilder {
    platforms: BTreeMap<String, Arc<dyn PlatformDescriptor>>,
    diagnostics: Vec<RegistryDiagnostic>,
    started: Instant,
}

impl PlatformRegistryBuilder {
    pub fn new() -> Self {
        Self {
            platforms: BTreeMap::new(),
            diagnostics: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Register the embedded descriptors.
    pub fn with_builtins(&mut self) -> &mut Self {
        for (source, text) in BUILTIN_DESCRIPTORS {
            self.load(source, YamlPlatform::from_yaml(source, text));
        }
        self
    }

    /// Register every descriptor file in `dir`, in file-name order.
    ///
    /// A missing directory is not a problem; an unreadable one is recorded.
    pub fn with_dir(&mut self, dir: &Path) -> &mut Self {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Plugin directory does not exist");
            return self;
        }

        let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|e| DESCRIPTOR_EXTENSIONS.contains(&e))
                })
                .collect(),
            Err(e) => {
                self.skip(&dir.display().to_string(), RegistryError::from(e).to_string());
                return self;
            }
        };
        paths.sort();

        for path in paths {
            let source = path.display().to_string();
            let result = match std::fs::read_to_string(&path) {
                Ok(text) if path.extension().and_then(|e| e.to_str()) == Some("json") => {
                    YamlPlatform::from_json(&source, &text)
                }
                Ok(text) => YamlPlatform::from_yaml(&source, &text),
                Err(e) => Err(RegistryError::from(e)),
            };
            self.load(&source, result);
        }
        self
    }

    /// Register a descriptor. A name already taken is skipped.
    pub fn register(&mut self, descriptor: Arc<dyn PlatformDescriptor>) -> &mut Self {
        let name = descriptor.name().to_string();
        if self.platforms.contains_key(&name) {
            self.skip(&name, RegistryError::Duplicate(name.clone()).to_string());
        } else {
            debug!(platform = %name, "Registered platform");
            self.platforms.insert(name, descriptor);
        }
        self
    }

    fn load(&mut self, source: &str, result: Result<YamlPlatform, RegistryError>) {
        match result {
            Ok(platform) => {
                if self.platforms.contains_key(platform.name()) {
                    let message = RegistryError::Duplicate(platform.name().to_string()).to_string();
                    self.skip(source, message);
                } else {
                    self.register(Arc::new(platform));
                }
            }
            Err(e) => self.skip(source, e.to_string()),
        }
    }

    fn skip(&mut self, source: &str, message: String) {
        warn!(source = %source, "Skipping platform descriptor: {}", message);
        self.diagnostics.push(RegistryDiagnostic {
            source: source.to_string(),
            message,
        });
    }

    /// Finish. Fails only when no descriptor was usable.
    pub fn build(self) -> Result<PlatformRegistry, RegistryError> {
        if self.platforms.is_empty() {
            return Err(RegistryError::Empty);
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("platforms.load", self.started.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = self.started;

        Ok(PlatformRegistry {
            platforms: self.platforms,
            diagnostics: self.diagnostics,
        })
    }
}

impl Default for PlatformRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
