// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Framework signatures.
//!
//! The built-in catalog is embedded at compile time via `include_str!`.
//! The detector only ever reads signatures, so adding a framework means
//! adding data, not code.

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

const BUILTIN_CATALOG: &str = include_str!("frameworks.yaml");

/// How to recognise one agent framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSignature {
    /// Registry name (e.g. `openai-agents`).
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Distribution names in dependency manifests.
    pub packages: Vec<String>,
    /// Import roots that prove usage.
    pub modules: Vec<String>,
    /// Callee names of entry-point calls, highest priority first.
    #[serde(default)]
    pub anchors: Vec<String>,
}

impl FrameworkSignature {
    /// Whether an import of `module` counts as usage of this framework.
    pub fn matches_module(&self, module: &str) -> bool {
        self.modules.iter().any(|root| {
            module == root
                || module
                    .strip_prefix(root.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Whether a normalised manifest package name belongs to this framework.
    pub fn matches_package(&self, package: &str) -> bool {
        self.packages
            .iter()
            .any(|p| super::manifest::normalize_package_name(p) == package)
    }
}

#[derive(Deserialize)]
struct CatalogDocument {
    frameworks: Vec<FrameworkSignature>,
}

/// The set of frameworks the detector knows about.
#[derive(Debug, Clone, Default)]
pub struct FrameworkCatalog {
    signatures: Vec<FrameworkSignature>,
}

impl FrameworkCatalog {
    /// The embedded catalog.
    pub fn builtin() -> Self {
        match Self::from_yaml(BUILTIN_CATALOG) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(error = %e, "Embedded framework catalog is invalid");
                Self::default()
            }
        }
    }

    /// Parse a catalog document.
    pub fn from_yaml(text: &str) -> Result<Self, DetectionError> {
        let doc: CatalogDocument =
            serde_yaml::from_str(text).map_err(|e| DetectionError::InvalidEntry {
                file: "framework catalog".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            signatures: doc.frameworks,
        })
    }

    /// Build from explicit signatures.
    pub fn from_signatures(signatures: Vec<FrameworkSignature>) -> Self {
        Self { signatures }
    }

    pub fn get(&self, name: &str) -> Option<&FrameworkSignature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameworkSignature> {
        self.signatures.iter()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
