// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Dependency manifests.
//!
//! The detector consumes a [`DependencyManifest`] through the
//! [`ManifestReader`] trait and never parses manifest syntax itself.
//! [`PythonManifestReader`] is the shipped reader for `requirements.txt`,
//! `pyproject.toml` and `setup.py`.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DetectionError;

/// Declared dependencies: normalised package name to version spec.
///
/// The version spec keeps its operator (`==1.2.0`, `>=0.3,<0.4`); an
/// unpinned dependency has spec `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
    pub packages: BTreeMap<String, String>,
    /// Files the packages were read from, in read order.
    pub sources: Vec<String>,
}

impl DependencyManifest {
    /// Build from `(name, spec)` pairs. Names are normalised.
    pub fn from_pairs<I, N, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: Into<String>,
    {
        let mut manifest = Self::default();
        for (name, spec) in pairs {
            manifest.insert(name.as_ref(), spec.into());
        }
        manifest
    }

    /// Add a package unless an earlier source already declared it.
    pub fn insert(&mut self, name: &str, spec: String) {
        self.packages
            .entry(normalize_package_name(name))
            .or_insert(spec);
    }

    /// Version spec of a declared package.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.packages
            .get(&normalize_package_name(name))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Lowercase and collapse `_` / `.` to `-`, so `Pydantic_AI` and
/// `pydantic-ai` compare equal.
pub fn normalize_package_name(name: &str) -> String {
    name.trim().to_lowercase().replace(['_', '.'], "-")
}

/// Supplies the declared dependencies of a project.
#[cfg_attr(test, mockall::automock)]
pub trait ManifestReader: Send + Sync {
    /// Read all manifests under `root`.
    ///
    /// Returns [`DetectionError::ManifestUnreadable`] when no manifest could
    /// be read at all.
    fn read(&self, root: &Path) -> Result<DependencyManifest, DetectionError>;
}

static REQUIREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*)$").unwrap()
});

static INSTALL_REQUIRES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)install_requires\s*=\s*\[(.*?)\]").unwrap());

static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["']([^"']+)["']"#).unwrap());

/// Parse one PEP 508 requirement string into `(name, spec)`.
///
/// Extras, environment markers and trailing comments are dropped. Returns
/// `None` for pip options, URLs and blank lines.
pub fn parse_requirement(line: &str) -> Option<(String, String)> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() || line.starts_with('-') || line.contains("://") {
        return None;
    }
    let line = line.split(';').next().unwrap_or("").trim();

    let caps = REQUIREMENT.captures(line)?;
    let name = caps.get(1)?.as_str().to_string();
    let spec: String = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or("")
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split_whitespace()
        .collect();

    let spec = if spec.is_empty() { "*".to_string() } else { spec };
    Some((name, spec))
}

/// Reads `requirements.txt`, `pyproject.toml` and `setup.py` from a project
/// root. Earlier files win when a package is declared twice.
#[derive(Debug, Clone, Default)]
pub struct PythonManifestReader;

impl PythonManifestReader {
    pub fn new() -> Self {
        Self
    }

    fn read_requirements(text: &str, manifest: &mut DependencyManifest) {
        for line in text.lines() {
            if let Some((name, spec)) = parse_requirement(line) {
                manifest.insert(&name, spec);
            }
        }
    }

    fn read_pyproject(text: &str, manifest: &mut DependencyManifest) -> Result<(), String> {
        let doc: toml::Value = toml::from_str(text).map_err(|e| e.to_string())?;

        if let Some(deps) = doc
            .get("project")
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array())
        {
            for dep in deps.iter().filter_map(|d| d.as_str()) {
                if let Some((name, spec)) = parse_requirement(dep) {
                    manifest.insert(&name, spec);
                }
            }
        }

        if let Some(deps) = doc
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_table())
        {
            for (name, value) in deps {
                if name == "python" {
                    continue;
                }
                let spec = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Table(t) => t
                        .get("version")
                        .and_then(|v| v.as_str())
                        .unwrap_or("*")
                        .to_string(),
                    _ => "*".to_string(),
                };
                manifest.insert(name, if spec.is_empty() { "*".to_string() } else { spec });
            }
        }

        Ok(())
    }

    fn read_setup_py(text: &str, manifest: &mut DependencyManifest) {
        let Some(block) = INSTALL_REQUIRES.captures(text).and_then(|c| c.get(1)) else {
            return;
        };
        for literal in STRING_LITERAL.captures_iter(block.as_str()) {
            if let Some((name, spec)) = literal.get(1).and_then(|m| parse_requirement(m.as_str())) {
                manifest.insert(&name, spec);
            }
        }
    }
}

impl ManifestReader for PythonManifestReader {
    fn read(&self, root: &Path) -> Result<DependencyManifest, DetectionError> {
        let mut manifest = DependencyManifest::default();
        let mut problems = Vec::new();

        for file in ["requirements.txt", "pyproject.toml", "setup.py"] {
            let path = root.join(file);
            if !path.is_file() {
                continue;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read manifest");
                    problems.push(format!("{}: {}", file, e));
                    continue;
                }
            };

            match file {
                "requirements.txt" => Self::read_requirements(&text, &mut manifest),
                "pyproject.toml" => {
                    if let Err(e) = Self::read_pyproject(&text, &mut manifest) {
                        warn!(path = %path.display(), error = %e, "Malformed pyproject.toml");
                        problems.push(format!("{}: {}", file, e));
                        continue;
                    }
                }
                _ => Self::read_setup_py(&text, &mut manifest),
            }
            manifest.sources.push(file.to_string());
        }

        if manifest.sources.is_empty() {
            let reason = if problems.is_empty() {
                format!("no dependency manifest in {}", root.display())
            } else {
                problems.join("; ")
            };
            return Err(DetectionError::ManifestUnreadable(reason));
        }

        debug!(
            packages = manifest.packages.len(),
            sources = ?manifest.sources,
            "Read dependency manifest"
        );
        Ok(manifest)
    }
}
