// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Framework detection by cross-referencing declarations with imports.
//!
//! A framework is fully detected only when the manifest declares one of its
//! packages *and* some file imports one of its modules. Either half alone
//! yields a capped, low-confidence match. When the manifest cannot be read
//! the detector falls back to import frequency with an explicit lower
//! ceiling.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ast::{find_imports, SourceFile};
use crate::error::DetectionError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::catalog::{FrameworkCatalog, FrameworkSignature};
use super::manifest::DependencyManifest;

/// Confidence a declared-and-used framework starts from. Only such matches
/// can reach or exceed it.
pub const DECLARED_THRESHOLD: f64 = 0.7;

/// Ceiling for matches with imports but no declaration.
pub const USAGE_ONLY_CAP: f64 = 0.45;

/// Confidence of a declaration with no import anywhere.
pub const DECLARATION_ONLY_CAP: f64 = 0.2;

/// Ceiling for every match when the manifest is unreadable.
pub const HEURISTIC_CEILING: f64 = 0.4;

/// Evidence sites beyond this count add no confidence.
const EVIDENCE_SATURATION: usize = 4;

/// What a match's confidence is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    /// Declared in the manifest and imported in code.
    DeclaredAndUsed,
    /// Imported but not declared.
    UsageOnly,
    /// Declared but never imported.
    DeclarationOnly,
    /// Manifest unreadable; imports only.
    Heuristic,
}

/// Where a framework was seen in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSite {
    pub file: PathBuf,
    /// Line number (1-indexed).
    pub line: u32,
    /// The import statement text.
    pub snippet: String,
}

/// A detected framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkMatch {
    /// Catalog name.
    pub framework: String,
    /// Declared version spec, or `*`.
    pub version: String,
    pub evidence: Vec<EvidenceSite>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub basis: MatchBasis,
}

impl FrameworkMatch {
    /// Whether the match reached declared confidence.
    pub fn is_full_match(&self) -> bool {
        self.basis == MatchBasis::DeclaredAndUsed
    }

    /// Evidence sites located in `file`.
    pub fn evidence_in<'a>(
        &'a self,
        file: &'a std::path::Path,
    ) -> impl Iterator<Item = &'a EvidenceSite> + 'a {
        self.evidence.iter().filter(move |site| site.file == file)
    }
}

/// Result of a detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Matches ordered by confidence, then name.
    pub matches: Vec<FrameworkMatch>,
    /// Set when the manifest could not be read and heuristics were used.
    pub manifest_error: Option<DetectionError>,
}

/// Score a declared-and-used match.
///
/// Starts at [`DECLARED_THRESHOLD`] and grows with evidence count and how
/// tightly the version is pinned.
pub fn declared_confidence(evidence_count: usize, version_spec: &str) -> f64 {
    let evidence = evidence_count.min(EVIDENCE_SATURATION) as f64 * 0.05;
    (DECLARED_THRESHOLD + evidence + pin_specificity(version_spec)).min(1.0)
}

/// Score a usage-only match.
pub fn usage_only_confidence(evidence_count: usize) -> f64 {
    let evidence = evidence_count.min(EVIDENCE_SATURATION) as f64;
    (0.15 + 0.05 * evidence).min(USAGE_ONLY_CAP)
}

/// Score a match found by imports alone when the manifest is unreadable.
pub fn heuristic_confidence(evidence_count: usize) -> f64 {
    let evidence = evidence_count.min(EVIDENCE_SATURATION) as f64;
    (0.1 + 0.1 * evidence).min(HEURISTIC_CEILING)
}

/// Extra confidence for a pinned version: exact pins add the most.
pub fn pin_specificity(version_spec: &str) -> f64 {
    let spec = version_spec.trim();
    if spec.starts_with("==") || spec.starts_with("===") {
        0.1
    } else if spec.is_empty() || spec == "*" {
        0.0
    } else if spec.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        // Poetry-style bare version is an exact pin.
        0.1
    } else {
        0.05
    }
}

/// Detects frameworks across a project.
pub struct FrameworkDetector {
    catalog: FrameworkCatalog,
}

impl FrameworkDetector {
    pub fn new(catalog: FrameworkCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &FrameworkCatalog {
        &self.catalog
    }

    /// Detect frameworks from a manifest read result and parsed files.
    pub fn detect(
        &self,
        manifest: Result<DependencyManifest, DetectionError>,
        files: &[SourceFile],
    ) -> DetectionOutcome {
        let start = Instant::now();

        let (manifest, manifest_error) = match manifest {
            Ok(manifest) => (Some(manifest), None),
            Err(e) => {
                warn!(error = %e, "Falling back to import heuristics");
                (None, Some(e))
            }
        };

        let mut matches: Vec<FrameworkMatch> = self
            .catalog
            .iter()
            .filter_map(|sig| self.match_framework(sig, manifest.as_ref(), files))
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.framework.cmp(&b.framework))
        });

        for m in &matches {
            info!(
                framework = %m.framework,
                version = %m.version,
                confidence = m.confidence,
                basis = ?m.basis,
                evidence = m.evidence.len(),
                "Detected framework"
            );
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("detect.run", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        DetectionOutcome {
            matches,
            manifest_error,
        }
    }

    fn match_framework(
        &self,
        sig: &FrameworkSignature,
        manifest: Option<&DependencyManifest>,
        files: &[SourceFile],
    ) -> Option<FrameworkMatch> {
        let evidence = collect_evidence(sig, files);

        let Some(manifest) = manifest else {
            if evidence.is_empty() {
                return None;
            }
            return Some(FrameworkMatch {
                framework: sig.name.clone(),
                version: "*".to_string(),
                confidence: heuristic_confidence(evidence.len()),
                evidence,
                basis: MatchBasis::Heuristic,
            });
        };

        let declared = manifest
            .packages
            .iter()
            .find(|(name, _)| sig.matches_package(name))
            .map(|(_, spec)| spec.clone());

        let (basis, confidence, version) = match (&declared, evidence.is_empty()) {
            (Some(spec), false) => (
                MatchBasis::DeclaredAndUsed,
                declared_confidence(evidence.len(), spec),
                spec.clone(),
            ),
            (Some(spec), true) => (
                MatchBasis::DeclarationOnly,
                DECLARATION_ONLY_CAP,
                spec.clone(),
            ),
            (None, false) => (
                MatchBasis::UsageOnly,
                usage_only_confidence(evidence.len()),
                "*".to_string(),
            ),
            (None, true) => return None,
        };

        debug!(framework = %sig.name, ?basis, confidence, "Scored framework");

        Some(FrameworkMatch {
            framework: sig.name.clone(),
            version,
            evidence,
            confidence,
            basis,
        })
    }
}

impl Default for FrameworkDetector {
    fn default() -> Self {
        Self::new(FrameworkCatalog::builtin())
    }
}

/// One evidence site per importing statement, in file then line order.
fn collect_evidence(sig: &FrameworkSignature, files: &[SourceFile]) -> Vec<EvidenceSite> {
    let mut evidence = Vec::new();
    for file in files {
        let mut seen_lines = HashSet::new();
        for import in find_imports(file.tree()) {
            if sig.matches_module(&import.module) && seen_lines.insert(import.line) {
                evidence.push(EvidenceSite {
                    file: file.path().to_path_buf(),
                    line: import.line,
                    snippet: import.text.lines().next().unwrap_or("").trim().to_string(),
                });
            }
        }
    }
    evidence
}
