// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Framework detection.
//!
//! Cross-references declared dependencies (via a [`ManifestReader`]) with
//! in-code imports to produce confidence-scored [`FrameworkMatch`]es.

mod catalog;
mod detector;
mod manifest;

pub use catalog::{FrameworkCatalog, FrameworkSignature};
pub use detector::{
    declared_confidence, heuristic_confidence, pin_specificity, usage_only_confidence,
    DetectionOutcome, EvidenceSite, FrameworkDetector, FrameworkMatch, MatchBasis,
    DECLARATION_ONLY_CAP, DECLARED_THRESHOLD, HEURISTIC_CEILING, USAGE_ONLY_CAP,
};
pub use manifest::{
    normalize_package_name, parse_requirement, DependencyManifest, ManifestReader,
    PythonManifestReader,
};
#[cfg(test)]
pub use manifest::MockManifestReader;
