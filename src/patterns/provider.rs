// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pattern providers.
//!
//! The engine asks a [`PatternProvider`] what to insert for a
//! `(framework, version, platform)` triple. Providers are collaborators:
//! the engine keeps working with the built-in descriptor fallbacks when
//! none is configured or a lookup fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::PatternError;

use super::pattern::InstrumentationPattern;

/// Source of instrumentation knowledge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatternProvider: Send + Sync {
    /// Look up the pattern for a framework on a platform.
    ///
    /// Returns [`PatternError::NotFound`] when the provider has no knowledge
    /// of the pair, and another variant when the lookup itself broke.
    async fn lookup(
        &self,
        framework: &str,
        version: &str,
        platform: &str,
    ) -> Result<InstrumentationPattern, PatternError>;
}

/// In-memory pattern table keyed by `(framework, platform)`.
#[derive(Debug, Clone, Default)]
pub struct StaticPatternProvider {
    patterns: HashMap<(String, String), InstrumentationPattern>,
}

impl StaticPatternProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern. A pattern without an id gets `<platform>/<framework>`.
    pub fn with_pattern(
        mut self,
        framework: impl Into<String>,
        platform: impl Into<String>,
        mut pattern: InstrumentationPattern,
    ) -> Self {
        let framework = framework.into();
        let platform = platform.into();
        if pattern.id.is_empty() {
            pattern.id = InstrumentationPattern::default_id(&platform, &framework);
        }
        self.patterns.insert((framework, platform), pattern);
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[async_trait]
impl PatternProvider for StaticPatternProvider {
    async fn lookup(
        &self,
        framework: &str,
        _version: &str,
        platform: &str,
    ) -> Result<InstrumentationPattern, PatternError> {
        self.patterns
            .get(&(framework.to_string(), platform.to_string()))
            .cloned()
            .ok_or_else(|| PatternError::not_found(framework, platform))
    }
}

const PATTERN_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Reads `<framework>.<platform>.{yaml,yml,json}` from a list of
/// directories. The first directory holding a file for the pair wins.
#[derive(Debug, Clone, Default)]
pub struct DirPatternProvider {
    dirs: Vec<PathBuf>,
}

impl DirPatternProvider {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn candidates(&self, framework: &str, platform: &str) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .flat_map(|dir| {
                PATTERN_EXTENSIONS
                    .iter()
                    .map(move |ext| dir.join(format!("{}.{}.{}", framework, platform, ext)))
            })
            .collect()
    }

    fn parse(path: &Path, text: &str) -> Result<InstrumentationPattern, PatternError> {
        let invalid = |message: String| PatternError::Invalid {
            id: path.display().to_string(),
            message,
        };
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(text).map_err(|e| invalid(e.to_string()))
        } else {
            serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))
        }
    }
}

#[async_trait]
impl PatternProvider for DirPatternProvider {
    async fn lookup(
        &self,
        framework: &str,
        _version: &str,
        platform: &str,
    ) -> Result<InstrumentationPattern, PatternError> {
        for path in self.candidates(framework, platform) {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(PatternError::ProviderFailed(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )))
                }
            };

            let mut pattern = Self::parse(&path, &text)?;
            if pattern.id.is_empty() {
                pattern.id = InstrumentationPattern::default_id(platform, framework);
            }
            debug!(path = %path.display(), pattern_id = %pattern.id, "Loaded pattern file");
            return Ok(pattern);
        }

        Err(PatternError::not_found(framework, platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticPatternProvider::new().with_pattern(
            "langchain",
            "langfuse",
            InstrumentationPattern::default().with_import("import langfuse"),
        );

        let pattern = provider.lookup("langchain", "*", "langfuse").await.unwrap();
        assert_eq!(pattern.id, "langfuse/langchain");

        let err = provider.lookup("crewai", "*", "langfuse").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_dir_provider_reads_yaml_and_json() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(
            first.path().join("crewai.phoenix.yaml"),
            "imports:\n  - import phoenix as px\ninit_code: px.launch_app()\n",
        )
        .unwrap();
        std::fs::write(
            second.path().join("crewai.phoenix.json"),
            r#"{"id": "shadowed", "imports": ["import os"]}"#,
        )
        .unwrap();
        std::fs::write(
            second.path().join("langgraph.phoenix.json"),
            r#"{"id": "graph", "imports": ["import os"]}"#,
        )
        .unwrap();

        let provider =
            DirPatternProvider::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);

        let crew = provider.lookup("crewai", "*", "phoenix").await.unwrap();
        assert_eq!(crew.id, "phoenix/crewai");
        assert_eq!(crew.init_code.as_deref(), Some("px.launch_app()"));

        let graph = provider.lookup("langgraph", "*", "phoenix").await.unwrap();
        assert_eq!(graph.id, "graph");

        let missing = provider.lookup("autogen", "*", "phoenix").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_dir_provider_malformed_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("crewai.phoenix.yaml"), "imports: [unclosed").unwrap();

        let provider = DirPatternProvider::new(vec![dir.path().to_path_buf()]);
        let err = provider.lookup("crewai", "*", "phoenix").await.unwrap_err();
        assert!(matches!(err, PatternError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let mut provider = MockPatternProvider::new();
        provider
            .expect_lookup()
            .withf(|framework, _, platform| framework == "crewai" && platform == "datadog")
            .times(1)
            .returning(|_, _, _| Err(PatternError::ProviderFailed("offline".to_string())));

        let err = provider.lookup("crewai", "0.80", "datadog").await.unwrap_err();
        assert!(!err.is_not_found());
    }
}
