// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The platform descriptor contract and its data-driven implementation.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::InstrumentConfig;
use crate::error::{PatternError, RegistryError};
use crate::patterns::{InstrumentationPattern, PatternTemplate};

/// An environment variable a platform reads at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Summary of a platform for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub env_vars: Vec<EnvVarSpec>,
}

/// Capabilities every observability backend must expose.
///
/// Descriptors are loaded once into the registry and shared read-only by
/// all file pipelines.
pub trait PlatformDescriptor: Send + Sync + Debug {
    /// Registry-unique identifier.
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Python packages the instrumented code needs.
    fn get_dependencies(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<EnvVarSpec>;

    /// Built-in pattern fragments for a framework.
    ///
    /// Used as the fallback when no pattern provider answers.
    fn generate_instrumentation(
        &self,
        framework: &str,
        version: &str,
        entry_points: &[PathBuf],
        config: &InstrumentConfig,
    ) -> Result<InstrumentationPattern, PatternError>;

    fn info(&self) -> PlatformInfo {
        PlatformInfo {
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            description: self.description().to_string(),
            dependencies: self.get_dependencies(),
            env_vars: self.get_env_vars(),
        }
    }
}

/// Document keys backing each capability.
const CAPABILITY_KEYS: [(&str, &str); 5] = [
    ("name", "name"),
    ("display_name", "display_name"),
    ("dependencies", "get_dependencies"),
    ("env_vars", "get_env_vars"),
    ("instrumentation", "generate_instrumentation"),
];

#[derive(Debug, Clone, Default, Deserialize)]
struct InstrumentationTable {
    #[serde(default)]
    default: Option<PatternTemplate>,
    #[serde(default)]
    frameworks: BTreeMap<String, PatternTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
struct DescriptorDocument {
    name: String,
    display_name: String,
    #[serde(default)]
    description: String,
    dependencies: Vec<String>,
    env_vars: Vec<EnvVarSpec>,
    instrumentation: InstrumentationTable,
}

/// A descriptor read from a YAML or JSON document.
#[derive(Debug, Clone)]
pub struct YamlPlatform {
    doc: DescriptorDocument,
    source: String,
}

impl YamlPlatform {
    /// Parse a YAML descriptor. `source_name` is used in diagnostics.
    pub fn from_yaml(source_name: &str, text: &str) -> Result<Self, RegistryError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| RegistryError::InvalidDescriptor {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        Self::from_value(source_name, value)
    }

    /// Parse a JSON descriptor.
    pub fn from_json(source_name: &str, text: &str) -> Result<Self, RegistryError> {
        let value: serde_yaml::Value =
            serde_json::from_str(text).map_err(|e| RegistryError::InvalidDescriptor {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        Self::from_value(source_name, value)
    }

    /// Check the capability set, then deserialize.
    pub fn from_value(source_name: &str, value: serde_yaml::Value) -> Result<Self, RegistryError> {
        let Some(mapping) = value.as_mapping() else {
            return Err(RegistryError::InvalidDescriptor {
                source_name: source_name.to_string(),
                message: "descriptor is not a mapping".to_string(),
            });
        };

        let missing: Vec<String> = CAPABILITY_KEYS
            .iter()
            .filter(|(key, _)| {
                mapping
                    .get(*key)
                    .map_or(true, serde_yaml::Value::is_null)
            })
            .map(|(_, capability)| capability.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::MissingCapabilities {
                source_name: source_name.to_string(),
                missing,
            });
        }

        let doc: DescriptorDocument =
            serde_yaml::from_value(value).map_err(|e| RegistryError::InvalidDescriptor {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;

        if doc.name.trim().is_empty() {
            return Err(RegistryError::InvalidDescriptor {
                source_name: source_name.to_string(),
                message: "name is empty".to_string(),
            });
        }

        Ok(Self {
            doc,
            source: source_name.to_string(),
        })
    }

    /// Where the descriptor was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Frameworks with a dedicated pattern.
    pub fn frameworks(&self) -> impl Iterator<Item = &str> {
        self.doc.instrumentation.frameworks.keys().map(String::as_str)
    }
}

impl PlatformDescriptor for YamlPlatform {
    fn name(&self) -> &str {
        &self.doc.name
    }

    fn display_name(&self) -> &str {
        &self.doc.display_name
    }

    fn description(&self) -> &str {
        &self.doc.description
    }

    fn get_dependencies(&self) -> Vec<String> {
        self.doc.dependencies.clone()
    }

    fn get_env_vars(&self) -> Vec<EnvVarSpec> {
        self.doc.env_vars.clone()
    }

    fn generate_instrumentation(
        &self,
        framework: &str,
        version: &str,
        entry_points: &[PathBuf],
        config: &InstrumentConfig,
    ) -> Result<InstrumentationPattern, PatternError> {
        let table = &self.doc.instrumentation;
        let (key, template) = match table.frameworks.get(framework) {
            Some(template) => (framework, template),
            None => match &table.default {
                Some(template) => ("default", template),
                None => return Err(PatternError::not_found(framework, self.name())),
            },
        };

        let mut pattern = template
            .to_pattern(InstrumentationPattern::default_id(self.name(), key))
            .render(&[
                ("platform", self.name()),
                ("framework", framework),
                ("version", version),
            ]);

        if pattern
            .call_site
            .as_ref()
            .is_some_and(|rule| !rule.applies_to(&config.targets))
        {
            pattern.call_site = None;
        }

        debug!(
            platform = %self.name(),
            framework = %framework,
            pattern_id = %pattern.id,
            entry_points = entry_points.len(),
            "Generated fallback pattern"
        );
        Ok(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstrumentationLevel, InstrumentationTarget};
    use crate::patterns::MergeMode;

    const DESCRIPTOR: &str = r#"
name: acme
display_name: Acme Traces
description: Test platform
dependencies: ["acme-sdk>=1.0"]
env_vars:
  - name: ACME_KEY
    description: API key
    required: true
  - name: ACME_HOST
instrumentation:
  default:
    imports: ["import acme"]
    init_code: acme.init(service="{{framework}}")
  frameworks:
    langchain:
      imports: ["from acme.langchain import Handler"]
      init_code: acme_handler = Handler()
      call_site:
        keyword: callbacks
        value: acme_handler
        targets: [chains]
"#;

    #[test]
    fn test_capabilities_and_info() {
        let platform = YamlPlatform::from_yaml("acme.yaml", DESCRIPTOR).unwrap();
        assert_eq!(platform.name(), "acme");
        assert_eq!(platform.source(), "acme.yaml");
        assert_eq!(platform.get_dependencies(), vec!["acme-sdk>=1.0"]);

        let info = platform.info();
        assert_eq!(info.display_name, "Acme Traces");
        assert_eq!(info.env_vars.len(), 2);
        assert!(info.env_vars[0].required);
        assert!(!info.env_vars[1].required);
        assert_eq!(platform.frameworks().collect::<Vec<_>>(), vec!["langchain"]);
    }

    #[test]
    fn test_generate_framework_specific() {
        let platform = YamlPlatform::from_yaml("acme.yaml", DESCRIPTOR).unwrap();
        let config = InstrumentConfig::default();

        let pattern = platform
            .generate_instrumentation("langchain", "*", &[], &config)
            .unwrap();
        assert_eq!(pattern.id, "acme/langchain");
        let rule = pattern.call_site.unwrap();
        assert_eq!(rule.keyword, "callbacks");
        assert_eq!(rule.mode, MergeMode::List);
    }

    #[test]
    fn test_generate_default_renders_template() {
        let platform = YamlPlatform::from_yaml("acme.yaml", DESCRIPTOR).unwrap();
        let pattern = platform
            .generate_instrumentation("crewai", "==0.80.0", &[], &InstrumentConfig::default())
            .unwrap();
        assert_eq!(pattern.id, "acme/default");
        assert_eq!(pattern.init_code.as_deref(), Some("acme.init(service=\"crewai\")"));
    }

    #[test]
    fn test_call_site_dropped_outside_targets() {
        let platform = YamlPlatform::from_yaml("acme.yaml", DESCRIPTOR).unwrap();
        let config = InstrumentConfig::preset(InstrumentationLevel::Minimal);
        assert!(!config.should_instrument(InstrumentationTarget::Chains));

        let pattern = platform
            .generate_instrumentation("langchain", "*", &[], &config)
            .unwrap();
        assert!(pattern.call_site.is_none());
        assert!(pattern.init_code.is_some());
    }

    #[test]
    fn test_missing_capabilities() {
        let err = YamlPlatform::from_yaml(
            "partial.yaml",
            "name: partial\ndisplay_name: Partial\ndependencies: []\n",
        )
        .unwrap_err();
        match err {
            RegistryError::MissingCapabilities { source_name, missing } => {
                assert_eq!(source_name, "partial.yaml");
                assert_eq!(missing, vec!["get_env_vars", "generate_instrumentation"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_a_mapping() {
        let err = YamlPlatform::from_yaml("list.yaml", "- a\n- b\n").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_json_descriptor() {
        let platform = YamlPlatform::from_json(
            "tiny.json",
            r#"{"name": "tiny", "display_name": "Tiny", "dependencies": [],
                "env_vars": [], "instrumentation": {"frameworks": {}}}"#,
        )
        .unwrap();
        let err = platform
            .generate_instrumentation("crewai", "*", &[], &InstrumentConfig::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
