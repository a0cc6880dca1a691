// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instrumentation patterns.
//!
//! A pattern is untrusted data: its structure is checked here, but the code
//! it carries is only judged by re-parsing the file after insertion.

use serde::{Deserialize, Serialize};

use crate::config::InstrumentationTarget;
use crate::error::PatternError;

/// How a call-site value is combined with an existing keyword argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// The keyword holds a list; the value is added as an element.
    #[default]
    List,
    /// The keyword holds a single value; an existing one is left alone.
    Value,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Value => "value",
        }
    }
}

/// "Ensure keyword argument `keyword` of the anchor call includes `value`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteRule {
    /// Callee names to anchor on. Empty means the framework's own anchors.
    #[serde(default)]
    pub callees: Vec<String>,
    pub keyword: String,
    /// Python expression to add.
    pub value: String,
    #[serde(default)]
    pub mode: MergeMode,
    /// Instrumentation targets this rule serves. Empty means always.
    #[serde(default)]
    pub targets: Vec<InstrumentationTarget>,
}

impl CallSiteRule {
    pub fn new(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            callees: Vec::new(),
            keyword: keyword.into(),
            value: value.into(),
            mode: MergeMode::List,
            targets: Vec::new(),
        }
    }

    pub fn with_callees<I, S>(mut self, callees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.callees = callees.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_targets(mut self, targets: Vec<InstrumentationTarget>) -> Self {
        self.targets = targets;
        self
    }

    /// Whether the rule is in scope for a run instrumenting `targets`.
    pub fn applies_to(&self, targets: &[InstrumentationTarget]) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| targets.contains(t))
    }
}

/// Code fragments for one framework on one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationPattern {
    /// Stable identifier, reported in diagnostics (e.g. `langfuse/langchain`).
    #[serde(default)]
    pub id: String,
    /// Import statements, one per entry.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Module-level setup code placed after the imports.
    #[serde(default)]
    pub init_code: Option<String>,
    #[serde(default)]
    pub call_site: Option<CallSiteRule>,
}

impl InstrumentationPattern {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Conventional id for a framework/platform pair.
    pub fn default_id(platform: &str, framework: &str) -> String {
        format!("{}/{}", platform, framework)
    }

    pub fn with_import(mut self, line: impl Into<String>) -> Self {
        self.imports.push(line.into());
        self
    }

    pub fn with_init_code(mut self, code: impl Into<String>) -> Self {
        self.init_code = Some(code.into());
        self
    }

    pub fn with_call_site(mut self, rule: CallSiteRule) -> Self {
        self.call_site = Some(rule);
        self
    }

    /// Whether the pattern would produce no edits at all.
    pub fn is_empty(&self) -> bool {
        self.imports.iter().all(|i| i.trim().is_empty())
            && self
                .init_code
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
            && self.call_site.is_none()
    }

    /// Substitute `{{name}}` placeholders in every code fragment.
    pub fn render(&self, vars: &[(&str, &str)]) -> Self {
        let fill = |text: &str| {
            vars.iter().fold(text.to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{{{}}}}}", name), value)
            })
        };

        Self {
            id: self.id.clone(),
            imports: self.imports.iter().map(|i| fill(i)).collect(),
            init_code: self.init_code.as_deref().map(fill),
            call_site: self.call_site.as_ref().map(|rule| CallSiteRule {
                value: fill(&rule.value),
                ..rule.clone()
            }),
        }
    }

    /// Structural checks. Code content is not parsed here.
    pub fn validate(&self) -> Result<(), PatternError> {
        let invalid = |message: &str| PatternError::Invalid {
            id: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("pattern id is empty"));
        }
        if self.imports.iter().any(|i| i.contains('\n')) {
            return Err(invalid("an import entry spans several lines"));
        }
        if let Some(rule) = &self.call_site {
            if !is_identifier(&rule.keyword) {
                return Err(invalid("call-site keyword is not an identifier"));
            }
            if rule.value.trim().is_empty() {
                return Err(invalid("call-site value is empty"));
            }
        }
        Ok(())
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Pattern fragments as written in a descriptor, before an id is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTemplate {
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub init_code: Option<String>,
    #[serde(default)]
    pub call_site: Option<CallSiteRule>,
}

impl PatternTemplate {
    pub fn to_pattern(&self, id: impl Into<String>) -> InstrumentationPattern {
        InstrumentationPattern {
            id: id.into(),
            imports: self.imports.clone(),
            init_code: self.init_code.clone(),
            call_site: self.call_site.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let pattern = InstrumentationPattern::new("datadog/crewai")
            .with_import("from ddtrace import tracer")
            .with_init_code("tracer.set_tags({\"service\": \"{{framework}}-agent\"})")
            .with_call_site(CallSiteRule::new("tags", "\"{{platform}}\""));

        let rendered = pattern.render(&[("framework", "crewai"), ("platform", "datadog")]);
        assert_eq!(
            rendered.init_code.as_deref(),
            Some("tracer.set_tags({\"service\": \"crewai-agent\"})")
        );
        assert_eq!(rendered.call_site.unwrap().value, "\"datadog\"");
        assert_eq!(rendered.imports, pattern.imports);
    }

    #[test]
    fn test_validate() {
        assert!(InstrumentationPattern::new("ok")
            .with_import("import os")
            .validate()
            .is_ok());

        let err = InstrumentationPattern::new("").validate().unwrap_err();
        assert!(matches!(err, PatternError::Invalid { .. }));

        let err = InstrumentationPattern::new("bad")
            .with_call_site(CallSiteRule::new("not a keyword", "x"))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("identifier"));

        let err = InstrumentationPattern::new("bad")
            .with_import("import os\nimport sys")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("several lines"));
    }

    #[test]
    fn test_is_empty() {
        assert!(InstrumentationPattern::new("x").is_empty());
        assert!(!InstrumentationPattern::new("x").with_init_code("setup()").is_empty());
    }

    #[test]
    fn test_rule_applies_to_targets() {
        let rule = CallSiteRule::new("callbacks", "handler");
        assert!(rule.applies_to(&[]));

        let rule = rule.with_targets(vec![InstrumentationTarget::Tools]);
        assert!(rule.applies_to(&[InstrumentationTarget::Tools, InstrumentationTarget::Rag]));
        assert!(!rule.applies_to(&[InstrumentationTarget::LlmCalls]));
    }

    #[test]
    fn test_deserialize_rule_defaults() {
        let rule: CallSiteRule =
            serde_yaml::from_str("keyword: callbacks\nvalue: handler\n").unwrap();
        assert_eq!(rule.mode, MergeMode::List);
        assert!(rule.callees.is_empty());
        assert!(rule.targets.is_empty());

        let rule: CallSiteRule = serde_yaml::from_str(
            "keyword: tracer\nvalue: t\nmode: value\ntargets: [llm_calls]\n",
        )
        .unwrap();
        assert_eq!(rule.mode, MergeMode::Value);
        assert_eq!(rule.targets, vec![InstrumentationTarget::LlmCalls]);
    }
}
