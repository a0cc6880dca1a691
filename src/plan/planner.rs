// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Injection planner.
//!
//! Turns resolved patterns into an [`EditPlan`] for one file. A file is only
//! planned for a framework when it contains one of that framework's anchor
//! calls through a binding imported from the framework. Every edit is
//! checked against the current text first, so planning an already
//! instrumented file yields an empty plan.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use tracing::debug;

use crate::ast::{
    find_calls, find_imports, import_anchor, line_of, parse, rank_calls, CallInfo, ImportInfo,
    SourceFile, SyntaxTree,
};
use crate::config::{InstrumentConfig, InstrumentationTarget};
use crate::detect::{FrameworkMatch, FrameworkSignature};
use crate::error::PlanConflictError;
use crate::patterns::{CallSiteRule, InstrumentationPattern, MergeMode};
use crate::platforms::PlatformDescriptor;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::types::{EditKind, EditPlan, InjectionPoint};

/// One framework/platform/pattern triple to plan for.
#[derive(Clone, Copy)]
pub struct PlanInput<'a> {
    pub framework: &'a FrameworkMatch,
    pub signature: &'a FrameworkSignature,
    pub platform: &'a dyn PlatformDescriptor,
    pub pattern: &'a InstrumentationPattern,
}

/// `(is_from, module, name, alias)` of one imported name.
type ImportKey = (bool, String, String, Option<String>);

/// Builds edit plans for the targets of one run.
#[derive(Debug, Clone)]
pub struct InjectionPlanner {
    targets: Vec<InstrumentationTarget>,
}

impl InjectionPlanner {
    pub fn new(config: &InstrumentConfig) -> Self {
        Self {
            targets: config.targets.clone(),
        }
    }

    /// Plan all inputs against `file`.
    ///
    /// Import and init edits from several inputs are coalesced into one
    /// point each. Two different call-site edits on the same call reject the
    /// whole file.
    pub fn plan(&self, file: &SourceFile, inputs: &[PlanInput<'_>]) -> EditPlan {
        let start = Instant::now();
        let tree = file.tree();
        let imports = find_imports(tree);

        let mut known_imports: HashSet<ImportKey> = imports
            .iter()
            .filter(|i| i.top_level)
            .flat_map(import_keys)
            .collect();
        let mut known_import_texts: HashSet<String> = imports
            .iter()
            .filter(|i| i.top_level)
            .map(|i| compact(&i.text))
            .collect();
        let source_block = normalize_block(tree.source());

        let mut import_lines: Vec<String> = Vec::new();
        let mut import_ids: Vec<String> = Vec::new();
        let mut init_blocks: Vec<(NormalizedBlock, String)> = Vec::new();
        let mut init_ids: Vec<String> = Vec::new();
        let mut call_points: Vec<InjectionPoint> = Vec::new();

        for input in inputs {
            let pattern = input.pattern.render(&[
                ("platform", input.platform.name()),
                ("framework", input.framework.framework.as_str()),
                ("version", input.framework.version.as_str()),
            ]);

            let callees = match &pattern.call_site {
                Some(rule) if !rule.callees.is_empty() => &rule.callees,
                _ => &input.signature.anchors,
            };
            let Some(anchor) = anchor_call(tree, &imports, input.signature, callees) else {
                debug!(
                    path = %file.path().display(),
                    framework = %input.framework.framework,
                    "No anchor call in file"
                );
                continue;
            };

            for line in pattern.imports.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
                let fresh = match parse_import_line(line) {
                    Some(keys) => {
                        let fresh = keys.iter().any(|k| !known_imports.contains(k));
                        known_imports.extend(keys);
                        fresh
                    }
                    None => !known_import_texts.contains(&compact(line)),
                };
                known_import_texts.insert(compact(line));
                if fresh {
                    import_lines.push(line.to_string());
                    push_unique(&mut import_ids, &pattern.id);
                }
            }

            if let Some(code) = pattern.init_code.as_deref() {
                let normalized = normalize_block(code);
                let present = normalized.is_empty()
                    || contains_block(&source_block, &normalized)
                    || init_blocks.iter().any(|(n, _)| n.as_str() == normalized.as_str());
                if present {
                    debug!(pattern_id = %pattern.id, "Init block already present");
                } else {
                    init_blocks.push((normalized, code.trim_end().to_string()));
                    push_unique(&mut init_ids, &pattern.id);
                }
            }

            let Some(rule) = pattern
                .call_site
                .as_ref()
                .filter(|rule| rule.applies_to(&self.targets))
            else {
                continue;
            };
            if argument_present(&anchor, rule) {
                debug!(pattern_id = %pattern.id, keyword = %rule.keyword, "Call site already carries value");
                continue;
            }

            let point = InjectionPoint {
                id: 0,
                anchor: anchor.node.clone(),
                kind: EditKind::AddOrMergeArgument {
                    keyword: rule.keyword.clone(),
                    mode: rule.mode,
                },
                payload: rule.value.trim().to_string(),
                pattern_id: pattern.id.clone(),
                line: anchor.line,
            };

            if let Some(existing) = call_points.iter().find(|p| p.anchor == point.anchor) {
                if existing.pattern_id == point.pattern_id
                    && existing.kind == point.kind
                    && existing.payload == point.payload
                {
                    continue;
                }
                let conflict = PlanConflictError {
                    anchor: point.anchor.to_string(),
                    line: point.line,
                    pattern_ids: vec![existing.pattern_id.clone(), point.pattern_id.clone()],
                };
                debug!(path = %file.path().display(), "{}", conflict);
                return EditPlan::conflicted(file.path(), conflict);
            }
            call_points.push(point);
        }

        let mut points = Vec::new();
        if !import_lines.is_empty() || !init_blocks.is_empty() {
            let anchor = import_anchor(tree);
            let line = tree.resolve(&anchor).map(line_of).unwrap_or(1);

            if !import_lines.is_empty() {
                points.push(InjectionPoint {
                    id: 0,
                    anchor: anchor.clone(),
                    kind: EditKind::InsertImport,
                    payload: import_lines.join("\n"),
                    pattern_id: import_ids.join(","),
                    line,
                });
            }
            if !init_blocks.is_empty() {
                let blocks: Vec<String> = init_blocks.into_iter().map(|(_, code)| code).collect();
                points.push(InjectionPoint {
                    id: 0,
                    anchor,
                    kind: EditKind::InsertAfter,
                    payload: blocks.join("\n\n"),
                    pattern_id: init_ids.join(","),
                    line,
                });
            }
        }
        call_points.sort_by_key(|p| p.line);
        points.extend(call_points);

        let plan = EditPlan::new(file.path(), points);
        debug!(path = %file.path().display(), edits = plan.len(), "Planned file");

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("plan.build", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        plan
    }
}

/// The highest-ranked call to one of `callees` reached through a binding
/// imported from the framework. Earlier callees take priority.
fn anchor_call(
    tree: &SyntaxTree,
    imports: &[ImportInfo],
    signature: &FrameworkSignature,
    callees: &[String],
) -> Option<CallInfo> {
    let bindings: HashSet<String> = imports
        .iter()
        .filter(|i| signature.matches_module(&i.module))
        .flat_map(ImportInfo::bindings)
        .collect();
    if bindings.is_empty() {
        return None;
    }
    let wildcard = bindings.contains("*");

    callees.iter().find_map(|callee| {
        let calls: Vec<CallInfo> = find_calls(tree, callee)
            .into_iter()
            .filter(|c| {
                bindings.contains(&c.root_binding) || (wildcard && !c.callee.contains('.'))
            })
            .collect();
        rank_calls(calls, &bindings).into_iter().next()
    })
}

fn argument_present(call: &CallInfo, rule: &CallSiteRule) -> bool {
    let Some(arg) = call
        .arguments
        .iter()
        .find(|a| a.keyword.as_deref() == Some(rule.keyword.as_str()))
    else {
        return false;
    };
    if rule.mode == MergeMode::Value {
        return true;
    }

    let value = compact(&rule.value);
    match &arg.list_elements {
        Some(elements) => elements.iter().any(|e| compact(e) == value),
        None => compact(&arg.value) == value,
    }
}

fn import_keys(info: &ImportInfo) -> Vec<ImportKey> {
    info.names
        .iter()
        .map(|n| (info.is_from, info.module.clone(), n.name.clone(), n.alias.clone()))
        .collect()
}

/// Keys of a single import line, or `None` when it is not a clean import.
fn parse_import_line(line: &str) -> Option<Vec<ImportKey>> {
    let tree = parse(line).ok()?;
    if tree.has_errors() {
        return None;
    }
    let keys: Vec<ImportKey> = find_imports(&tree).iter().flat_map(import_keys).collect();
    (!keys.is_empty()).then_some(keys)
}

/// Source text with blank and comment lines dropped and all whitespace
/// removed, remembering where each original line began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBlock {
    text: String,
    boundaries: BTreeSet<usize>,
}

impl NormalizedBlock {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub fn normalize_block(text: &str) -> NormalizedBlock {
    let mut block = NormalizedBlock {
        text: String::new(),
        boundaries: BTreeSet::from([0]),
    };
    for line in text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        block.text.push_str(&compact(line));
        block.boundaries.insert(block.text.len());
    }
    block
}

/// Whether `needle` appears in `haystack` starting and ending on line
/// boundaries. Line breaks inside either block are ignored, so a reflowed
/// statement still matches.
pub fn contains_block(haystack: &NormalizedBlock, needle: &NormalizedBlock) -> bool {
    if needle.is_empty() {
        return false;
    }
    let len = needle.text.len();
    haystack.boundaries.iter().any(|&start| {
        haystack.boundaries.contains(&(start + len))
            && haystack.text.get(start..start + len) == Some(needle.as_str())
    })
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentationLevel;
    use crate::detect::{FrameworkCatalog, MatchBasis};
    use crate::platforms::PlatformRegistry;
    use std::sync::Arc;

    const AGENT_FILE: &str = r#"from agents import Agent, Runner

agent = Agent(
    name="support",
    instructions="Help the user",
)
result = Runner.run_sync(agent, "hi")
"#;

    struct Fixture {
        framework: FrameworkMatch,
        signature: FrameworkSignature,
        platform: Arc<dyn PlatformDescriptor>,
    }

    fn fixture() -> Fixture {
        let mut builder = PlatformRegistry::builder();
        builder.with_builtins();
        Fixture {
            framework: FrameworkMatch {
                framework: "openai-agents".to_string(),
                version: "==0.2.3".to_string(),
                evidence: Vec::new(),
                confidence: 0.9,
                basis: MatchBasis::DeclaredAndUsed,
            },
            signature: FrameworkCatalog::builtin()
                .get("openai-agents")
                .cloned()
                .unwrap(),
            platform: builder.build().unwrap().get("langfuse").unwrap(),
        }
    }

    fn pattern(id: &str) -> InstrumentationPattern {
        InstrumentationPattern::new(id)
            .with_import("import os")
            .with_import("from acme import tracer")
            .with_init_code("tracer.init(service=\"{{framework}}\")\n")
            .with_call_site(CallSiteRule::new("hooks", "tracer.hooks()"))
    }

    fn plan_with(source: &str, patterns: &[InstrumentationPattern]) -> EditPlan {
        plan_with_config(source, patterns, &InstrumentConfig::default())
    }

    fn plan_with_config(
        source: &str,
        patterns: &[InstrumentationPattern],
        config: &InstrumentConfig,
    ) -> EditPlan {
        let fx = fixture();
        let file = SourceFile::from_text("agent.py", source).unwrap();
        let inputs: Vec<PlanInput<'_>> = patterns
            .iter()
            .map(|pattern| PlanInput {
                framework: &fx.framework,
                signature: &fx.signature,
                platform: fx.platform.as_ref(),
                pattern,
            })
            .collect();
        InjectionPlanner::new(config).plan(&file, &inputs)
    }

    #[test]
    fn test_plans_import_init_and_call_site() {
        let plan = plan_with(AGENT_FILE, &[pattern("acme/openai-agents")]);
        assert!(!plan.has_conflict());
        assert_eq!(plan.len(), 3);

        let points = plan.points();
        assert_eq!(points[0].kind, EditKind::InsertImport);
        assert_eq!(points[0].payload, "import os\nfrom acme import tracer");
        assert_eq!(points[0].anchor.kind, "import_from_statement");
        assert_eq!(points[0].line, 1);

        assert_eq!(points[1].kind, EditKind::InsertAfter);
        assert_eq!(points[1].payload, "tracer.init(service=\"openai-agents\")");
        assert_eq!(points[1].anchor, points[0].anchor);

        assert_eq!(points[2].anchor.kind, "call");
        assert_eq!(points[2].line, 3);
        assert_eq!(points[2].payload, "tracer.hooks()");
        assert_eq!(points[2].pattern_id, "acme/openai-agents");
        assert_eq!(
            points.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_existing_import_is_skipped() {
        let source = format!("import os\n{}", AGENT_FILE);
        let plan = plan_with(&source, &[pattern("p")]);
        assert_eq!(plan.points()[0].payload, "from acme import tracer");
    }

    #[test]
    fn test_near_duplicate_init_block_is_skipped() {
        let source = format!(
            "{}\n# tracing\ntracer.init( service = \"openai-agents\" )\n",
            AGENT_FILE
        );
        let plan = plan_with(&source, &[pattern("p")]);
        assert!(plan
            .points()
            .iter()
            .all(|p| p.kind != EditKind::InsertAfter));
        assert!(plan
            .points()
            .iter()
            .any(|p| matches!(p.kind, EditKind::AddOrMergeArgument { .. })));
    }

    #[test]
    fn test_argument_already_present() {
        let source = AGENT_FILE.replace(
            "    name=\"support\",",
            "    name=\"support\",\n    hooks=[other, tracer.hooks( )],",
        );
        let plan = plan_with(&source, &[pattern("p")]);
        assert!(plan
            .points()
            .iter()
            .all(|p| !matches!(p.kind, EditKind::AddOrMergeArgument { .. })));
    }

    #[test]
    fn test_value_mode_leaves_existing_keyword() {
        let source = AGENT_FILE.replace("    name=\"support\",", "    name=\"support\",\n    hooks=mine,");
        let mut p = pattern("p");
        p.call_site = Some(CallSiteRule::new("hooks", "tracer.hooks()").with_mode(MergeMode::Value));
        let plan = plan_with(&source, &[p]);
        assert_eq!(plan.len(), 2);

        let mut p = pattern("p");
        p.call_site = Some(CallSiteRule::new("hooks", "tracer.hooks()"));
        let plan = plan_with(&source, &[p]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_file_without_anchor_is_not_planned() {
        let plan = plan_with(
            "from agents import function_tool\n\n@function_tool\ndef lookup(q: str) -> str:\n    return q\n",
            &[pattern("p")],
        );
        assert!(plan.is_empty());
        assert!(!plan.has_conflict());
    }

    #[test]
    fn test_unbound_callee_is_not_an_anchor() {
        let plan = plan_with(
            "from agents import Runner\nfrom mylib import Agent\n\nagent = Agent()\n",
            &[pattern("p")],
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_conflicting_call_site_edits() {
        let mut second = pattern("other/openai-agents");
        second.call_site = Some(CallSiteRule::new("hooks", "other_hooks"));
        let plan = plan_with(AGENT_FILE, &[pattern("acme/openai-agents"), second]);

        assert!(plan.is_empty());
        let conflict = plan.conflict().unwrap();
        assert_eq!(conflict.line, 3);
        assert_eq!(
            conflict.pattern_ids,
            vec!["acme/openai-agents", "other/openai-agents"]
        );
    }

    #[test]
    fn test_shared_imports_are_coalesced() {
        let second = InstrumentationPattern::new("b")
            .with_import("import os")
            .with_import("import json")
            .with_init_code("json.dumps({})");
        let plan = plan_with(AGENT_FILE, &[pattern("a"), second]);

        let import = &plan.points()[0];
        assert_eq!(import.payload, "import os\nfrom acme import tracer\nimport json");
        assert_eq!(import.pattern_id, "a,b");

        let init = &plan.points()[1];
        assert_eq!(init.payload, "tracer.init(service=\"openai-agents\")\n\njson.dumps({})");
        assert_eq!(plan.pattern_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_call_site_limited_to_targets() {
        let mut p = pattern("p");
        p.call_site = Some(
            CallSiteRule::new("hooks", "tracer.hooks()")
                .with_targets(vec![InstrumentationTarget::Rag]),
        );

        let plan = plan_with(AGENT_FILE, &[p.clone()]);
        assert_eq!(plan.len(), 2);

        let config = InstrumentConfig::preset(InstrumentationLevel::Comprehensive);
        let plan = plan_with_config(AGENT_FILE, &[p], &config);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_explicit_callees_override_anchors() {
        let mut p = pattern("p");
        p.call_site = Some(CallSiteRule::new("hooks", "h").with_callees(["Runner.run_sync"]));
        let plan = plan_with(AGENT_FILE, &[p]);
        let call = plan.points().last().unwrap();
        assert_eq!(call.line, 7);
    }

    #[test]
    fn test_docstring_module_anchors_on_last_import() {
        let plan = plan_with(
            "\"\"\"Doc.\"\"\"\nimport agents\n\nagents.Agent(name=\"x\")\n",
            &[pattern("p")],
        );
        assert_eq!(plan.points()[0].anchor.kind, "import_statement");
        assert_eq!(plan.points()[0].line, 2);
    }

    #[test]
    fn test_normalize_and_contains_block() {
        let haystack = normalize_block("a = 1\n\n# note\nb  =  f( x )\nc = 3\n");
        assert_eq!(haystack.as_str(), "a=1b=f(x)c=3");
        assert!(contains_block(&haystack, &normalize_block("b = f(x)\n  c=3")));
        assert!(!contains_block(&haystack, &normalize_block("a = 1\nc = 3")));
        assert!(!contains_block(&haystack, &normalize_block("")));

        let haystack = normalize_block("max = 1\n");
        assert!(!contains_block(&haystack, &normalize_block("x = 1")));
    }

    #[test]
    fn test_reflowed_init_block_is_skipped() {
        let source = format!(
            "{}\nhandler = Handler(\n    key=\"k\"\n)\n",
            AGENT_FILE
        );
        let reflowed = InstrumentationPattern::new("p")
            .with_init_code("handler = Handler(key=\"k\")\n")
            .with_call_site(CallSiteRule::new("hooks", "handler"));
        let plan = plan_with(&source, &[reflowed]);
        assert!(plan
            .points()
            .iter()
            .all(|p| p.kind != EditKind::InsertAfter));

        let split = InstrumentationPattern::new("p")
            .with_init_code("handler = Handler(\n    key=\"k\",\n)\n");
        let source = format!("{}\nhandler = Handler(key=\"k\",)\n", AGENT_FILE);
        let plan = plan_with(&source, &[split]);
        assert!(plan
            .points()
            .iter()
            .all(|p| p.kind != EditKind::InsertAfter));
    }

    #[test]
    fn test_replanning_instrumented_text_is_empty() {
        let instrumented = r#"from agents import Agent, Runner
import os
from acme import tracer

tracer.init(service="openai-agents")

agent = Agent(
    name="support",
    instructions="Help the user",
    hooks=[tracer.hooks()],
)
result = Runner.run_sync(agent, "hi")
"#;
        let plan = plan_with(instrumented, &[pattern("p")]);
        assert!(plan.is_empty());
    }
}
