// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Whole-run guarantees: idempotence, syntactic soundness, atomic commits
//! and the detection confidence ordering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use agent_instrumentor::ast::{content_hash, parse, SourceFile};
use agent_instrumentor::config::InstrumentConfig;
use agent_instrumentor::detect::{
    DependencyManifest, FrameworkCatalog, FrameworkDetector, MatchBasis, DECLARED_THRESHOLD,
    HEURISTIC_CEILING,
};
use agent_instrumentor::error::{CommitError, DetectionError};
use agent_instrumentor::pipeline::Runner;
use agent_instrumentor::validate::commit_atomic;

// ============================================================================
// Fixtures
// ============================================================================

const LANGCHAIN: &str = r#"from langchain.agents import AgentExecutor, create_react_agent
from langchain_openai import ChatOpenAI

llm = ChatOpenAI(model="gpt-4o")
agent = create_react_agent(llm, tools=[], prompt=None)
executor = AgentExecutor(agent=agent, tools=[], verbose=True)
"#;

const LANGCHAIN_CALLBACKS: &str = r#"from langchain.agents import AgentExecutor

executor = AgentExecutor(agent=None, tools=[], callbacks=[stdout_handler])
"#;

const OPENAI_AGENTS: &str = r#"from agents import Agent, Runner

agent = Agent(name="triage", instructions="Route the request")
result = Runner.run_sync(agent, "hello")
"#;

const CREW: &str = r#"from crewai import Agent, Crew, Task

researcher = Agent(role="researcher", goal="find facts", backstory="curious")
crew = Crew(agents=[researcher], tasks=[Task(description="research", agent=researcher)])
crew.kickoff()
"#;

const PLAIN: &str = "import json\n\n\ndef load(path):\n    return json.load(open(path))\n";

const BROKEN: &str = "from langchain.agents import AgentExecutor\n\nexecutor = AgentExecutor(agent=None\n";

const REQUIREMENTS: &str = "langchain==0.2.1\nlangchain-openai>=0.1\nopenai-agents==0.2.3\ncrewai\n";

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let files = [
        ("chains/agent.py", LANGCHAIN),
        ("chains/with_callbacks.py", LANGCHAIN_CALLBACKS),
        ("triage.py", OPENAI_AGENTS),
        ("crew/main.py", CREW),
        ("util.py", PLAIN),
        ("broken.py", BROKEN),
        ("requirements.txt", REQUIREMENTS),
    ];
    for (name, content) in files {
        let path = temp.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    temp
}

fn snapshot(root: &Path) -> HashMap<PathBuf, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        .map(|e| {
            let text = std::fs::read_to_string(e.path()).unwrap();
            (e.path().to_path_buf(), text)
        })
        .collect()
}

fn config(platform: &str) -> InstrumentConfig {
    let mut config = InstrumentConfig::default();
    config.platform = platform.to_string();
    config.parallel_jobs = 3;
    config
}

// ============================================================================
// Idempotence and soundness
// ============================================================================

#[tokio::test]
async fn second_run_changes_nothing_on_every_platform() {
    for platform in ["langfuse", "phoenix", "datadog"] {
        let temp = project();
        let runner = Runner::discover(config(platform)).unwrap();

        runner.run(temp.path(), None).await.unwrap();
        let after_first = snapshot(temp.path());

        let second = runner.run(temp.path(), None).await.unwrap();
        assert!(
            second.files_modified.is_empty(),
            "{}: second run modified {:?}",
            platform,
            second.files_modified
        );
        assert_eq!(snapshot(temp.path()), after_first, "{}", platform);
    }
}

#[tokio::test]
async fn every_written_file_parses_cleanly() {
    for platform in ["langfuse", "phoenix", "datadog"] {
        let temp = project();
        let before = snapshot(temp.path());
        let report = Runner::discover(config(platform))
            .unwrap()
            .run(temp.path(), None)
            .await
            .unwrap();

        for (path, text) in snapshot(temp.path()) {
            let original = &before[&path];
            if &text == original {
                continue;
            }
            assert!(
                report.files_modified.contains(&path),
                "{}: {} changed without being reported",
                platform,
                path.display()
            );
            assert!(
                !parse(&text).unwrap().has_errors(),
                "{}: {} no longer parses",
                platform,
                path.display()
            );
        }
        for path in report.files_rolled_back.iter().chain(&report.files_skipped) {
            assert_eq!(&std::fs::read_to_string(path).unwrap(), &before[path]);
        }
    }
}

#[tokio::test]
async fn preexisting_errors_are_never_touched() {
    let temp = project();
    let report = Runner::discover(config("langfuse"))
        .unwrap()
        .run(temp.path(), None)
        .await
        .unwrap();

    let broken = temp.path().join("broken.py");
    assert!(report.files_skipped.contains(&broken));
    assert_eq!(std::fs::read_to_string(&broken).unwrap(), BROKEN);
    assert!(report.diagnostics_for(&broken).next().is_some());
}

#[tokio::test]
async fn existing_callback_lists_are_extended() {
    let temp = project();
    Runner::discover(config("langfuse"))
        .unwrap()
        .run(temp.path(), None)
        .await
        .unwrap();

    let text = std::fs::read_to_string(temp.path().join("chains/with_callbacks.py")).unwrap();
    assert!(text.contains("callbacks=[stdout_handler, langfuse_handler]"));
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let temp = project();
    let before = snapshot(temp.path());
    let mut config = config("langfuse");
    config.dry_run = true;

    let report = Runner::discover(config)
        .unwrap()
        .run(temp.path(), None)
        .await
        .unwrap();
    assert!(report.dry_run);
    assert!(!report.files_modified.is_empty());
    assert_eq!(snapshot(temp.path()), before);
}

// ============================================================================
// Atomic commit
// ============================================================================

#[test]
fn commit_refuses_a_file_changed_since_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("agent.py");
    std::fs::write(&path, "x = 1\n").unwrap();
    let loaded_hash = content_hash(b"x = 1\n");

    std::fs::write(&path, "x = 2\n").unwrap();
    let err = commit_atomic(&path, &loaded_hash, "x = 1\ny = 2\n").unwrap_err();

    assert!(matches!(err, CommitError::ChangedOnDisk(_)));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x = 2\n");
    let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn commit_replaces_whole_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("agent.py");
    std::fs::write(&path, "x = 1\n").unwrap();

    commit_atomic(&path, &content_hash(b"x = 1\n"), "x = 1\ny = 2\n").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x = 1\ny = 2\n");
}

// ============================================================================
// Detection confidence
// ============================================================================

fn sources() -> Vec<SourceFile> {
    vec![
        SourceFile::from_text("a.py", OPENAI_AGENTS).unwrap(),
        SourceFile::from_text("b.py", LANGCHAIN).unwrap(),
        SourceFile::from_text("c.py", PLAIN).unwrap(),
    ]
}

#[test]
fn only_declared_and_used_reaches_the_threshold() {
    let detector = FrameworkDetector::new(FrameworkCatalog::builtin());
    // openai-agents: declared and used. langchain: used only. crewai: declared only.
    let manifest = DependencyManifest::from_pairs([
        ("openai-agents", "==0.2.3"),
        ("crewai", ">=0.30"),
    ]);

    let outcome = detector.detect(Ok(manifest), &sources());
    let by_name: HashMap<&str, _> = outcome
        .matches
        .iter()
        .map(|m| (m.framework.as_str(), m))
        .collect();

    let agents = by_name["openai-agents"];
    assert_eq!(agents.basis, MatchBasis::DeclaredAndUsed);
    assert!(agents.is_full_match());
    assert!(agents.confidence >= DECLARED_THRESHOLD);
    assert_eq!(agents.version, "==0.2.3");

    let langchain = by_name["langchain"];
    assert_eq!(langchain.basis, MatchBasis::UsageOnly);
    assert_eq!(langchain.version, "*");

    let crew = by_name["crewai"];
    assert_eq!(crew.basis, MatchBasis::DeclarationOnly);
    assert!(crew.evidence.is_empty());

    for m in &outcome.matches {
        assert!((0.0..=1.0).contains(&m.confidence));
        if !m.is_full_match() {
            assert!(m.confidence < DECLARED_THRESHOLD, "{} scored {}", m.framework, m.confidence);
        }
    }
    assert_eq!(outcome.matches[0].framework, "openai-agents");
}

#[test]
fn unreadable_manifest_caps_every_match() {
    let detector = FrameworkDetector::new(FrameworkCatalog::builtin());
    let outcome = detector.detect(
        Err(DetectionError::ManifestUnreadable("no manifest found".to_string())),
        &sources(),
    );

    assert!(outcome.manifest_error.is_some());
    assert!(!outcome.matches.is_empty());
    for m in &outcome.matches {
        assert_eq!(m.basis, MatchBasis::Heuristic);
        assert!(m.confidence <= HEURISTIC_CEILING);
        assert!(!m.is_full_match());
    }
}

#[test]
fn undeclared_unused_frameworks_are_absent() {
    let detector = FrameworkDetector::new(FrameworkCatalog::builtin());
    let files = vec![SourceFile::from_text("c.py", PLAIN).unwrap()];
    let outcome = detector.detect(Ok(DependencyManifest::default()), &files);
    assert!(outcome.matches.is_empty());
}
