// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for parsing, planning, injection and validation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use tempfile::tempdir;
use tokio::runtime::Runtime;

use agent_instrumentor::ast::{find_calls, parse, SourceFile};
use agent_instrumentor::config::InstrumentConfig;
use agent_instrumentor::detect::{DependencyManifest, FrameworkCatalog, FrameworkDetector};
use agent_instrumentor::inject::CodeInjector;
use agent_instrumentor::pipeline::Runner;
use agent_instrumentor::plan::{InjectionPlanner, PlanInput};
use agent_instrumentor::platforms::{PlatformDescriptor, PlatformRegistry};
use agent_instrumentor::validate::Validator;

/// A small LangChain agent module.
const SAMPLE_AGENT: &str = r#"
import os

from langchain.agents import AgentExecutor, create_react_agent
from langchain_openai import ChatOpenAI
from tools import search, calculator


def build_agent(prompt):
    llm = ChatOpenAI(model="gpt-4o", temperature=0)
    agent = create_react_agent(llm, tools=[search, calculator], prompt=prompt)
    return AgentExecutor(
        agent=agent,
        tools=[search, calculator],
        verbose=os.getenv("VERBOSE") == "1",
    )


def answer(question, prompt):
    executor = build_agent(prompt)
    return executor.invoke({"input": question})["output"]
"#;

fn padded_agent(helpers: usize) -> String {
    let mut text = SAMPLE_AGENT.to_string();
    for i in 0..helpers {
        text.push_str(&format!(
            "\n\ndef helper_{i}(values):\n    total = 0\n    for v in values:\n        total += v * {i}\n    return total\n"
        ));
    }
    text
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for helpers in [0, 50, 500] {
        let content = padded_agent(helpers);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(helpers), &content, |b, content| {
            b.iter(|| {
                let tree = parse(black_box(content)).unwrap();
                black_box(tree.has_errors())
            });
        });
    }
    group.finish();
}

fn bench_find_calls(c: &mut Criterion) {
    let tree = parse(&padded_agent(50)).unwrap();
    c.bench_function("find_calls", |b| {
        b.iter(|| black_box(find_calls(&tree, black_box("AgentExecutor")).len()));
    });
}

fn bench_detect(c: &mut Criterion) {
    let detector = FrameworkDetector::new(FrameworkCatalog::builtin());
    let files: Vec<SourceFile> = (0..20)
        .map(|i| SourceFile::from_text(format!("agent_{}.py", i), SAMPLE_AGENT).unwrap())
        .collect();
    let manifest = DependencyManifest::from_pairs([("langchain", "==0.2.1")]);

    c.bench_function("detect_20_files", |b| {
        b.iter(|| {
            let outcome = detector.detect(Ok(manifest.clone()), black_box(&files));
            black_box(outcome.matches.len())
        });
    });
}

fn bench_plan_inject_validate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = InstrumentConfig::default();
    let catalog = FrameworkCatalog::builtin();
    let detector = FrameworkDetector::new(catalog.clone());
    let registry = PlatformRegistry::discover(&[]).unwrap();
    let platform = registry.get("langfuse").unwrap();

    let file = SourceFile::from_text("agent.py", &padded_agent(50)).unwrap();
    let outcome = detector.detect(
        Ok(DependencyManifest::from_pairs([("langchain", "==0.2.1")])),
        std::slice::from_ref(&file),
    );
    let framework = outcome.matches.first().unwrap().clone();
    let signature = catalog.get(&framework.framework).unwrap().clone();
    let pattern = platform
        .generate_instrumentation(&framework.framework, &framework.version, &[], &config)
        .unwrap();

    let planner = InjectionPlanner::new(&config);
    let injector = CodeInjector::new();
    let validator = Validator::without_formatter();
    let inputs = [PlanInput {
        framework: &framework,
        signature: &signature,
        platform: platform.as_ref(),
        pattern: &pattern,
    }];

    c.bench_function("plan", |b| {
        b.iter(|| black_box(planner.plan(black_box(&file), &inputs).len()));
    });

    let plan = planner.plan(&file, &inputs);
    c.bench_function("inject", |b| {
        b.iter(|| black_box(injector.apply(black_box(&file), &plan).unwrap().text.len()));
    });

    let injection = injector.apply(&file, &plan).unwrap();
    c.bench_function("validate", |b| {
        b.to_async(&rt).iter(|| async {
            let result = validator.validate(&file, &plan, &injection).await;
            black_box(result.success)
        });
    });
}

fn bench_full_run(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("run_dry");
    group.sample_size(20);

    for file_count in [10, 100] {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "langchain==0.2.1\n").unwrap();
        for i in 0..file_count {
            fs::write(dir.path().join(format!("agent_{}.py", i)), SAMPLE_AGENT).unwrap();
        }

        let mut config = InstrumentConfig::default();
        config.dry_run = true;
        let runner = Runner::discover(config).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(file_count),
            &file_count,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let report = runner.run(dir.path(), None).await.unwrap();
                    black_box(report.files_modified.len())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_find_calls,
    bench_detect,
    bench_plan_inject_validate,
    bench_full_run,
);
criterion_main!(benches);
