// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process run metrics.
//!
//! Stage latencies are keyed by operation name (`ast.parse`, `detect.run`,
//! `plan.build`, `inject.apply`, `validate.run`, `commit.write`,
//! `pipeline.run`, ...). File outcomes are keyed by terminal state name.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Process-wide collector.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Upper bounds of the latency buckets, in microseconds. One overflow
/// bucket follows the last bound.
const LATENCY_BOUNDS_US: [u64; 6] = [100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000];

#[derive(Debug, Default)]
pub struct Metrics {
    stages: Mutex<BTreeMap<String, StageTiming>>,
    outcomes: Mutex<BTreeMap<String, u64>>,
    pattern_hits: AtomicU64,
    pattern_misses: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one timed run of `operation`.
    pub fn record_operation(&self, operation: &str, elapsed: Duration) {
        lock(&self.stages)
            .entry(operation.to_string())
            .or_default()
            .record(elapsed);
    }

    /// Count a file ending in `state`.
    pub fn record_outcome(&self, state: &str) {
        *lock(&self.outcomes).entry(state.to_string()).or_insert(0) += 1;
    }

    /// Count a pattern lookup, `cached` when served from the run memo.
    pub fn record_pattern_lookup(&self, cached: bool) {
        let counter = if cached {
            &self.pattern_hits
        } else {
            &self.pattern_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stage(&self, operation: &str) -> Option<StageTiming> {
        lock(&self.stages).get(operation).cloned()
    }

    pub fn outcome_count(&self, state: &str) -> u64 {
        lock(&self.outcomes).get(state).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stages: lock(&self.stages).clone(),
            outcomes: lock(&self.outcomes).clone(),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
            pattern_misses: self.pattern_misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        lock(&self.stages).clear();
        lock(&self.outcomes).clear();
        self.pattern_hits.store(0, Ordering::Relaxed);
        self.pattern_misses.store(0, Ordering::Relaxed);
    }
}

/// Latency summary of one operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
    /// Counts per [`LATENCY_BOUNDS_US`] bucket plus overflow.
    pub buckets: [u64; LATENCY_BOUNDS_US.len() + 1],
}

impl StageTiming {
    pub fn record(&mut self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count += 1;
        self.total_us = self.total_us.saturating_add(us);
        self.max_us = self.max_us.max(us);
        let bucket = LATENCY_BOUNDS_US
            .iter()
            .position(|&bound| us <= bound)
            .unwrap_or(LATENCY_BOUNDS_US.len());
        self.buckets[bucket] += 1;
    }

    pub fn mean(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            n => Duration::from_micros(self.total_us / n),
        }
    }

    /// Upper bound of the bucket holding the `p`th percentile.
    /// Overflow reports the largest observed latency.
    pub fn percentile(&self, p: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let target = ((self.count as f64) * p / 100.0).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (i, count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen >= target {
                let us = LATENCY_BOUNDS_US.get(i).copied().unwrap_or(self.max_us);
                return Duration::from_micros(us.min(self.max_us));
            }
        }
        Duration::from_micros(self.max_us)
    }
}

/// Point-in-time copy of the collector.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageTiming>,
    pub outcomes: BTreeMap<String, u64>,
    pub pattern_hits: u64,
    pub pattern_misses: u64,
}

impl MetricsSnapshot {
    /// Plain-text table for `-vv` output.
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "pattern lookups: {} memoised, {} resolved",
            self.pattern_hits, self.pattern_misses
        );
        for (state, count) in &self.outcomes {
            let _ = writeln!(out, "files {}: {}", state, count);
        }
        for (operation, timing) in &self.stages {
            let _ = writeln!(
                out,
                "{:<14} {:>6} ops  mean {:>10.2?}  p99 <= {:>10.2?}  max {:>10.2?}",
                operation,
                timing.count,
                timing.mean(),
                timing.percentile(99.0),
                Duration::from_micros(timing.max_us)
            );
        }
        out
    }
}
