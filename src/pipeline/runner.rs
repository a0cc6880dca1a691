// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Run orchestration.
//!
//! Scans a project, detects frameworks once, then pushes every file through
//! plan, inject, validate and commit on a bounded pool of tokio workers.
//! Workers share only read-only state and the pattern memo; each hands its
//! [`FileOutcome`] to the single task that owns the [`RunReport`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::ast::SourceFile;
use crate::config::InstrumentConfig;
use crate::detect::{
    DetectionOutcome, FrameworkCatalog, FrameworkDetector, FrameworkMatch, FrameworkSignature,
    ManifestReader, PythonManifestReader,
};
use crate::error::{InjectError, ParseError, RunError};
use crate::inject::CodeInjector;
use crate::patterns::{DirPatternProvider, InstrumentationPattern, PatternCache, PatternProvider};
use crate::plan::{InjectionPlanner, PlanInput};
use crate::platforms::{PlatformDescriptor, PlatformRegistry};
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
use crate::validate::{commit, CommandFormatter, Formatter, NoopFormatter, Validator};

use super::report::{Diagnostic, FileOutcome, RunReport, Stage};
use super::state::FileState;

/// Progress callback for runs.
pub type ProgressCallback = Box<dyn Fn(RunProgress) + Send + Sync>;

/// Run progress update.
#[derive(Debug, Clone)]
pub struct RunProgress {
    /// File that just reached a terminal state.
    pub current_file: Option<PathBuf>,
    pub files_processed: usize,
    pub total_files: usize,
    pub is_complete: bool,
}

/// Files found by a scan, and what they use.
#[derive(Debug)]
pub struct Scan {
    /// Files that loaded, in path order.
    pub files: Vec<SourceFile>,
    /// Python files found, including ones that failed to load.
    pub files_scanned: usize,
    /// Files that could not be read.
    pub failed: Vec<PathBuf>,
    pub detection: DetectionOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read-only state shared by the workers of one run.
struct PipelineContext {
    config: InstrumentConfig,
    platform: Arc<dyn PlatformDescriptor>,
    catalog: FrameworkCatalog,
    matches: Vec<FrameworkMatch>,
    patterns: Arc<PatternCache>,
    planner: InjectionPlanner,
    injector: CodeInjector,
    validator: Validator,
}

/// Drives instrumentation runs over a project tree.
pub struct Runner {
    config: InstrumentConfig,
    registry: Arc<PlatformRegistry>,
    detector: FrameworkDetector,
    manifest_reader: Arc<dyn ManifestReader>,
    provider: Option<Arc<dyn PatternProvider>>,
    formatter: Arc<dyn Formatter>,
    exclude_globs: GlobSet,
    is_running: Arc<AtomicBool>,
    files_processed: Arc<AtomicUsize>,
}

impl Runner {
    /// Create a runner for `config` against a loaded registry.
    pub fn new(config: InstrumentConfig, registry: Arc<PlatformRegistry>) -> Result<Self, RunError> {
        config.validate()?;
        let exclude_globs = Self::build_globset(&config.exclude_patterns)?;

        let provider: Option<Arc<dyn PatternProvider>> = if config.pattern_dirs.is_empty() {
            None
        } else {
            Some(Arc::new(DirPatternProvider::new(config.pattern_dirs.clone())))
        };
        let formatter: Arc<dyn Formatter> = match config
            .formatter
            .as_deref()
            .and_then(CommandFormatter::from_command)
        {
            Some(formatter) => Arc::new(formatter),
            None => Arc::new(NoopFormatter),
        };

        Ok(Self {
            config,
            registry,
            detector: FrameworkDetector::new(FrameworkCatalog::builtin()),
            manifest_reader: Arc::new(PythonManifestReader::new()),
            provider,
            formatter,
            exclude_globs,
            is_running: Arc::new(AtomicBool::new(false)),
            files_processed: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Discover platforms from the built-ins and configured directories.
    ///
    /// Fails when no descriptor at all could be loaded.
    pub fn discover(config: InstrumentConfig) -> Result<Self, RunError> {
        let registry = PlatformRegistry::discover(&config.platform_dirs)?;
        for diagnostic in registry.diagnostics() {
            warn!(source = %diagnostic.source, "{}", diagnostic.message);
        }
        Self::new(config, Arc::new(registry))
    }

    pub fn with_catalog(mut self, catalog: FrameworkCatalog) -> Self {
        self.detector = FrameworkDetector::new(catalog);
        self
    }

    pub fn with_manifest_reader(mut self, reader: Arc<dyn ManifestReader>) -> Self {
        self.manifest_reader = reader;
        self
    }

    pub fn with_pattern_provider(mut self, provider: Arc<dyn PatternProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Build a globset from patterns.
    fn build_globset(patterns: &[String]) -> Result<GlobSet, RunError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| RunError::InvalidExclude {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| RunError::InvalidExclude {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })
    }

    /// Check if a run is in progress.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Files that reached a terminal state in the current run.
    pub fn files_processed(&self) -> usize {
        self.files_processed.load(Ordering::SeqCst)
    }

    /// Stop handing out files. Pipelines already running finish their
    /// commit or rollback.
    pub fn cancel(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    /// Python files under `root`, minus excluded paths, in path order.
    fn collect_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                relative.as_os_str().is_empty() || !self.exclude_globs.is_match(relative)
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "py"))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Load every Python file under `root` and detect frameworks.
    pub async fn scan(&self, root: &Path) -> Result<Scan, RunError> {
        if !root.is_dir() {
            return Err(RunError::InvalidTarget(root.to_path_buf()));
        }

        let paths = self.collect_files(root);
        let files_scanned = paths.len();
        let mut files = Vec::with_capacity(paths.len());
        let mut failed = Vec::new();
        let mut diagnostics = Vec::new();

        for path in paths {
            match SourceFile::load(&path).await {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load file");
                    diagnostics.push(Diagnostic::error(Stage::Scan, e.to_string()).with_file(&path));
                    failed.push(path);
                }
            }
        }

        let manifest = self.manifest_reader.read(root);
        let detection = self.detector.detect(manifest, &files);
        if let Some(e) = &detection.manifest_error {
            diagnostics.push(Diagnostic::warning(
                Stage::Detect,
                format!("{}; using import heuristics only", e),
            ));
        }

        info!(
            files = files_scanned,
            frameworks = detection.matches.len(),
            "Scan complete"
        );

        Ok(Scan {
            files,
            files_scanned,
            failed,
            detection,
            diagnostics,
        })
    }

    /// Instrument every file under `root`.
    ///
    /// Only an unknown platform or an unusable target aborts the run; every
    /// file-level failure becomes a diagnostic in the report.
    pub async fn run(
        &self,
        root: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<RunReport, RunError> {
        let start = Instant::now();

        let platform = self.registry.get(&self.config.platform)?;
        let scan = self.scan(root).await?;

        // Reset state
        self.is_running.store(true, Ordering::SeqCst);
        self.files_processed.store(0, Ordering::SeqCst);

        let mut report = RunReport::new(root, platform.name(), self.config.dry_run);
        report.files_scanned = scan.files_scanned;
        report.diagnostics.extend(scan.diagnostics);
        report.files_skipped.extend(scan.failed);

        let matches = self.select_matches(&scan.detection.matches, &mut report);
        report.frameworks_detected = scan.detection.matches;

        let files = scan.files;
        let total_files = files.len();
        if let Some(ref callback) = progress_callback {
            callback(RunProgress {
                current_file: None,
                files_processed: 0,
                total_files,
                is_complete: false,
            });
        }

        let context = Arc::new(PipelineContext {
            config: self.config.clone(),
            platform,
            catalog: self.detector.catalog().clone(),
            matches,
            patterns: Arc::new(PatternCache::new(self.provider.clone())),
            planner: InjectionPlanner::new(&self.config),
            injector: CodeInjector::new(),
            validator: Validator::new(self.formatter.clone()),
        });

        // Create work channel
        let parallel_jobs = self.config.parallel_jobs.clamp(1, total_files.max(1));
        let (tx, rx) = mpsc::channel::<SourceFile>(parallel_jobs * 2);
        let rx = Arc::new(Mutex::new(rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<FileOutcome>();

        // Spawn worker tasks
        let mut handles = Vec::new();
        for _ in 0..parallel_jobs {
            let rx = rx.clone();
            let outcome_tx = outcome_tx.clone();
            let context = context.clone();
            let is_running = self.is_running.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if !is_running.load(Ordering::SeqCst) {
                        break;
                    }

                    let file = {
                        let mut rx_lock = rx.lock().await;
                        rx_lock.recv().await
                    };

                    match file {
                        Some(file) => {
                            let outcome = context.process(file).await;
                            if outcome_tx.send(outcome).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }));
        }
        // Workers own the receiver now; once they stop, sends fail.
        drop(rx);
        drop(outcome_tx);

        // Send files to workers
        let is_running = self.is_running.clone();
        let feed = async move {
            for file in files {
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(file).await.is_err() {
                    break;
                }
            }
            // Dropping the sender lets idle workers exit.
        };

        // Single writer for the report.
        let collect = async {
            while let Some(outcome) = outcome_rx.recv().await {
                let processed = self.files_processed.fetch_add(1, Ordering::SeqCst) + 1;
                let current_file = outcome.path.clone();
                report.record(outcome);
                if let Some(ref callback) = progress_callback {
                    callback(RunProgress {
                        current_file: Some(current_file),
                        files_processed: processed,
                        total_files,
                        is_complete: false,
                    });
                }
            }
        };

        tokio::join!(feed, collect);

        // Wait for all workers to complete
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task failed");
            }
        }

        report.cancelled = !self.is_running.swap(false, Ordering::SeqCst);
        report.finish();

        if let Some(callback) = progress_callback {
            callback(RunProgress {
                current_file: None,
                files_processed: self.files_processed(),
                total_files,
                is_complete: true,
            });
        }

        info!(
            run_id = %report.run_id,
            modified = report.files_modified.len(),
            rolled_back = report.files_rolled_back.len(),
            skipped = report.files_skipped.len(),
            cancelled = report.cancelled,
            "Run complete"
        );

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("pipeline.run", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        Ok(report)
    }

    /// Matches in scope for this run: above the confidence floor, allowed by
    /// the framework filter and known to the catalog.
    fn select_matches(&self, matches: &[FrameworkMatch], report: &mut RunReport) -> Vec<FrameworkMatch> {
        matches
            .iter()
            .filter(|m| {
                if !self.config.includes_framework(&m.framework) {
                    debug!(framework = %m.framework, "Framework filtered out by configuration");
                    return false;
                }
                if m.confidence < self.config.min_confidence {
                    report.push(Diagnostic::info(
                        Stage::Detect,
                        format!(
                            "{} detected with confidence {:.2}, below the {:.2} minimum",
                            m.framework, m.confidence, self.config.min_confidence
                        ),
                    ));
                    return false;
                }
                self.detector.catalog().get(&m.framework).is_some()
            })
            .cloned()
            .collect()
    }
}

impl PipelineContext {
    /// Take one file from `Scanned` to a terminal state.
    #[instrument(skip_all, fields(path = %file.path().display()))]
    async fn process(&self, file: SourceFile) -> FileOutcome {
        let mut outcome = FileOutcome::new(file.path());
        outcome.advance(FileState::Detected);

        let applicable: Vec<(&FrameworkMatch, &FrameworkSignature)> = self
            .matches
            .iter()
            .filter(|m| m.evidence_in(file.path()).next().is_some())
            .filter_map(|m| self.catalog.get(&m.framework).map(|sig| (m, sig)))
            .collect();
        if applicable.is_empty() {
            debug!("No framework used in file");
            outcome.advance(FileState::Skipped);
            return outcome;
        }

        let errors = file.tree().errors();
        if let Some(first) = errors.first() {
            let err = ParseError::PreexistingErrors {
                count: errors.len(),
                line: first.line,
            };
            warn!(error = %err, "Skipping file that does not parse");
            outcome.push(Diagnostic::warning(Stage::Scan, err.to_string()).with_line(first.line));
            outcome.advance(FileState::Skipped);
            return outcome;
        }

        let mut resolved: Vec<(&FrameworkMatch, &FrameworkSignature, Arc<InstrumentationPattern>)> =
            Vec::new();
        for (framework, signature) in applicable {
            let entry_points: Vec<PathBuf> = framework
                .evidence
                .iter()
                .map(|site| site.file.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let lookup = self
                .patterns
                .resolve(
                    &framework.framework,
                    &framework.version,
                    self.platform.as_ref(),
                    &entry_points,
                    &self.config,
                )
                .await;
            match lookup {
                Ok(pattern) => resolved.push((framework, signature, pattern)),
                Err(e) => {
                    let pattern_id =
                        InstrumentationPattern::default_id(self.platform.name(), &framework.framework);
                    outcome.push(Diagnostic::warning(Stage::Pattern, e.to_string()).with_pattern(pattern_id));
                }
            }
        }
        if resolved.is_empty() {
            outcome.advance(FileState::Skipped);
            return outcome;
        }
        outcome.platform_used = true;

        let inputs: Vec<PlanInput<'_>> = resolved
            .iter()
            .map(|(framework, signature, pattern)| PlanInput {
                framework,
                signature,
                platform: self.platform.as_ref(),
                pattern: pattern.as_ref(),
            })
            .collect();
        let plan = self.planner.plan(&file, &inputs);
        outcome.advance(FileState::Planned);

        if let Some(conflict) = plan.conflict() {
            warn!(error = %conflict, "Plan conflict; leaving file unchanged");
            outcome.push(
                Diagnostic::error(Stage::Plan, conflict.to_string())
                    .with_line(conflict.line)
                    .with_pattern(conflict.pattern_ids.join(",")),
            );
            outcome.advance(FileState::Skipped);
            return outcome;
        }
        if plan.is_empty() {
            debug!("Already instrumented");
            outcome.advance(FileState::Skipped);
            return outcome;
        }

        let injection = match self.injector.apply(&file, &plan) {
            Ok(injection) => injection,
            Err(e) => {
                let mut diagnostic = Diagnostic::error(Stage::Inject, e.to_string());
                if let InjectError::Inapplicable { edit_id, .. } = &e {
                    diagnostic = diagnostic.with_edit(*edit_id);
                    if let Some(point) = plan.points().iter().find(|p| p.id == *edit_id) {
                        diagnostic = diagnostic
                            .with_pattern(point.pattern_id.clone())
                            .with_line(point.line);
                    }
                }
                warn!(error = %e, "Injection failed; file left unchanged");
                outcome.push(diagnostic);
                outcome.advance(FileState::RolledBack);
                return outcome;
            }
        };
        outcome.advance(FileState::Injected);

        let validation = self.validator.validate(&file, &plan, &injection).await;
        if let Some(err) = validation.error() {
            let mut diagnostic = Diagnostic::error(Stage::Validate, err.to_string());
            if let Some(culprit) = &validation.culprit {
                diagnostic = diagnostic
                    .with_pattern(culprit.pattern_id.clone())
                    .with_edit(culprit.edit_id)
                    .with_line(culprit.line);
            }
            outcome.push(diagnostic);
            outcome.advance(FileState::RolledBack);
            return outcome;
        }
        outcome.advance(FileState::Validated);
        if let Some(reason) = &validation.format_error {
            outcome.push(Diagnostic::warning(
                Stage::Format,
                format!("{}; kept unformatted output", reason),
            ));
        }

        if self.config.dry_run {
            info!(edits = plan.len(), "Dry run; not writing");
            outcome.advance(FileState::Committed);
            return outcome;
        }

        match commit(file.path().to_path_buf(), file.hash().to_string(), validation.text).await {
            Ok(()) => {
                info!(edits = plan.len(), "Instrumented");
                outcome.advance(FileState::Committed);
            }
            Err(e) => {
                warn!(error = %e, "Commit aborted");
                outcome.push(Diagnostic::error(Stage::Commit, e.to_string()));
                outcome.advance(FileState::RolledBack);
            }
        }
        outcome
    }
}
