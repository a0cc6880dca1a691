// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agent-instrumentor entry point.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use agent_instrumentor::config::{self, CliOptions, InstrumentationLevel, InstrumentationTarget};
use agent_instrumentor::pipeline::{ProgressCallback, RunProgress, RunReport, Runner, Severity};
use agent_instrumentor::platforms::PlatformRegistry;
use agent_instrumentor::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
use agent_instrumentor::VERSION;

/// Add observability instrumentation to Python agent codebases.
#[derive(Parser)]
#[command(name = "agent-instrumentor")]
#[command(author, version, about = "Instrument agent codebases with observability calls", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Instrumentation presets.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// LLM calls only
    Minimal,
    /// Tools, LLM calls, chains and errors
    Standard,
    /// Every target
    Comprehensive,
}

impl From<Preset> for InstrumentationLevel {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Minimal => InstrumentationLevel::Minimal,
            Preset::Standard => InstrumentationLevel::Standard,
            Preset::Comprehensive => InstrumentationLevel::Comprehensive,
        }
    }
}

/// Subcommands for agent-instrumentor.
#[derive(Subcommand)]
enum Commands {
    /// Instrument a project in place
    Instrument {
        /// Project root
        path: PathBuf,

        /// Observability platform
        #[arg(short, long, env = "INSTRUMENTOR_PLATFORM")]
        platform: Option<String>,

        /// Instrumentation preset
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Targets to instrument, comma separated (overrides the preset)
        #[arg(long, value_delimiter = ',')]
        targets: Vec<String>,

        /// Only instrument these frameworks, comma separated
        #[arg(long, value_delimiter = ',')]
        frameworks: Vec<String>,

        /// Extra exclude globs, relative to the project root
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Plan and validate without writing files
        #[arg(long)]
        dry_run: bool,

        /// Worker count
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Minimum detection confidence
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Formatter command reading stdin, e.g. "black -q -"
        #[arg(long)]
        format_cmd: Option<String>,

        /// Extra platform descriptor directory
        #[arg(long)]
        platform_dir: Vec<PathBuf>,

        /// Directory of instrumentation pattern files
        #[arg(long)]
        pattern_dir: Vec<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available platforms
    Platforms {
        /// Extra platform descriptor directory
        #[arg(long)]
        platform_dir: Vec<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Detect agent frameworks without changing anything
    Detect {
        /// Project root
        path: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_telemetry(&TelemetryConfig::from_verbosity(cli.verbose))?;

    match cli.command {
        Commands::Instrument {
            path,
            platform,
            preset,
            targets,
            frameworks,
            exclude,
            dry_run,
            jobs,
            min_confidence,
            format_cmd,
            platform_dir,
            pattern_dir,
            json,
        } => {
            let targets = if targets.is_empty() {
                None
            } else {
                Some(
                    targets
                        .iter()
                        .map(|t| InstrumentationTarget::from_str(t))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            };
            let cli_options = CliOptions {
                platform,
                level: preset.map(Into::into),
                targets,
                frameworks: (!frameworks.is_empty()).then_some(frameworks),
                exclude,
                jobs,
                min_confidence,
                dry_run: dry_run.then_some(true),
                formatter: format_cmd
                    .map(|cmd| cmd.split_whitespace().map(String::from).collect()),
                platform_dirs: platform_dir,
                pattern_dirs: pattern_dir,
            };
            handle_instrument(&path, cli_options, json).await?;
            if cli.verbose >= 2 {
                eprint!("{}", GLOBAL_METRICS.snapshot().format_report());
            }
            Ok(())
        }
        Commands::Platforms { platform_dir, json } => handle_platforms(&platform_dir, json),
        Commands::Detect { path, json } => handle_detect(&path, json).await,
    }
}

async fn handle_instrument(path: &Path, cli_options: CliOptions, json: bool) -> anyhow::Result<()> {
    let config = config::load_config(path, cli_options)?;
    let runner = Runner::discover(config)?;

    let progress = if json {
        None
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        Some(bar)
    };
    let callback: Option<ProgressCallback> = progress.clone().map(|bar| {
        Box::new(move |p: RunProgress| {
            bar.set_length(p.total_files as u64);
            bar.set_position(p.files_processed as u64);
            if let Some(file) = &p.current_file {
                bar.set_message(file.display().to_string());
            }
            if p.is_complete {
                bar.finish_and_clear();
            }
        }) as ProgressCallback
    });

    let report = runner
        .run(path, callback)
        .await
        .with_context(|| format!("Instrumentation of {} failed", path.display()))?;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let title = if report.dry_run {
        "Instrumentation dry run"
    } else {
        "Instrumentation run"
    };
    println!("{} {}", title.bright_blue().bold(), report.run_id.to_string().dimmed());
    println!("Platform: {}", report.platform.bright_magenta());
    println!("Files scanned: {}", report.files_scanned);

    if report.frameworks_detected.is_empty() {
        println!("{}", "No agent framework detected".yellow());
    }
    for framework in &report.frameworks_detected {
        println!(
            "  {} {} (confidence {:.2})",
            framework.framework.bright_white(),
            framework.version.dimmed(),
            framework.confidence
        );
    }

    let modified_label = if report.dry_run { "Would modify" } else { "Modified" };
    println!("\n{}: {}", modified_label, report.files_modified.len());
    for file in &report.files_modified {
        println!("  {} {}", "✓".green(), relative(&report.root, file).display());
    }
    if !report.files_rolled_back.is_empty() {
        println!("{}: {}", "Rolled back".red(), report.files_rolled_back.len());
        for file in &report.files_rolled_back {
            println!("  {} {}", "✗".red(), relative(&report.root, file).display());
        }
    }
    println!("Skipped: {}", report.files_skipped.len());

    let notable: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity > Severity::Info)
        .collect();
    if !notable.is_empty() {
        println!("\n{}", "Diagnostics".bright_yellow());
        for diagnostic in notable {
            let line = diagnostic.to_string();
            match diagnostic.severity {
                Severity::Error => println!("  {}", line.red()),
                _ => println!("  {}", line.yellow()),
            }
        }
    }
    if report.cancelled {
        println!("\n{}", "Run was cancelled before all files were processed".yellow());
    }
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn handle_platforms(platform_dirs: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let registry = PlatformRegistry::discover(platform_dirs)?;
    let infos: Vec<_> = registry.list_all().iter().map(|p| p.info()).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "platforms": infos,
                "diagnostics": registry.diagnostics(),
            }))?
        );
        return Ok(());
    }

    println!("{}", "Available Platforms".bright_blue().bold());
    for info in &infos {
        println!("✓ {} ({})", info.display_name.bright_white(), info.name);
        if !info.description.is_empty() {
            println!("  {}", info.description.dimmed());
        }
        for var in &info.env_vars {
            let marker = if var.required { "required" } else { "optional" };
            println!("  {} [{}] {}", var.name.cyan(), marker, var.description);
        }
    }
    for diagnostic in registry.diagnostics() {
        eprintln!("{} {}: {}", "skipped".yellow(), diagnostic.source, diagnostic.message);
    }
    println!("\n{}", format!("agent-instrumentor {}", VERSION).dimmed());
    Ok(())
}

async fn handle_detect(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = config::load_config(path, CliOptions::default())?;
    let runner = Runner::discover(config)?;
    let scan = runner.scan(path).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "filesScanned": scan.files_scanned,
                "frameworks": scan.detection.matches,
                "manifestError": scan.detection.manifest_error.as_ref().map(|e| e.to_string()),
            }))?
        );
        return Ok(());
    }

    println!("Files scanned: {}", scan.files_scanned);
    if let Some(e) = &scan.detection.manifest_error {
        println!("{} {}", "Manifest:".yellow(), e);
    }
    if scan.detection.matches.is_empty() {
        println!("{}", "No agent framework detected".yellow());
    }
    for framework in &scan.detection.matches {
        let confidence = format!("{:.2}", framework.confidence);
        let confidence = if framework.is_full_match() {
            confidence.green()
        } else {
            confidence.yellow()
        };
        println!(
            "{} {} confidence {} ({} import site(s))",
            framework.framework.bright_white().bold(),
            framework.version.dimmed(),
            confidence,
            framework.evidence.len()
        );
        for site in framework.evidence.iter().take(3) {
            println!(
                "  {}:{} {}",
                relative(path, &site.file).display(),
                site.line,
                site.snippet.dimmed()
            );
        }
    }
    Ok(())
}
