//! CLI entry point for slp-batch
//!
//! Parses command line arguments, shows a preview of the batch and renders every set
//! after confirmation.

use anyhow::Context;
use clap::Parser;
use slp_batch::{
    format_duration_ms, init_logging, parse_spec_file, run_startup_checks, BatchDriver,
    BatchPreview, BatchReport, ClipOrder, Config, SchedulerError, SetError,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Render sets of Slippi replays into one video per set
#[derive(Parser, Debug)]
#[command(name = "slp-batch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Spec file: blank-line separated blocks of a set name followed by replay paths
    spec: PathBuf,

    /// Directory for finished videos [default: "videos" next to the spec file]
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Keep replays in the order listed instead of sorting them by file name
    #[arg(long, default_value = "false")]
    no_sort: bool,

    /// Path to the configuration file [default: my_config.toml if present, else config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory for temporary capture workspaces
    #[arg(short, long)]
    temp_dir: Option<PathBuf>,

    /// Render without asking for confirmation
    #[arg(short, long, default_value = "false")]
    yes: bool,

    /// Skip startup checks (encoder availability). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    init_logging(&config.logging);

    if args.skip_checks {
        tracing::warn!("Skipping startup checks (--skip-checks enabled)");
    } else {
        run_startup_checks(&config).context("Startup check failed")?;
    }

    let sets = parse_spec_file(&args.spec)?;
    if sets.is_empty() {
        println!("No sets found in {}", args.spec.display());
        return Ok(ExitCode::SUCCESS);
    }

    let dest_dir = args.dest.clone().unwrap_or_else(|| default_dest_dir(&args.spec));
    let temp_dir = args
        .temp_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("slp-batch"));

    let driver = BatchDriver::new(config, temp_dir);
    tracing::info!(
        parallel_games = driver.concurrency_plan.parallel_games,
        physical_cores = driver.concurrency_plan.physical_cores,
        "Concurrency plan"
    );

    print_preview(&driver.preview(&sets));

    if !args.yes && !ask_yes_or_no("Create videos?")? {
        return Ok(ExitCode::SUCCESS);
    }

    let order = if args.no_sort {
        ClipOrder::AsListed
    } else {
        ClipOrder::Chronological
    };
    let report = driver.run(&sets, &dest_dir, order).await;
    print_report(&report);

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn default_config_path() -> PathBuf {
    let local = PathBuf::from("my_config.toml");
    if local.exists() {
        local
    } else {
        PathBuf::from("config.toml")
    }
}

/// `videos` directory beside the spec file
fn default_dest_dir(spec: &Path) -> PathBuf {
    match spec.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("videos"),
        _ => PathBuf::from("videos"),
    }
}

fn format_mb(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{} MB", bytes / 1_000_000),
        None => "unknown MB".to_string(),
    }
}

fn format_gb(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.1} GB", bytes as f64 / 1e9),
        None => "unknown".to_string(),
    }
}

fn print_preview(preview: &BatchPreview) {
    println!(
        "\nFound {} set(s) with {} total SLP(s):",
        preview.set_count(),
        preview.replay_count()
    );
    for set in &preview.sets {
        println!(
            "  {} ({} games, {}, {})",
            set.name,
            set.estimate.replay_count,
            format_duration_ms(set.estimate.total_duration_ms),
            format_mb(set.estimate.approx_size_bytes)
        );
        for replay in &set.replays {
            println!("    {}", replay.display());
        }
        if set.estimate.skipped_count() > 0 {
            println!(
                "    ({} replay(s) could not be read and are not counted)",
                set.estimate.skipped_count()
            );
        }
    }

    println!(
        "\n{} set(s) with {} total SLP(s)",
        preview.set_count(),
        preview.replay_count()
    );
    println!(
        "Total duration: {}",
        format_duration_ms(preview.total_duration_ms())
    );
    println!(
        "Estimated disk space needed: {}",
        format_gb(preview.approx_size_bytes())
    );
    println!(
        "Estimated processing time: {}",
        format_duration_ms(preview.processing_time_ms())
    );
}

/// Parse a confirmation answer; `None` means ask again
fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim() {
        "y" | "Y" => Some(true),
        "n" | "N" => Some(false),
        _ => None,
    }
}

/// Ask until the answer is y or n. End of input counts as no.
fn ask_yes_or_no(question: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} (y/n) ", question);
        io::stdout().flush()?;
        match lines.next() {
            Some(line) => {
                if let Some(answer) = parse_answer(&line?) {
                    return Ok(answer);
                }
            }
            None => return Ok(false),
        }
    }
}

fn print_report(report: &BatchReport) {
    for success in &report.succeeded {
        println!(
            "  Created {} successfully ({} MB)",
            success.output.display(),
            success.size_bytes / 1_000_000
        );
    }
    for failure in &report.failed {
        println!("ERROR failed to create video for set: {}", failure.name);
        println!("  {}", failure.error);
        if let SetError::Scheduler(SchedulerError::JobsFailed { failures, .. }) = &failure.error {
            for job in failures {
                println!("    {}", job);
            }
        }
    }

    if report.all_succeeded() {
        println!("\nSuccessfully processed all {} set(s)", report.processed());
    } else {
        println!("\nFailed to process {} set(s):", report.failed.len());
        for failure in &report.failed {
            println!("{}", failure.name);
        }
    }
}
