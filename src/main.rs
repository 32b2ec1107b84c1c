mod cli;

use crate::cli::{CliArgs, Commands, GlobalArgs};
use better_vmaf::batch::{BatchEvent, BatchOrchestrator, ItemStatus};
use better_vmaf::{Analyzer, ComparisonJob, ComparisonResult, Config, Result};
use chrono::Local;
use crossbeam_channel::unbounded;
use log::{LevelFilter, debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Instant;

fn main() -> ExitCode {
    // Record start time early
    let start_time = Instant::now();

    // Parse arguments first to potentially setup logging based on them
    let args = cli::parse_args();

    if let Err(e) = setup_logging(&args.global) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(true) => {
            info!("Finished in {:.2?}", start_time.elapsed());
            ExitCode::SUCCESS
        }
        Ok(false) => {
            error!("One or more comparisons failed after {:.2?}", start_time.elapsed());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Analysis failed after {:.2?}: {}", start_time.elapsed(), e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up logging to stderr and optionally to a file.
fn setup_logging(args: &GlobalArgs) -> std::result::Result<(), fern::InitError> {
    let crate_level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .level_for("better_vmaf", crate_level);

    let mut logger = base_config.chain(std::io::stderr());

    if args.log {
        let log_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        if !log_dir.exists() {
            fs::create_dir_all(&log_dir)?;
        }
        let log_path = log_dir.join(format!("better-vmaf_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
        logger = logger.chain(fern::log_file(&log_path)?);
        eprintln!("Logging to file: {}", log_path.display());
    }

    logger.apply()?;
    Ok(())
}

fn build_config(args: &GlobalArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(ffmpeg) = &args.ffmpeg {
        config.ffmpeg_path = ffmpeg.clone();
    }
    if let Some(ffprobe) = &args.ffprobe {
        config.ffprobe_path = ffprobe.clone();
    }
    if !args.model_dirs.is_empty() {
        let mut dirs = args.model_dirs.clone();
        dirs.append(&mut config.model_dirs);
        config.model_dirs = dirs;
    }
    if let Some(dir) = &args.library_dir {
        config.library_dir = Some(dir.clone());
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.validate()?;
    Ok(config)
}

/// Main application logic. `Ok(false)` means some batch items failed.
fn run(args: CliArgs) -> Result<bool> {
    let config = build_config(&args.global)?;
    let analyzer = Analyzer::from_config(config)?;

    match args.command {
        Commands::Compare { reference, distorted, show_command } => {
            compare(&analyzer, &reference, &distorted, show_command)?;
            Ok(true)
        }
        Commands::Batch { reference, comparisons, retries } => batch(&analyzer, reference, comparisons, retries),
    }
}

fn compare(analyzer: &Analyzer, reference: &Path, distorted: &Path, show_command: bool) -> Result<()> {
    info!("Reference: {}", reference.display());
    info!("Distorted: {}", distorted.display());

    let (tx, rx) = unbounded();
    let mut job = ComparisonJob::new(reference, distorted);
    job.set_listener(tx);

    let printer = thread::spawn(move || {
        let mut last_logged = 0u64;
        for progress in rx {
            let event = progress.event;
            // Roughly every 10% (or every 500 frames without a total).
            let step = event.total_frames_estimate.map(|t| (t / 10).max(1)).unwrap_or(500);
            if event.frame_count >= last_logged + step {
                last_logged = event.frame_count;
                match event.percent_of_total() {
                    Some(pct) => info!("Frame {} ({:.1}%) at {:.1} fps", event.frame_count, pct, event.fps),
                    None => info!("Frame {} at {:.1} fps", event.frame_count, event.fps),
                }
            }
        }
    });

    let outcome = job.run(analyzer);
    if show_command {
        if let Some(command) = job.last_command() {
            println!("{}", command);
        }
    }
    drop(job);
    let _ = printer.join();

    let result = outcome?;
    print_result(distorted, &result);
    Ok(())
}

fn batch(analyzer: &Analyzer, reference: PathBuf, comparisons: Vec<PathBuf>, retries: u32) -> Result<bool> {
    let mut orchestrator = BatchOrchestrator::new(reference);
    orchestrator.add_items(comparisons);

    let (tx, rx) = unbounded();
    orchestrator.set_listener(tx);
    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                BatchEvent::ItemUpdated(item) => match item.status {
                    ItemStatus::Running if item.progress_frames == 0 => {
                        info!("Running {}", item.display_name())
                    }
                    ItemStatus::Running => debug!(
                        "{}: frame {}{} ({:.1}{}) at {:.1} fps",
                        item.display_name(),
                        item.progress_frames,
                        item.total_frames.map(|t| format!(" of {}", t)).unwrap_or_default(),
                        item.percent,
                        if item.percent_is_estimate { " est." } else { "%" },
                        item.fps
                    ),
                    ItemStatus::Failed => error!(
                        "{} failed: {}",
                        item.display_name(),
                        item.error.as_deref().unwrap_or("unknown error")
                    ),
                    ItemStatus::Completed | ItemStatus::Pending => {}
                },
                BatchEvent::Progress { .. } => {}
                BatchEvent::Finished(outcome) => info!("Batch outcome: {:?}", outcome),
            }
        }
    });

    let mut outcome = orchestrator.start(analyzer)?;
    for attempt in 1..=retries {
        if !outcome.has_failures() {
            break;
        }
        info!("Retrying failed items (attempt {} of {})", attempt, retries);
        outcome = orchestrator.start(analyzer)?;
    }

    let items = orchestrator.items();
    drop(orchestrator);
    let _ = printer.join();

    println!("Results:");
    for item in &items {
        match (&item.result, &item.error) {
            (Some(result), _) => println!(
                "  {}: VMAF {:.2} (min {:.2}, max {:.2}, harmonic {:.2}, {} frames)",
                item.display_name(), result.score, result.min_score, result.max_score,
                result.harmonic_mean, result.frame_count
            ),
            (None, Some(error)) => println!("  {}: FAILED - {}", item.display_name(), error),
            (None, None) => println!("  {}: {:?}", item.display_name(), item.status),
        }
    }

    Ok(items.iter().all(|item| item.status == ItemStatus::Completed))
}

fn print_result(distorted: &Path, result: &ComparisonResult) {
    println!("Results for {}:", distorted.display());
    println!("  VMAF Score:    {:.2}", result.score);
    println!("  Range:         {:.2} to {:.2}", result.min_score, result.max_score);
    println!("  Harmonic Mean: {:.2}", result.harmonic_mean);
    println!("  Frames:        {} ({:.2}s)", result.frame_count, result.duration);
    if let Some(summary) = result.score_summary() {
        println!(
            "  Percentiles:   1%: {:.2}  25%: {:.2}  75%: {:.2}",
            summary.percentile_1, summary.percentile_25, summary.percentile_75
        );
    }
}
