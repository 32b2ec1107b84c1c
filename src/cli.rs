// src/cli.rs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare one video against a reference
    Compare {
        /// Original/reference video file
        reference: PathBuf,

        /// Encoded/processed video file to compare
        distorted: PathBuf,

        /// Print the ffmpeg command that was run
        #[arg(long)]
        show_command: bool,
    },

    /// Compare several videos against one reference, one at a time
    Batch {
        /// Original/reference video file
        reference: PathBuf,

        /// Videos to compare against the reference
        #[arg(required = true)]
        comparisons: Vec<PathBuf>,

        /// Re-run failed items up to N more times
        #[arg(long, default_value_t = 0, value_name = "N")]
        retries: u32,
    },
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// JSON configuration file (missing file = defaults)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// ffmpeg executable built with libvmaf
    #[arg(long, global = true, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long, global = true, value_name = "PATH")]
    pub ffprobe: Option<PathBuf>,

    /// Additional directory to search for VMAF model files (repeatable)
    #[arg(long = "model-dir", global = true, value_name = "DIR")]
    pub model_dirs: Vec<PathBuf>,

    /// Directory with shared libraries needed by a bundled ffmpeg
    #[arg(long, global = true, value_name = "DIR")]
    pub library_dir: Option<PathBuf>,

    /// Thread hint passed to libvmaf (default: number of CPUs)
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Specify output directory for the log file (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Enable logging to file (e.g., better-vmaf_YYYYMMDD_HHMMSS.log)
    #[arg(long, global = true)]
    pub log: bool,

    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
