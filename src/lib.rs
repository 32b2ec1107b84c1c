//! Perceptual video comparison driven by ffmpeg's libvmaf filter.
//!
//! [`ComparisonJob`] compares one reference/comparison pair; [`BatchOrchestrator`]
//! runs many comparisons against a shared reference with per-item status,
//! progress events, resumable re-runs and cooperative cancellation.

pub mod analyzer;
pub mod batch;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod metrics;
pub mod model;
pub mod probe;
pub mod progress;
pub mod runner;

pub use analyzer::Analyzer;
pub use batch::{BatchEvent, BatchItem, BatchOrchestrator, BatchOutcome, CancelHandle, ItemStatus};
pub use config::Config;
pub use error::{Result, VmafError};
pub use job::{ComparisonJob, JobProgress, JobState};
pub use metrics::{ComparisonResult, FrameMetric, PooledMetrics};
pub use probe::{VideoProbe, VideoProperties};
pub use progress::ProgressEvent;
pub use runner::{ProcessRunner, ToolRequest, ToolRunner};
