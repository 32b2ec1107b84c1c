// src/job.rs

use crate::analyzer::Analyzer;
use crate::error::{Result, ValidationError, VmafError};
use crate::ffmpeg::build_vmaf_args;
use crate::metrics::{ComparisonResult, parse_vmaf_log};
use crate::model::select_model;
use crate::probe::VideoProperties;
use crate::progress::ProgressEvent;
use crate::runner::ToolRequest;
use crossbeam_channel::{Sender, unbounded};
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Validating,
    ValidationFailed,
    Ready,
    Running,
    Completed,
    Failed,
}

/// A progress event tagged with the job that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub event: ProgressEvent,
}

/// One reference/comparison pair, from validation to a decoded result.
#[derive(Debug)]
pub struct ComparisonJob {
    id: Uuid,
    reference: PathBuf,
    comparison: PathBuf,
    state: JobState,
    reference_props: Option<VideoProperties>,
    comparison_props: Option<VideoProperties>,
    listener: Option<Sender<JobProgress>>,
    last_command: Option<String>,
    error: Option<String>,
}

impl ComparisonJob {
    pub fn new(reference: impl Into<PathBuf>, comparison: impl Into<PathBuf>) -> Self {
        Self::with_id(Uuid::new_v4(), reference, comparison)
    }

    pub fn with_id(id: Uuid, reference: impl Into<PathBuf>, comparison: impl Into<PathBuf>) -> Self {
        Self {
            id,
            reference: reference.into(),
            comparison: comparison.into(),
            state: JobState::Created,
            reference_props: None,
            comparison_props: None,
            listener: None,
            last_command: None,
            error: None,
        }
    }

    /// Reuses already-probed reference properties instead of probing again.
    pub fn with_reference_properties(mut self, props: VideoProperties) -> Self {
        self.reference_props = Some(props);
        self
    }

    pub fn set_listener(&mut self, listener: Sender<JobProgress>) {
        self.listener = Some(listener);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn comparison(&self) -> &Path {
        &self.comparison
    }

    /// Command line of the most recent run, if one was built.
    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// Message of the failure that ended the job, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Probes both inputs and checks that their resolutions match exactly.
    pub fn validate(&mut self, analyzer: &Analyzer) -> Result<()> {
        self.validate_inputs(analyzer).map(|_| ())
    }

    fn validate_inputs(&mut self, analyzer: &Analyzer) -> Result<(VideoProperties, VideoProperties)> {
        self.state = JobState::Validating;
        match self.probe_pair(analyzer) {
            Ok((reference, comparison)) => {
                self.reference_props = Some(reference);
                self.comparison_props = Some(comparison);
                self.state = JobState::Ready;
                info!(
                    "Input validation passed: {}x{}",
                    reference.width, reference.height
                );
                Ok((reference, comparison))
            }
            Err(e) => {
                warn!("Validation failed for {}: {}", self.comparison.display(), e);
                self.state = JobState::ValidationFailed;
                self.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn probe_pair(&self, analyzer: &Analyzer) -> std::result::Result<(VideoProperties, VideoProperties), ValidationError> {
        let reference = match self.reference_props {
            Some(props) => props,
            None => analyzer.probe().probe(&self.reference)?,
        };
        let comparison = analyzer.probe().probe(&self.comparison)?;
        check_resolution(&reference, &comparison)?;
        Ok((reference, comparison))
    }

    /// Validates if needed, then runs the analysis tool and decodes its log.
    pub fn run(&mut self, analyzer: &Analyzer) -> Result<ComparisonResult> {
        let (reference, comparison) = match (self.state, self.reference_props, self.comparison_props) {
            (JobState::Ready, Some(reference), Some(comparison)) => (reference, comparison),
            _ => self.validate_inputs(analyzer)?,
        };

        self.state = JobState::Running;
        self.error = None;
        match self.execute(analyzer, &reference, &comparison) {
            Ok(result) => {
                info!(
                    "Comparison of {} completed: VMAF {:.2} over {} frames",
                    self.comparison.display(), result.score, result.frame_count
                );
                self.state = JobState::Completed;
                Ok(result)
            }
            Err(e) => {
                error!("Comparison of {} failed: {}", self.comparison.display(), e);
                self.state = JobState::Failed;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        analyzer: &Analyzer,
        reference: &VideoProperties,
        comparison: &VideoProperties,
    ) -> Result<ComparisonResult> {
        let model_name = select_model(reference);
        let model_path = analyzer.models().resolve(model_name)?;
        let config = analyzer.config();

        let log_file = tempfile::Builder::new()
            .prefix("vmaf-")
            .suffix(".json")
            .tempfile_in(config.log_dir())?
            .into_temp_path();
        debug!("VMAF log for job {}: {}", self.id, log_file.display());

        let request = ToolRequest {
            args: build_vmaf_args(&self.reference, &self.comparison, &model_path, &log_file, config.threads),
            env: config.tool_env(),
            log_path: log_file.to_path_buf(),
        };
        self.last_command = Some(analyzer.runner().command_line(&request));

        let total_frames = combined_frame_estimate(reference, comparison);
        let outcome = self
            .run_tool(analyzer, &request, total_frames)
            .map_err(VmafError::from)
            .and_then(|()| parse_vmaf_log(&log_file).map_err(VmafError::from));

        if let Err(e) = log_file.close() {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove temporary VMAF log: {}", e);
            }
        }
        outcome
    }

    /// Runs the tool while a forwarder tags its progress with this job's id.
    fn run_tool(
        &self,
        analyzer: &Analyzer,
        request: &ToolRequest,
        total_frames: Option<u64>,
    ) -> std::result::Result<(), crate::error::ProcessError> {
        let (tx, rx) = unbounded::<ProgressEvent>();
        let listener = self.listener.clone();
        let job_id = self.id;

        thread::scope(|scope| {
            scope.spawn(move || {
                for mut event in rx {
                    event.total_frames_estimate = total_frames;
                    if let Some(listener) = &listener {
                        let _ = listener.send(JobProgress { job_id, event });
                    }
                }
            });
            let outcome = analyzer.runner().run(request, &tx);
            drop(tx);
            outcome
        })
    }
}

/// Exact width and height match, no tolerance.
pub fn check_resolution(
    reference: &VideoProperties,
    comparison: &VideoProperties,
) -> std::result::Result<(), ValidationError> {
    if reference.same_resolution(comparison) {
        Ok(())
    } else {
        Err(ValidationError::ResolutionMismatch {
            ref_width: reference.width,
            ref_height: reference.height,
            cmp_width: comparison.width,
            cmp_height: comparison.height,
        })
    }
}

/// Smaller of the two known frame estimates; unknown only when both are.
pub fn combined_frame_estimate(reference: &VideoProperties, comparison: &VideoProperties) -> Option<u64> {
    match (reference.estimated_frame_count(), comparison.estimated_frame_count()) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(width: u32, height: u32, fps: f64, duration: f64) -> VideoProperties {
        VideoProperties { width, height, fps, duration }
    }

    #[test]
    fn resolution_must_match_exactly() {
        let reference = props(1920, 1080, 30.0, 10.0);
        assert!(check_resolution(&reference, &props(1920, 1080, 25.0, 3.0)).is_ok());
        match check_resolution(&reference, &props(1920, 1088, 30.0, 10.0)) {
            Err(ValidationError::ResolutionMismatch { cmp_height, .. }) => assert_eq!(cmp_height, 1088),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn frame_estimate_uses_smallest_known_value() {
        let long = props(1920, 1080, 30.0, 10.0);
        let short = props(1920, 1080, 30.0, 9.0);
        let unknown = props(1920, 1080, 0.0, 0.0);
        assert_eq!(combined_frame_estimate(&long, &short), Some(270));
        assert_eq!(combined_frame_estimate(&unknown, &short), Some(270));
        assert_eq!(combined_frame_estimate(&long, &unknown), Some(300));
        assert_eq!(combined_frame_estimate(&unknown, &unknown), None);
    }

    #[test]
    fn new_job_starts_created() {
        let job = ComparisonJob::new("ref.mp4", "cmp.mp4");
        assert_eq!(job.state(), JobState::Created);
        assert!(job.last_command().is_none());
        assert_eq!(job.comparison(), Path::new("cmp.mp4"));
    }
}
