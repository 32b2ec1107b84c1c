#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use better_vmaf::batch::CancelHandle;
use better_vmaf::error::{ProcessError, ValidationError};
use better_vmaf::model::{DEFAULT_MODEL, ModelLocator, UHD_MODEL};
use better_vmaf::{Analyzer, Config, ProgressEvent, ToolRequest, ToolRunner, VideoProbe, VideoProperties};
use crossbeam_channel::Sender;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn props(width: u32, height: u32) -> VideoProperties {
    VideoProperties { width, height, fps: 30.0, duration: 10.0 }
}

/// Probe answering from a table keyed by file name. Unknown files have no video track.
#[derive(Default)]
pub struct ScriptedProbe {
    table: HashMap<String, VideoProperties>,
    pub calls: AtomicUsize,
    cancel_on_first_probe: Mutex<Option<CancelHandle>>,
}

impl ScriptedProbe {
    pub fn with(mut self, name: &str, props: VideoProperties) -> Self {
        self.table.insert(name.to_string(), props);
        self
    }

    pub fn cancel_during_first_probe(&self, handle: CancelHandle) {
        *self.cancel_on_first_probe.lock().unwrap() = Some(handle);
    }
}

impl VideoProbe for ScriptedProbe {
    fn probe(&self, path: &Path) -> Result<VideoProperties, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.cancel_on_first_probe.lock().unwrap().take() {
            handle.cancel();
        }
        self.table
            .get(&file_name(path))
            .copied()
            .ok_or_else(|| ValidationError::NoVideoTrack { path: path.to_path_buf() })
    }
}

#[derive(Clone, Debug)]
pub enum Behavior {
    /// Exit 0 and write a log with this many frames.
    Succeed(usize),
    /// Exit non-zero with this output.
    Fail(String),
    /// Exit 0 but write an undecodable log.
    CorruptLog,
}

/// Runner that pretends to be ffmpeg: emits progress and writes a libvmaf log.
#[derive(Default)]
pub struct ScriptedRunner {
    behaviors: HashMap<String, Behavior>,
    pub calls: Mutex<Vec<String>>,
    pub log_paths: Mutex<Vec<PathBuf>>,
    cancel_on_first_call: Mutex<Option<CancelHandle>>,
}

impl ScriptedRunner {
    pub fn with(mut self, name: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }

    pub fn cancel_during_first_call(&self, handle: CancelHandle) {
        *self.cancel_on_first_call.lock().unwrap() = Some(handle);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, request: &ToolRequest, progress: &Sender<ProgressEvent>) -> Result<(), ProcessError> {
        let comparison = file_name(Path::new(&request.args[5]));
        self.calls.lock().unwrap().push(comparison.clone());
        self.log_paths.lock().unwrap().push(request.log_path.clone());
        assert!(request.log_path.exists(), "log file should exist before the tool starts");

        if let Some(handle) = self.cancel_on_first_call.lock().unwrap().take() {
            handle.cancel();
        }

        match self.behaviors.get(&comparison).cloned().unwrap_or(Behavior::Succeed(30)) {
            Behavior::Succeed(frames) => {
                for frame in (10..=frames).step_by(10) {
                    let _ = progress.send(ProgressEvent {
                        frame_count: frame as u64,
                        fps: 60.0,
                        elapsed: Duration::from_secs_f64(frame as f64 / 30.0),
                        total_frames_estimate: None,
                    });
                }
                fs::write(&request.log_path, vmaf_log_json(frames)).unwrap();
                Ok(())
            }
            Behavior::Fail(detail) => Err(ProcessError::ToolFailed { code: Some(1), detail }),
            Behavior::CorruptLog => {
                fs::write(&request.log_path, "{ \"frames\": [").unwrap();
                Ok(())
            }
        }
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

/// A libvmaf-shaped JSON log with `frames` records and pooled vmaf {90, 100, 95.5, 94.8}.
pub fn vmaf_log_json(frames: usize) -> String {
    let records: Vec<String> = (0..frames)
        .map(|i| {
            format!(
                r#"{{"frameNum":{},"metrics":{{"integer_adm2":0.99,"integer_adm_scale0":0.98,"integer_adm_scale1":0.97,"integer_adm_scale2":0.98,"integer_adm_scale3":0.99,"integer_motion2":0.5,"integer_motion":0.6,"integer_vif_scale0":0.8,"integer_vif_scale1":0.9,"integer_vif_scale2":0.95,"integer_vif_scale3":0.97,"vmaf":{:.1}}}}}"#,
                i,
                90.0 + (i % 11) as f64
            )
        })
        .collect();
    format!(
        r#"{{"version":"3.0.0","fps":250.0,"frames":[{}],"pooled_metrics":{{"vmaf":{{"min":90.0,"max":100.0,"mean":95.5,"harmonic_mean":94.8}}}},"aggregate_metrics":{{}}}}"#,
        records.join(",")
    )
}

pub struct Fixture {
    pub dir: TempDir,
    pub probe: Arc<ScriptedProbe>,
    pub runner: Arc<ScriptedRunner>,
    pub analyzer: Analyzer,
}

impl Fixture {
    pub fn new(probe: ScriptedProbe, runner: ScriptedRunner) -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let model_dir = dir.path().join("model");
        let log_dir = dir.path().join("logs");
        fs::create_dir_all(&model_dir).unwrap();
        fs::create_dir_all(&log_dir).unwrap();
        fs::write(model_dir.join(DEFAULT_MODEL), "{}").unwrap();
        fs::write(model_dir.join(UHD_MODEL), "{}").unwrap();

        let config = Config { threads: 2, temp_dir: Some(log_dir), ..Config::default() };
        let probe = Arc::new(probe);
        let runner = Arc::new(runner);
        let analyzer = Analyzer::new(config, probe.clone(), runner.clone(), ModelLocator::new(vec![model_dir]));
        Self { dir, probe, runner, analyzer }
    }

    /// Files left behind in the VMAF log directory.
    pub fn leftover_logs(&self) -> usize {
        fs::read_dir(self.dir.path().join("logs")).unwrap().count()
    }
}
