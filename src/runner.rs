// src/runner.rs

use crate::error::ProcessError;
use crate::progress::{ProgressEvent, parse_progress_line};
use crossbeam_channel::Sender;
use log::{debug, error, info, trace};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

const EXIT_PERMISSION_DENIED: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;
/// Status the sandboxed tool reports when it is killed for a sandbox violation (128 + SIGABRT).
const EXIT_SANDBOX_VIOLATION: i32 = 134;

/// Everything needed to launch one analysis run.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Where the tool is expected to write its JSON log.
    pub log_path: PathBuf,
}

/// Runs the external analysis tool to completion, reporting progress on `progress`.
pub trait ToolRunner: Send + Sync {
    fn run(&self, request: &ToolRequest, progress: &Sender<ProgressEvent>) -> Result<(), ProcessError>;

    /// Human-readable command line, for display.
    fn command_line(&self, request: &ToolRequest) -> String {
        request.args.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// Spawns ffmpeg and streams its combined output.
#[derive(Debug)]
pub struct ProcessRunner {
    program: PathBuf,
    state: Mutex<RunState>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), state: Mutex::new(RunState::NotStarted) }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// State of the most recent run.
    pub fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Failed)
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, request: &ToolRequest, progress: &Sender<ProgressEvent>) -> Result<(), ProcessError> {
        let outcome = run_process(&self.program, request, progress, |state| self.set_state(state));
        self.set_state(if outcome.is_ok() { RunState::Succeeded } else { RunState::Failed });
        outcome
    }

    fn command_line(&self, request: &ToolRequest) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(request.args.iter().cloned());
        parts.join(" ")
    }
}

fn run_process(
    program: &Path,
    request: &ToolRequest,
    progress: &Sender<ProgressEvent>,
    on_state: impl Fn(RunState),
) -> Result<(), ProcessError> {
    info!("Running analysis tool: {} {}", program.display(), request.args.join(" "));

    let mut command = Command::new(program);
    command
        .args(&request.args)
        .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start_time = Instant::now();
    let mut child = command.spawn().map_err(|e| classify_launch_error(program, &e))?;
    on_state(RunState::Running);

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Both readers append to one buffer so lines keep the order they arrived in.
    let combined = Mutex::new(String::new());

    // Readers are scoped so both pipes are drained and closed before we return.
    let status = thread::scope(|scope| {
        let combined = &combined;
        let out_reader = stdout.map(|pipe| scope.spawn(move || drain_output(pipe, progress, combined)));
        let err_reader = stderr.map(|pipe| scope.spawn(move || drain_output(pipe, progress, combined)));

        let status = child.wait();
        join_reader(out_reader);
        join_reader(err_reader);
        status
    });

    let duration = start_time.elapsed();
    let status = status.map_err(|e| ProcessError::Launch(format!("failed to wait for tool: {}", e)))?;

    let output = combined.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());

    match classify_exit(status, &output) {
        Ok(()) => {
            debug!("Analysis tool output ({}ms): {}", duration.as_millis(), output.trim());
            info!("Analysis tool finished successfully ({}ms)", duration.as_millis());
            Ok(())
        }
        Err(e) => {
            error!("Analysis tool failed after {}ms: {}", duration.as_millis(), e);
            Err(e)
        }
    }
}

fn join_reader(handle: Option<thread::ScopedJoinHandle<'_, ()>>) {
    if let Some(Err(_)) = handle.map(|h| h.join()) {
        error!("Output reader thread panicked");
    }
}

/// Reads a pipe to EOF, splitting on `\n` and `\r` so in-place stats updates
/// become separate lines. Every line is appended to `combined`.
fn drain_output(mut pipe: impl Read, progress: &Sender<ProgressEvent>, combined: &Mutex<String>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Stopped reading tool output: {}", e);
                break;
            }
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                handle_line(&pending, progress, combined);
                pending.clear();
            } else {
                pending.push(byte);
            }
        }
    }
    handle_line(&pending, progress, combined);
}

fn handle_line(raw: &[u8], progress: &Sender<ProgressEvent>, combined: &Mutex<String>) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    trace!("tool: {}", line);
    if let Some(event) = parse_progress_line(line) {
        // A dropped receiver only means nobody is listening.
        let _ = progress.send(event);
    }
    if let Ok(mut collected) = combined.lock() {
        collected.push_str(line);
        collected.push('\n');
    }
}

fn classify_launch_error(program: &Path, err: &io::Error) -> ProcessError {
    error!("Failed to launch {}: {}", program.display(), err);
    match err.kind() {
        ErrorKind::NotFound => ProcessError::ExecutableNotFound,
        ErrorKind::PermissionDenied => ProcessError::PermissionDenied,
        _ => ProcessError::Launch(format!("{}: {}", program.display(), err)),
    }
}

/// Maps a finished process to an outcome. Non-empty output wins over the exit code.
pub fn classify_exit(status: ExitStatus, output: &str) -> Result<(), ProcessError> {
    if status.success() {
        return Ok(());
    }
    let detail = output.trim();
    if !detail.is_empty() {
        return Err(ProcessError::ToolFailed { code: status.code(), detail: detail.to_string() });
    }
    Err(match status.code() {
        Some(EXIT_PERMISSION_DENIED) => ProcessError::PermissionDenied,
        Some(EXIT_NOT_FOUND) => ProcessError::ExecutableNotFound,
        Some(EXIT_SANDBOX_VIOLATION) => ProcessError::SandboxViolation,
        code => ProcessError::ToolFailed { code, detail: String::new() },
    })
}
