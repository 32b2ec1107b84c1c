// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Problems found while checking inputs, before any analysis process starts.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("No video track found in {}", path.display())]
    NoVideoTrack { path: PathBuf },

    #[error("Unable to read {}: {detail}", path.display())]
    Unreadable { path: PathBuf, detail: String },

    #[error(
        "Resolution mismatch! Reference: {ref_width}x{ref_height}, Comparison: {cmp_width}x{cmp_height}"
    )]
    ResolutionMismatch {
        ref_width: u32,
        ref_height: u32,
        cmp_width: u32,
        cmp_height: u32,
    },

    #[error("Batch rejected:\n{}", issues.join("\n"))]
    BatchRejected { issues: Vec<String> },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("VMAF model not found: {name} (searched: {searched})")]
    ModelNotFound { name: String, searched: String },
}

/// Failure kinds of the external analysis process.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Permission denied while launching the analysis tool")]
    PermissionDenied,

    #[error("Analysis tool executable not found")]
    ExecutableNotFound,

    #[error("Analysis tool was blocked by the sandbox")]
    SandboxViolation,

    #[error("{}", tool_failed_message(*code, detail))]
    ToolFailed { code: Option<i32>, detail: String },

    #[error("Failed to launch the analysis tool: {0}")]
    Launch(String),
}

fn tool_failed_message(code: Option<i32>, detail: &str) -> String {
    match (code, detail.is_empty()) {
        (_, false) => detail.to_string(),
        (Some(code), true) => format!("Analysis tool exited with status {}", code),
        (None, true) => "Analysis tool was terminated by a signal".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("Failed to read VMAF log {}: {source}", path.display())]
    LogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode VMAF log: {0}")]
    DecodeFailed(#[from] serde_json::Error),

    #[error("No VMAF metrics found in log output")]
    MissingMetrics,
}

#[derive(Error, Debug)]
pub enum VmafError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Define a standard Result type for the crate
pub type Result<T> = std::result::Result<T, VmafError>;
