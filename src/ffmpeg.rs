// src/ffmpeg.rs

use log::info;
use std::path::Path;

/// Escapes a value for use inside an ffmpeg filter-graph option.
/// Backslash goes first so the escapes added afterwards are not doubled.
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace(' ', "\\ ")
}

/// Builds the libvmaf filter graph. Input 0 is the reference, input 1 the
/// comparison; libvmaf takes the distorted stream first.
pub fn build_vmaf_filter(model_path: &Path, log_path: &Path, threads: usize) -> String {
    let model = escape_filter_value(&model_path.to_string_lossy());
    let log = escape_filter_value(&log_path.to_string_lossy());
    format!(
        "[0:v]setpts=PTS-STARTPTS[reference];[1:v]setpts=PTS-STARTPTS[distorted];\
         [distorted][reference]libvmaf=model=path={model}:log_fmt=json:log_path={log}:n_threads={threads}"
    )
}

/// Full ffmpeg argument vector for one comparison (program name excluded).
pub fn build_vmaf_args(
    reference: &Path,
    comparison: &Path,
    model_path: &Path,
    log_path: &Path,
    threads: usize,
) -> Vec<String> {
    let filter_graph = build_vmaf_filter(model_path, log_path, threads);
    info!("Constructed VMAF filter graph: {}", filter_graph);

    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(), reference.to_string_lossy().to_string(),
        "-i".to_string(), comparison.to_string_lossy().to_string(),
        "-lavfi".to_string(), filter_graph,
        "-f".to_string(), "null".to_string(),
        "-".to_string(),
    ]
}
