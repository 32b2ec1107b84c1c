// src/probe.rs

use crate::error::ValidationError;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Geometry and timing of the first video stream, in display orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

impl VideoProperties {
    /// `round(duration * fps)`, or `None` when either input is unusable.
    pub fn estimated_frame_count(&self) -> Option<u64> {
        if !self.fps.is_finite() || !self.duration.is_finite() {
            return None;
        }
        if self.fps <= 0.0 || self.duration <= 0.0 {
            return None;
        }
        let frames = (self.duration * self.fps).round();
        if frames >= 1.0 { Some(frames as u64) } else { None }
    }

    pub fn same_resolution(&self, other: &VideoProperties) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Reads video properties from a media file.
pub trait VideoProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoProperties, ValidationError>;
}

/// Probes files by running ffprobe and decoding its JSON output.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self { ffprobe: ffprobe.into() }
    }
}

impl VideoProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<VideoProperties, ValidationError> {
        info!("Probing video file: {}", path.display());
        let unreadable = |detail: String| ValidationError::Unreadable {
            path: path.to_path_buf(),
            detail,
        };

        if !path.exists() {
            return Err(unreadable("file not found".to_string()));
        }

        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,duration:stream_tags=rotate:stream_side_data=rotation:format=duration",
                "-of", "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| unreadable(format!("failed to run {}: {}", self.ffprobe.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(unreadable(stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("ffprobe output for {}: {}", path.display(), stdout);

        let props = parse_probe_output(&stdout)
            .map_err(|e| unreadable(format!("invalid ffprobe output: {}", e)))?
            .ok_or_else(|| ValidationError::NoVideoTrack { path: path.to_path_buf() })?;

        info!(
            "Detected Info for {}: {}x{} @ {:.3} fps, {:.2}s",
            path.display(), props.width, props.height, props.fps, props.duration
        );
        Ok(props)
    }
}

// --- ffprobe JSON ---

#[derive(Deserialize, Debug, Default)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize, Debug, Default)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize, Debug, Default)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Decodes ffprobe JSON. `Ok(None)` means the file has no usable video stream.
fn parse_probe_output(json: &str) -> Result<Option<VideoProperties>, serde_json::Error> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let Some(stream) = output.streams.into_iter().next() else {
        return Ok(None);
    };
    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Ok(None);
    };
    if width == 0 || height == 0 {
        return Ok(None);
    }

    // Storage dimensions are swapped for quarter-turn rotations.
    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .or_else(|| stream.tags.as_ref()?.rotate.as_deref()?.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let quarter_turns = (rotation / 90.0).round() as i64;
    let (width, height) = if quarter_turns.rem_euclid(2) == 1 { (height, width) } else { (width, height) };

    // avg_frame_rate is the nominal rate; r_frame_rate can be a timebase artefact.
    let fps = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(|s| parse_frame_rate(s).ok())
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0);

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| output.format.as_ref()?.duration.as_deref()?.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(Some(VideoProperties { width, height, fps, duration }))
}

/// Parses frame rate string (e.g., "24000/1001") into f64.
pub fn parse_frame_rate(fps_str: &str) -> Result<f64, String> {
    match fps_str.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().map_err(|_| format!("Invalid FPS numerator: {}", num))?;
            let den = den.trim().parse::<f64>().map_err(|_| format!("Invalid FPS denominator: {}", den))?;
            if den == 0.0 {
                Err("FPS denominator cannot be zero".to_string())
            } else {
                Ok(num / den)
            }
        }
        None => fps_str.trim().parse::<f64>().map_err(|_| format!("Invalid FPS format: {}", fps_str)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(fps: f64, duration: f64) -> VideoProperties {
        VideoProperties { width: 1920, height: 1080, fps, duration }
    }

    #[test]
    fn frame_count_estimate_rounds() {
        assert_eq!(props(29.97, 10.0).estimated_frame_count(), Some(300));
        assert_eq!(props(24.0, 2.5).estimated_frame_count(), Some(60));
    }

    #[test]
    fn frame_count_estimate_unknown_for_bad_inputs() {
        assert_eq!(props(0.0, 10.0).estimated_frame_count(), None);
        assert_eq!(props(30.0, -1.0).estimated_frame_count(), None);
        assert_eq!(props(f64::NAN, 10.0).estimated_frame_count(), None);
        assert_eq!(props(30.0, f64::INFINITY).estimated_frame_count(), None);
    }

    #[test]
    fn frame_rate_strings() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.001);
        assert_eq!(parse_frame_rate("25").unwrap(), 25.0);
        assert!(parse_frame_rate("30/0").is_err());
        assert!(parse_frame_rate("abc").is_err());
    }

    #[test]
    fn parses_plain_stream() {
        let json = r#"{
            "streams": [{ "width": 1920, "height": 1080, "r_frame_rate": "30/1",
                          "avg_frame_rate": "30/1", "duration": "10.000000" }],
            "format": { "duration": "10.050000" }
        }"#;
        let p = parse_probe_output(json).unwrap().unwrap();
        assert_eq!((p.width, p.height), (1920, 1080));
        assert_eq!(p.fps, 30.0);
        assert_eq!(p.duration, 10.0);
    }

    #[test]
    fn rotation_reports_display_orientation() {
        let json = r#"{
            "streams": [{ "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                          "side_data_list": [{ "rotation": -90 }] }],
            "format": { "duration": "4.0" }
        }"#;
        let p = parse_probe_output(json).unwrap().unwrap();
        assert_eq!((p.width, p.height), (1080, 1920));
        assert_eq!(p.duration, 4.0);

        let legacy = r#"{ "streams": [{ "width": 640, "height": 480, "tags": { "rotate": "270" } }] }"#;
        let p = parse_probe_output(legacy).unwrap().unwrap();
        assert_eq!((p.width, p.height), (480, 640));

        let upside_down = r#"{ "streams": [{ "width": 640, "height": 480, "tags": { "rotate": "180" } }] }"#;
        let p = parse_probe_output(upside_down).unwrap().unwrap();
        assert_eq!((p.width, p.height), (640, 480));
    }

    #[test]
    fn no_stream_means_no_video_track() {
        assert!(parse_probe_output(r#"{ "streams": [], "format": {} }"#).unwrap().is_none());
        assert!(parse_probe_output(r#"{}"#).unwrap().is_none());
    }
}
