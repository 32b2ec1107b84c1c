// src/metrics.rs

use crate::error::ResultError;
use log::{debug, info, warn};
use quantiles::ckms::CKMS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Frame rate used to place frames on a time axis. This is a fixed assumption,
/// not the probed rate, so timestamps drift for non-30 fps sources.
pub const ASSUMED_FRAME_RATE: f64 = 30.0;

// --- Result Model ---

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameMetric {
    /// 1-based position in the log.
    pub frame_number: u64,
    pub vmaf_score: f64,
    pub motion: f64,
    pub motion2: f64,
    pub adm2: f64,
    pub adm_scales: [f64; 4],
    pub vif_scales: [f64; 4],
}

impl FrameMetric {
    /// Seconds from the first frame at [`ASSUMED_FRAME_RATE`].
    pub fn timestamp(&self) -> f64 {
        self.frame_number.saturating_sub(1) as f64 / ASSUMED_FRAME_RATE
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PooledMetrics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    #[serde(rename = "harmonic_mean")]
    pub harmonic_mean: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub harmonic_mean: f64,
    pub frame_metrics: Vec<FrameMetric>,
    pub duration: f64,
    pub frame_count: u64,
}

impl ComparisonResult {
    /// Percentile lows of the per-frame VMAF scores. `None` without frames.
    pub fn score_summary(&self) -> Option<FrameScoreSummary> {
        if self.frame_metrics.is_empty() {
            return None;
        }
        let mut quantiles_data = CKMS::<f64>::new(0.001);
        for frame in &self.frame_metrics {
            quantiles_data.insert(frame.vmaf_score);
        }
        let query = |q: f64| quantiles_data.query(q).map(|(_rank, value)| value).unwrap_or(f64::NAN);

        Some(FrameScoreSummary {
            percentile_1: query(0.01),
            percentile_25: query(0.25),
            percentile_75: query(0.75),
        })
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct FrameScoreSummary {
    pub percentile_1: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
}

// --- libvmaf JSON log ---

#[derive(Deserialize, Debug)]
struct VmafLog {
    frames: Vec<FrameRecord>,
    pooled_metrics: HashMap<String, PooledMetrics>,
}

#[derive(Deserialize, Debug)]
struct FrameRecord {
    #[serde(rename = "frameNum")]
    frame_num: u64,
    metrics: FrameRecordMetrics,
}

#[derive(Deserialize, Debug)]
struct FrameRecordMetrics {
    vmaf: f64,
    #[serde(default)]
    integer_motion: f64,
    #[serde(default)]
    integer_motion2: f64,
    #[serde(default)]
    integer_adm2: f64,
    #[serde(default)]
    integer_adm_scale0: f64,
    #[serde(default)]
    integer_adm_scale1: f64,
    #[serde(default)]
    integer_adm_scale2: f64,
    #[serde(default)]
    integer_adm_scale3: f64,
    #[serde(default)]
    integer_vif_scale0: f64,
    #[serde(default)]
    integer_vif_scale1: f64,
    #[serde(default)]
    integer_vif_scale2: f64,
    #[serde(default)]
    integer_vif_scale3: f64,
}

// --- Core Functions ---

/// Reads and decodes a libvmaf JSON log.
pub fn parse_vmaf_log(log_path: &Path) -> Result<ComparisonResult, ResultError> {
    info!("Parsing VMAF log: {}", log_path.display());
    let content = fs::read_to_string(log_path).map_err(|source| ResultError::LogUnreadable {
        path: log_path.to_path_buf(),
        source,
    })?;
    decode_vmaf_log(&content)
}

/// Decodes libvmaf JSON text into a [`ComparisonResult`].
pub fn decode_vmaf_log(content: &str) -> Result<ComparisonResult, ResultError> {
    let log: VmafLog = serde_json::from_str(content)?;

    let pooled = *log.pooled_metrics.get("vmaf").ok_or(ResultError::MissingMetrics)?;

    let mut expected = log.frames.first().map(|f| f.frame_num).unwrap_or(0);
    let mut frame_metrics = Vec::with_capacity(log.frames.len());
    for (index, record) in log.frames.iter().enumerate() {
        if record.frame_num != expected {
            warn!(
                "VMAF log frame numbers are not contiguous: expected {}, found {}",
                expected, record.frame_num
            );
        }
        expected = record.frame_num.wrapping_add(1);

        let m = &record.metrics;
        frame_metrics.push(FrameMetric {
            frame_number: index as u64 + 1,
            vmaf_score: m.vmaf,
            motion: m.integer_motion,
            motion2: m.integer_motion2,
            adm2: m.integer_adm2,
            adm_scales: [m.integer_adm_scale0, m.integer_adm_scale1, m.integer_adm_scale2, m.integer_adm_scale3],
            vif_scales: [m.integer_vif_scale0, m.integer_vif_scale1, m.integer_vif_scale2, m.integer_vif_scale3],
        });
    }

    let frame_count = frame_metrics.len() as u64;
    debug!(
        "Pooled VMAF Mean: {:.2}, Min: {:.2}, Max: {:.2}, Harmonic: {:.2}",
        pooled.mean, pooled.min, pooled.max, pooled.harmonic_mean
    );
    info!("Parsed {} frames from VMAF log", frame_count);

    Ok(ComparisonResult {
        score: pooled.mean,
        min_score: pooled.min,
        max_score: pooled.max,
        harmonic_mean: pooled.harmonic_mean,
        frame_metrics,
        duration: frame_count as f64 / ASSUMED_FRAME_RATE,
        frame_count,
    })
}
