// src/config.rs

use crate::error::{Result, VmafError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings shared by every comparison: tool locations, model search paths,
/// and where transient VMAF logs are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ffmpeg executable (must be built with libvmaf)
    pub ffmpeg_path: PathBuf,
    /// ffprobe executable used to inspect inputs
    pub ffprobe_path: PathBuf,
    /// Extra directories searched for model files before the built-in locations
    pub model_dirs: Vec<PathBuf>,
    /// Directory with shared libraries the bundled ffmpeg needs at runtime
    pub library_dir: Option<PathBuf>,
    /// Thread hint passed to libvmaf
    pub threads: usize,
    /// Directory for per-job VMAF log files (None = system temp dir)
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            model_dirs: Vec::new(),
            library_dir: None,
            threads: num_cpus::get(),
            temp_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            VmafError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(VmafError::Config("Thread count must be greater than 0".to_string()));
        }
        if let Some(dir) = &self.temp_dir {
            if !dir.is_dir() {
                return Err(VmafError::Config(format!(
                    "Temporary directory is not a directory: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Directory that receives transient VMAF logs.
    pub fn log_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Environment passed to the analysis tool so a bundled ffmpeg finds its libraries.
    pub fn tool_env(&self) -> Vec<(String, String)> {
        let Some(dir) = &self.library_dir else {
            return Vec::new();
        };
        let var = if cfg!(target_os = "macos") { "DYLD_LIBRARY_PATH" } else { "LD_LIBRARY_PATH" };
        vec![(var.to_string(), dir.to_string_lossy().to_string())]
    }
}
