// src/model.rs

use crate::error::ModelError;
use crate::probe::VideoProperties;
use log::{debug, info};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "vmaf_v0.6.1.json";
pub const UHD_MODEL: &str = "vmaf_4k_v0.6.1.json";

/// Longest edge at which the 4K model takes over.
const UHD_MIN_EDGE: u32 = 2160;

/// Picks the model for a resolution. Exactly 2160 on the long edge counts as 4K.
pub fn select_model(props: &VideoProperties) -> &'static str {
    if props.width.max(props.height) >= UHD_MIN_EDGE {
        UHD_MODEL
    } else {
        DEFAULT_MODEL
    }
}

/// Finds model files in an ordered list of directories.
#[derive(Debug, Clone)]
pub struct ModelLocator {
    search_dirs: Vec<PathBuf>,
}

impl ModelLocator {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Configured directories first, then the bundled resource directory, the
    /// bundled resource root, and the development checkout.
    pub fn with_default_dirs(extra: &[PathBuf]) -> Self {
        let mut search_dirs = extra.to_vec();
        if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            search_dirs.push(exe_dir.join("resources").join("model"));
            search_dirs.push(exe_dir.join("resources"));
        }
        search_dirs.push(PathBuf::from("model"));
        Self { search_dirs }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, ModelError> {
        for dir in &self.search_dirs {
            let candidate = dir.join(name);
            debug!("Looking for model at {}", candidate.display());
            if candidate.is_file() {
                info!("Using VMAF model: {}", candidate.display());
                return Ok(candidate);
            }
        }
        Err(ModelError::ModelNotFound {
            name: name.to_string(),
            searched: self
                .search_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn res(width: u32, height: u32) -> VideoProperties {
        VideoProperties { width, height, fps: 30.0, duration: 1.0 }
    }

    #[test]
    fn selects_by_longest_edge() {
        assert_eq!(select_model(&res(1920, 1080)), DEFAULT_MODEL);
        assert_eq!(select_model(&res(3840, 2160)), UHD_MODEL);
        assert_eq!(select_model(&res(2160, 1080)), UHD_MODEL);
        assert_eq!(select_model(&res(1080, 2160)), UHD_MODEL);
        assert_eq!(select_model(&res(2159, 2159)), DEFAULT_MODEL);
    }

    #[test]
    fn resolves_first_existing_candidate() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join(DEFAULT_MODEL), "{}").unwrap();
        fs::write(first.path().join(UHD_MODEL), "{}").unwrap();
        fs::write(second.path().join(UHD_MODEL), "{}").unwrap();

        let locator = ModelLocator::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(locator.resolve(DEFAULT_MODEL).unwrap(), second.path().join(DEFAULT_MODEL));
        assert_eq!(locator.resolve(UHD_MODEL).unwrap(), first.path().join(UHD_MODEL));
    }

    #[test]
    fn missing_model_names_the_model() {
        let dir = TempDir::new().unwrap();
        let locator = ModelLocator::new(vec![dir.path().to_path_buf()]);
        let err = locator.resolve(UHD_MODEL).unwrap_err();
        let ModelError::ModelNotFound { name, .. } = err;
        assert_eq!(name, UHD_MODEL);
    }

    #[test]
    fn configured_dirs_are_searched_first() {
        let locator = ModelLocator::with_default_dirs(&[PathBuf::from("/custom/models")]);
        assert_eq!(locator.search_dirs()[0], PathBuf::from("/custom/models"));
        assert_eq!(locator.search_dirs().last().unwrap(), &PathBuf::from("model"));
    }
}
