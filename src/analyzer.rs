// src/analyzer.rs

use crate::config::Config;
use crate::error::Result;
use crate::model::ModelLocator;
use crate::probe::{FfprobeProbe, VideoProbe};
use crate::runner::{ProcessRunner, ToolRunner};
use std::sync::Arc;

/// The collaborators one comparison needs. Shared by single jobs and batches.
#[derive(Clone)]
pub struct Analyzer {
    config: Config,
    probe: Arc<dyn VideoProbe>,
    runner: Arc<dyn ToolRunner>,
    models: ModelLocator,
}

impl Analyzer {
    pub fn new(
        config: Config,
        probe: Arc<dyn VideoProbe>,
        runner: Arc<dyn ToolRunner>,
        models: ModelLocator,
    ) -> Self {
        Self { config, probe, runner, models }
    }

    /// ffprobe and ffmpeg from the configured paths, models from the default search list.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let probe = Arc::new(FfprobeProbe::new(&config.ffprobe_path));
        let runner = Arc::new(ProcessRunner::new(&config.ffmpeg_path));
        let models = ModelLocator::with_default_dirs(&config.model_dirs);
        Ok(Self::new(config, probe, runner, models))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn probe(&self) -> &dyn VideoProbe {
        self.probe.as_ref()
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    pub fn models(&self) -> &ModelLocator {
        &self.models
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}
