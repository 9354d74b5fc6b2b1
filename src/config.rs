use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    buffer::DEFAULT_MAX_LEN,
    error::{EngineErr, Result},
    registry::ObjectSpec,
};

/// How the learning rate decays along a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LrSchedule {
    #[default]
    Fixed,
    /// Multiplies the lr by `gamma` once the stage reaches each epoch in `steps`.
    Step { steps: Vec<usize>, gamma: f64 },
    /// Anneals from the base lr down to `min_lr` over the stage's iterations.
    Cosine { min_lr: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupPolicy {
    Linear,
    Exp,
    Constant,
}

/// Scales the scheduled lr during the first `steps` iterations of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub policy: WarmupPolicy,
    pub steps: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Validate every `interval` training epochs of the stage.
    pub interval: usize,
}

/// A run is a sequence of stages, each one a sequence of epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub epochs: usize,
    /// Base lr of the stage, the optimizer's initial lr when absent.
    #[serde(default)]
    pub lr: Option<f64>,
    #[serde(default)]
    pub lr_schedule: LrSchedule,
    #[serde(default)]
    pub warmup: Option<WarmupConfig>,
    #[serde(default)]
    pub validation: Option<ValidationConfig>,
}

impl StageConfig {
    /// A stage of `epochs` epochs with a fixed lr and no validation.
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            lr: None,
            lr_schedule: LrSchedule::Fixed,
            warmup: None,
            validation: None,
        }
    }

    pub fn with_validation(mut self, interval: usize) -> Self {
        self.validation = Some(ValidationConfig { interval });
        self
    }

    /// Checks the stage's values.
    ///
    /// # Errors
    /// `InvalidConfig` naming the offending field.
    pub fn validate(&self, idx: usize) -> Result<()> {
        if self.epochs == 0 {
            return Err(EngineErr::InvalidConfig(format!(
                "stage {idx}: epochs must be greater than 0"
            )));
        }

        if self.lr.is_some_and(|lr| lr < 0.0) {
            return Err(EngineErr::InvalidConfig(format!(
                "stage {idx}: lr must not be negative"
            )));
        }

        if let Some(ValidationConfig { interval: 0 }) = self.validation {
            return Err(EngineErr::InvalidConfig(format!(
                "stage {idx}: validation interval must be greater than 0"
            )));
        }

        if let Some(warmup) = &self.warmup {
            if warmup.steps == 0 || !(0.0..=1.0).contains(&warmup.ratio) {
                return Err(EngineErr::InvalidConfig(format!(
                    "stage {idx}: warmup needs steps > 0 and a ratio in [0, 1]"
                )));
            }
        }

        Ok(())
    }
}

fn default_buffer_size() -> usize {
    DEFAULT_MAX_LEN
}

/// Everything needed to build an engine besides the model and the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    pub stages: Vec<StageConfig>,
    pub optimizer: ObjectSpec,
    #[serde(default)]
    pub hooks: Vec<ObjectSpec>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl EngineConfig {
    /// Reads an `EngineConfig` from a json file.
    ///
    /// # Errors
    /// `Io` if the file can't be read, `Json` if it isn't a valid config, `InvalidConfig` if
    /// its values are out of range.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_stages(&self.stages)
    }
}

/// Checks that there's at least one stage and that all of them are valid.
pub fn validate_stages(stages: &[StageConfig]) -> Result<()> {
    if stages.is_empty() {
        return Err(EngineErr::InvalidConfig(
            "at least one stage is required".into(),
        ));
    }

    stages
        .iter()
        .enumerate()
        .try_for_each(|(idx, stage)| stage.validate(idx))
}
