use std::path::PathBuf;

use log::info;
use serde::Deserialize;

use super::{every_n_epochs, Hook};
use crate::{engine::Engine, error::Result};

fn default_interval() -> usize {
    1
}

fn default_filename_tmpl() -> String {
    "epoch_{}.json".into()
}

fn default_save_optimizer() -> bool {
    true
}

/// Saves a `Checkpoint` on the master every `interval` training epochs.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointHook {
    #[serde(default = "default_interval")]
    interval: usize,
    #[serde(default = "default_save_optimizer")]
    save_optimizer: bool,
    /// File name, `{}` is replaced by the completed epoch count.
    #[serde(default = "default_filename_tmpl")]
    filename_tmpl: String,
    /// Defaults to the engine's work dir.
    #[serde(default)]
    out_dir: Option<PathBuf>,
}

impl Default for CheckpointHook {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            save_optimizer: default_save_optimizer(),
            filename_tmpl: default_filename_tmpl(),
            out_dir: None,
        }
    }
}

impl CheckpointHook {
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }

    fn path(&self, engine: &Engine, epoch: usize) -> Option<PathBuf> {
        let dir = self
            .out_dir
            .clone()
            .or_else(|| engine.work_dir().map(PathBuf::from))?;

        Some(dir.join(self.filename_tmpl.replace("{}", &epoch.to_string())))
    }
}

impl Hook for CheckpointHook {
    fn name(&self) -> &str {
        "CheckpointHook"
    }

    fn after_train_epoch(&mut self, engine: &mut Engine) -> Result<()> {
        if !engine.comm().is_master() || !every_n_epochs(engine, self.interval) {
            return Ok(());
        }

        let checkpoint = engine.checkpoint(self.save_optimizer);
        let Some(path) = self.path(engine, checkpoint.epoch) else {
            return Ok(());
        };

        checkpoint.save(&path)?;
        info!(epoch = checkpoint.epoch; "saved checkpoint to {}", path.display());
        Ok(())
    }
}
