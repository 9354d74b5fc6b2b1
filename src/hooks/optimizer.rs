use serde::Deserialize;

use super::Hook;
use crate::{engine::Engine, error::Result};

/// Steps the optimizer after every training step.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct OptimizerHook {
    /// Max L2 norm of the gradient, larger ones are rescaled down to it.
    #[serde(default)]
    grad_clip: Option<f32>,
}

impl OptimizerHook {
    pub fn new(grad_clip: Option<f32>) -> Self {
        Self { grad_clip }
    }
}

impl Hook for OptimizerHook {
    fn name(&self) -> &str {
        "OptimizerHook"
    }

    fn after_train_step(&mut self, engine: &mut Engine) -> Result<()> {
        let norm = engine.step_optimizer(self.grad_clip)?;

        if self.grad_clip.is_some() {
            engine.buffer_mut().record("grad_norm", norm);
        }

        Ok(())
    }
}
