use std::f64::consts::PI;

use super::Hook;
use crate::{
    config::{LrSchedule, StageConfig, WarmupConfig, WarmupPolicy},
    engine::Engine,
    error::Result,
};

/// Sets every param group's lr before each training step following the running stage's
/// schedule and warmup.
#[derive(Debug, Default, Clone)]
pub struct LrUpdaterHook;

impl LrUpdaterHook {
    pub fn new() -> Self {
        Self
    }
}

/// The lr a stage's schedule assigns, before warmup.
///
/// # Args
/// * `base` - The stage's starting lr.
/// * `epoch` - Completed epochs in the stage.
/// * `progress` - Fraction of the stage's iterations already run.
pub fn scheduled_lr(schedule: &LrSchedule, base: f64, epoch: usize, progress: f64) -> f64 {
    match schedule {
        LrSchedule::Fixed => base,
        LrSchedule::Step { steps, gamma } => {
            let passed = steps.iter().filter(|&&step| step <= epoch).count();
            base * gamma.powi(passed as i32)
        }
        LrSchedule::Cosine { min_lr } => {
            let progress = progress.clamp(0.0, 1.0);
            min_lr + (base - min_lr) * (1.0 + (PI * progress).cos()) / 2.0
        }
    }
}

/// Scales `lr` by the warmup's factor at stage iteration `iter`.
pub fn warmup_lr(warmup: &WarmupConfig, lr: f64, iter: usize) -> f64 {
    if iter >= warmup.steps {
        return lr;
    }

    let done = iter as f64 / warmup.steps as f64;
    match warmup.policy {
        WarmupPolicy::Constant => lr * warmup.ratio,
        WarmupPolicy::Linear => lr * (1.0 - (1.0 - done) * (1.0 - warmup.ratio)),
        WarmupPolicy::Exp => lr * warmup.ratio.powf(1.0 - done),
    }
}

fn stage_lr(stage: &StageConfig, initial: f64, engine: &Engine) -> f64 {
    let base = stage.lr.unwrap_or(initial);
    let total = stage.epochs * engine.epoch_len();
    let iter = engine.iter_in_stage();
    let progress = if total == 0 {
        0.0
    } else {
        iter as f64 / total as f64
    };

    let lr = scheduled_lr(&stage.lr_schedule, base, engine.epoch_in_stage(), progress);
    match &stage.warmup {
        Some(warmup) => warmup_lr(warmup, lr, iter),
        None => lr,
    }
}

impl Hook for LrUpdaterHook {
    fn name(&self) -> &str {
        "LrUpdaterHook"
    }

    fn before_train_step(&mut self, engine: &mut Engine) -> Result<()> {
        let Some(stage) = engine.current_stage().cloned() else {
            return Ok(());
        };

        let lrs: Vec<f64> = engine
            .optimizer()
            .param_groups()
            .iter()
            .map(|group| stage_lr(&stage, group.initial_lr, engine))
            .collect();

        engine
            .optimizer_mut()
            .param_groups_mut()
            .iter_mut()
            .zip(lrs)
            .for_each(|(group, lr)| group.lr = lr);

        Ok(())
    }
}
