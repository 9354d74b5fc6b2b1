use std::time::Instant;

use super::Hook;
use crate::{engine::Engine, error::Result};

/// Records training step timings into the buffer as internal keys. Validation steps aren't
/// timed, so their pace never leaks into the training `time` and `eta`.
///
/// * `_data_time` - Seconds spent waiting for the batch.
/// * `_iter_time` - Seconds spent in the step itself.
/// * `_total_time` - Seconds since launch.
#[derive(Debug, Default)]
pub struct TimerHook {
    launched: Option<Instant>,
    step_start: Option<Instant>,
    last_step_end: Option<Instant>,
}

impl TimerHook {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_step(&mut self, engine: &mut Engine) {
        let now = Instant::now();
        let waited = self.last_step_end.map_or(0.0, |end| (now - end).as_secs_f64());

        engine.buffer_mut().record("_data_time", waited);
        self.step_start = Some(now);
    }

    fn end_step(&mut self, engine: &mut Engine) {
        let now = Instant::now();
        let step_start = self.step_start.unwrap_or(now);
        let launched = *self.launched.get_or_insert(now);

        let buffer = engine.buffer_mut();
        buffer.record("_iter_time", (now - step_start).as_secs_f64());
        buffer.record("_total_time", (now - launched).as_secs_f64());

        self.last_step_end = Some(now);
    }
}

impl Hook for TimerHook {
    fn name(&self) -> &str {
        "TimerHook"
    }

    fn before_launch(&mut self, _engine: &mut Engine) -> Result<()> {
        let now = Instant::now();
        self.launched = Some(now);
        self.last_step_end = Some(now);
        Ok(())
    }

    fn before_train_epoch(&mut self, _engine: &mut Engine) -> Result<()> {
        self.last_step_end = Some(Instant::now());
        Ok(())
    }

    fn before_train_step(&mut self, engine: &mut Engine) -> Result<()> {
        self.start_step(engine);
        Ok(())
    }

    fn after_train_step(&mut self, engine: &mut Engine) -> Result<()> {
        self.end_step(engine);
        Ok(())
    }
}
