use crate::{engine::Engine, error::Result, registry::Source};

/// A set of lifecycle callbacks invoked by the engine.
///
/// Every callback defaults to a no-op, so hooks only implement the points they care about.
/// Hooks are identified by `name`, which must be unique among an engine's hooks.
pub trait Hook: Send {
    fn name(&self) -> &str;

    /// Called once when the hook is registered into `engine`.
    fn on_register(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn before_launch(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn after_launch(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn before_stage(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn after_stage(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn before_train_epoch(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn after_train_epoch(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn before_val_epoch(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn after_val_epoch(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn before_train_step(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn after_train_step(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn before_val_step(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn after_val_step(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }
}

/// A hook instance or the record to build it from.
pub type HookSource = Source<dyn Hook>;

impl<H: Hook + 'static> From<H> for Source<dyn Hook> {
    fn from(hook: H) -> Self {
        Self::Built(Box::new(hook))
    }
}

/// True at the end of every `n`-th stage.
pub fn every_n_stages(engine: &Engine, n: usize) -> bool {
    n > 0 && (engine.stage() + 1) % n == 0
}

/// True during every `n`-th training epoch.
pub fn every_n_epochs(engine: &Engine, n: usize) -> bool {
    n > 0 && (engine.epoch() + 1) % n == 0
}

/// True during every `n`-th training step of the run.
pub fn every_n_iters(engine: &Engine, n: usize) -> bool {
    n > 0 && (engine.iter() + 1) % n == 0
}

/// True during every `n`-th training step of the epoch.
pub fn every_n_iters_in_epoch(engine: &Engine, n: usize) -> bool {
    n > 0 && (engine.iter_in_epoch() + 1) % n == 0
}

pub fn first_iter_in_epoch(engine: &Engine) -> bool {
    engine.iter_in_epoch() == 0
}

pub fn last_iter_in_epoch(engine: &Engine) -> bool {
    engine.iter_in_epoch() + 1 == engine.epoch_len()
}

pub fn first_epoch_in_stage(engine: &Engine) -> bool {
    engine.epoch_in_stage() == 0
}

pub fn last_epoch_in_stage(engine: &Engine) -> bool {
    engine
        .current_stage()
        .is_some_and(|stage| engine.epoch_in_stage() + 1 == stage.epochs)
}
