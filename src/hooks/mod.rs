//! Lifecycle hooks and the builtin ones.

mod checkpoint;
mod event;
mod event_writer;
mod hook;
mod lr_updater;
mod optimizer;
mod timer;

pub use checkpoint::CheckpointHook;
pub use event::Event;
pub use event_writer::{EventWriterHook, DEFAULT_INTERVAL};
pub use hook::{
    every_n_epochs, every_n_iters, every_n_iters_in_epoch, every_n_stages, first_epoch_in_stage,
    first_iter_in_epoch, last_epoch_in_stage, last_iter_in_epoch, Hook, HookSource,
};
pub use lr_updater::{scheduled_lr, warmup_lr, LrUpdaterHook};
pub use optimizer::OptimizerHook;
pub use timer::TimerHook;

use crate::{
    error::Result,
    registry::{ObjectSpec, Registry},
    writers::WriterRegistry,
};

/// Builds hooks from their records. Factories get the writer registry so hooks like
/// `EventWriterHook` can build their writers too.
pub type HookRegistry = Registry<dyn Hook, WriterRegistry>;

impl Registry<dyn Hook, WriterRegistry> {
    /// A hook registry holding every builtin hook under its type name.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("hook");
        registry.insert("TimerHook", |_: &ObjectSpec, _: &WriterRegistry| {
            Ok(Box::new(TimerHook::new()) as Box<dyn Hook>)
        });
        registry.insert("OptimizerHook", build_optimizer_hook);
        registry.insert("LrUpdaterHook", |_: &ObjectSpec, _: &WriterRegistry| {
            Ok(Box::new(LrUpdaterHook::new()) as Box<dyn Hook>)
        });
        registry.insert("CheckpointHook", build_checkpoint_hook);
        registry.insert("EventWriterHook", build_event_writer_hook);
        registry
    }
}

fn build_optimizer_hook(spec: &ObjectSpec, _: &WriterRegistry) -> Result<Box<dyn Hook>> {
    let hook: OptimizerHook = spec.params()?;
    Ok(Box::new(hook))
}

fn build_checkpoint_hook(spec: &ObjectSpec, _: &WriterRegistry) -> Result<Box<dyn Hook>> {
    let hook: CheckpointHook = spec.params()?;
    Ok(Box::new(hook))
}

fn build_event_writer_hook(spec: &ObjectSpec, writers: &WriterRegistry) -> Result<Box<dyn Hook>> {
    let hook = EventWriterHook::from_params(spec.params()?, writers)?;
    Ok(Box::new(hook))
}
