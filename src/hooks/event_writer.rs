use log::debug;
use serde::Deserialize;

use super::{every_n_iters_in_epoch, last_iter_in_epoch, Hook};
use crate::{
    buffer::is_internal,
    engine::Engine,
    error::Result,
    registry::ObjectSpec,
    writers::{Writer, WriterRegistry},
};

/// Default amount of training steps between flushes.
pub const DEFAULT_INTERVAL: usize = 50;

fn default_interval() -> usize {
    DEFAULT_INTERVAL
}

#[derive(Debug, Deserialize)]
pub(super) struct EventWriterParams {
    #[serde(default = "default_interval")]
    interval: usize,
    #[serde(default)]
    writers: Vec<ObjectSpec>,
}

/// Periodically flushes the buffer through a set of writers on the master.
///
/// A flush happens every `interval` training steps of an epoch, on its last step and after
/// every validation epoch. After writing, every non internal key is cleared.
pub struct EventWriterHook {
    interval: usize,
    writers: Vec<Box<dyn Writer>>,
}

impl EventWriterHook {
    /// Creates a new `EventWriterHook`.
    ///
    /// # Args
    /// * `interval` - Amount of training steps between flushes.
    /// * `writers` - The writers to flush through, in order.
    pub fn new(interval: usize, writers: Vec<Box<dyn Writer>>) -> Self {
        Self {
            interval: interval.max(1),
            writers,
        }
    }

    pub(super) fn from_params(params: EventWriterParams, registry: &WriterRegistry) -> Result<Self> {
        let writers = params
            .writers
            .iter()
            .map(|spec| registry.build(spec, &()))
            .collect::<Result<_>>()?;

        Ok(Self::new(params.interval, writers))
    }

    /// Writes the buffer through every writer, then clears the reported keys.
    fn flush(&mut self, engine: &mut Engine, window: usize) -> Result<()> {
        for writer in &mut self.writers {
            writer.write(engine, window)?;
        }

        let reported: Vec<String> = engine
            .buffer()
            .keys()
            .filter(|key| !is_internal(key))
            .map(String::from)
            .collect();

        debug!(keys = reported.len(); "flushed buffer");

        let buffer = engine.buffer_mut();
        for key in &reported {
            buffer.clear(key);
        }

        Ok(())
    }
}

impl Hook for EventWriterHook {
    fn name(&self) -> &str {
        "EventWriterHook"
    }

    fn before_launch(&mut self, engine: &mut Engine) -> Result<()> {
        if !engine.comm().is_master() {
            return Ok(());
        }

        self.writers
            .iter_mut()
            .try_for_each(|writer| writer.open(engine))
    }

    fn after_launch(&mut self, engine: &mut Engine) -> Result<()> {
        if !engine.comm().is_master() {
            return Ok(());
        }

        self.writers
            .iter_mut()
            .try_for_each(|writer| writer.close(engine))
    }

    fn after_train_step(&mut self, engine: &mut Engine) -> Result<()> {
        if !engine.comm().is_master() {
            return Ok(());
        }

        if every_n_iters_in_epoch(engine, self.interval) || last_iter_in_epoch(engine) {
            self.flush(engine, self.interval)?;
        }

        Ok(())
    }

    fn after_val_epoch(&mut self, engine: &mut Engine) -> Result<()> {
        if !engine.comm().is_master() {
            return Ok(());
        }

        let window = engine.data_loader(engine.mode().loader()).map_or(0, |loader| loader.len());
        self.flush(engine, window)
    }
}
