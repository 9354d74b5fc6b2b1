use log::info;

use super::{collect_metrics, eta, format_eta, reported_values, Writer};
use crate::{
    engine::{Engine, Mode},
    error::Result,
};

/// Logs a one line summary of the buffer on every flush.
#[derive(Debug, Default, Clone)]
pub struct CommandLineWriter;

impl CommandLineWriter {
    pub fn new() -> Self {
        Self
    }

    /// Builds the line `write` logs.
    ///
    /// # Returns
    /// * Training: `Epoch [e][i/n] lr: x, eta: t, time: a, data_time: b, [memory: m, ]k: v, ...`
    /// * Validation: `Epoch(val) [e][n] k: v, ...`
    ///
    /// # Errors
    /// Whatever averaging the reported keys fails with.
    pub fn format_line(&self, engine: &Engine, window: usize) -> Result<String> {
        let metrics = collect_metrics(engine, window);
        let loader_len = engine
            .data_loader(metrics.mode.loader())
            .map_or(0, |loader| loader.len());

        let mut line = match metrics.mode {
            Mode::Train => {
                let mut line = format!(
                    "Epoch [{}][{}/{}] lr: {}, ",
                    metrics.epoch, metrics.iter, loader_len, metrics.lr
                );

                if let Some(eta) = eta(engine) {
                    line += &format!("eta: {}, ", format_eta(eta));
                }

                if let (Some(time), Some(data_time)) = (metrics.time, metrics.data_time) {
                    line += &format!("time: {time:.3}, data_time: {data_time:.3}, ");
                }

                if let Some(memory) = engine.model().memory_mb() {
                    let memory = if engine.comm().world_size() > 1 {
                        engine.comm().reduce_max(memory)
                    } else {
                        memory
                    };
                    line += &format!("memory: {memory}, ");
                }

                line
            }
            Mode::Val => format!(
                "Epoch({}) [{}][{}] ",
                metrics.mode.as_str(),
                metrics.epoch,
                loader_len
            ),
        };

        let values: Vec<String> = reported_values(engine.buffer(), window)?
            .into_iter()
            .map(|(key, value)| format!("{key}: {value:.4}"))
            .collect();

        line += &values.join(", ");
        Ok(line)
    }
}

impl Writer for CommandLineWriter {
    fn write(&mut self, engine: &Engine, window: usize) -> Result<()> {
        info!("{}", self.format_line(engine, window)?);
        Ok(())
    }
}
