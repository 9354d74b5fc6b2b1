//! Metric writers flushed by `EventWriterHook`.

mod console;
mod dashboard;
mod json;
mod metrics;

pub use console::CommandLineWriter;
pub use dashboard::{
    BackendRegistry, DashboardBackend, DashboardEvent, DashboardWriter, EventFileBackend,
    EVENTS_FILE,
};
pub use json::JsonWriter;
pub use metrics::{collect_metrics, eta, format_eta, reported_values, Lr, Metrics};

use crate::{
    engine::Engine,
    error::Result,
    registry::{ObjectSpec, Registry},
};

/// Turns the engine's buffer into some output.
pub trait Writer: Send {
    /// Prepares the writer before the first flush. Runs on the master only.
    fn open(&mut self, _engine: &mut Engine) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _engine: &Engine) -> Result<()> {
        Ok(())
    }

    /// Writes the buffer's reported keys, averaged over the last `window` entries.
    fn write(&mut self, engine: &Engine, window: usize) -> Result<()>;
}

pub type WriterRegistry = Registry<dyn Writer>;

impl Registry<dyn Writer> {
    /// A writer registry holding `CommandLineWriter`, `JsonWriter` and `DashboardWriter`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("writer");
        registry.insert("CommandLineWriter", |_: &ObjectSpec, _: &()| {
            Ok(Box::new(CommandLineWriter::new()) as Box<dyn Writer>)
        });
        registry.insert("JsonWriter", build_json_writer);
        registry.insert("DashboardWriter", build_dashboard_writer);
        registry
    }
}

fn build_json_writer(spec: &ObjectSpec, _: &()) -> Result<Box<dyn Writer>> {
    let writer: JsonWriter = spec.params()?;
    Ok(Box::new(writer))
}

fn build_dashboard_writer(spec: &ObjectSpec, _: &()) -> Result<Box<dyn Writer>> {
    Ok(Box::new(DashboardWriter::from_params(spec.params()?)))
}
