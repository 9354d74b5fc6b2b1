mod backend;
mod event_file;

use std::path::PathBuf;

use log::info;
use serde::Deserialize;

pub use backend::{BackendRegistry, DashboardBackend, DashboardEvent};
pub use event_file::{EventFileBackend, EVENTS_FILE};

use super::Writer;
use crate::{
    buffer::{Aggregate, BufferErr, KeyKind},
    engine::Engine,
    error::{EngineErr, Result},
    registry::ObjectSpec,
};

fn default_backend() -> String {
    "event_file".into()
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DashboardParams {
    #[serde(default)]
    log_dir: Option<PathBuf>,
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default)]
    graph_data_loader: Option<String>,
}

/// Renders the buffer into a dashboard backend.
///
/// Plain keys become scalars tagged `<key>/<mode>`, media keys `<name>_<type>_` go through the
/// backend call of their type tagged `<name>/<mode>`. Internal keys are skipped. The step is
/// always the engine's `iter`.
pub struct DashboardWriter {
    params: DashboardParams,
    backends: BackendRegistry,
    sink: Option<Box<dyn DashboardBackend>>,
}

impl Default for DashboardWriter {
    fn default() -> Self {
        Self::from_params(DashboardParams {
            log_dir: None,
            backend: default_backend(),
            graph_data_loader: None,
        })
    }
}

impl DashboardWriter {
    pub(crate) fn from_params(params: DashboardParams) -> Self {
        Self {
            params,
            backends: BackendRegistry::with_builtins(),
            sink: None,
        }
    }

    /// Creates a new `DashboardWriter` logging to `<work_dir>/tf_logs` through `event_file`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.params.log_dir = Some(log_dir.into());
        self
    }

    /// Selects the backend by its registered name.
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.params.backend = name.into();
        self
    }

    /// Renders the model's graph on open, traced with the first batch of this loader.
    pub fn graph_data_loader(mut self, name: impl Into<String>) -> Self {
        self.params.graph_data_loader = Some(name.into());
        self
    }

    /// Replaces the registry backends are looked up in.
    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    fn open_backend(&self, engine: &Engine) -> Result<Box<dyn DashboardBackend>> {
        let log_dir = self
            .params
            .log_dir
            .clone()
            .or_else(|| engine.work_dir().map(|dir| dir.join("tf_logs")))
            .ok_or_else(|| {
                EngineErr::InvalidConfig("DashboardWriter needs a log_dir or a work_dir".into())
            })?;

        let spec = ObjectSpec::new(self.params.backend.as_str());
        match self.backends.build(&spec, log_dir.as_path()) {
            Err(EngineErr::UnknownType { name, .. }) => Err(EngineErr::BackendUnavailable {
                name,
                available: self.backends.kinds().map(String::from).collect(),
            }),
            other => {
                info!(
                    backend = self.params.backend.as_str();
                    "dashboard logging to {}",
                    log_dir.display()
                );
                other
            }
        }
    }

    fn add_graph(&self, engine: &mut Engine, sink: &mut dyn DashboardBackend) -> Result<()> {
        let Some(name) = &self.params.graph_data_loader else {
            return Ok(());
        };

        let loader = engine
            .data_loader_mut(name)
            .ok_or_else(|| EngineErr::MissingDataLoader(name.clone()))?;

        loader.reset();
        let sample = loader.next_batch();
        loader.reset();

        match sample.and_then(|batch| engine.model().graph(&batch)) {
            Some(graph) => sink.add_graph(graph),
            None => Ok(()),
        }
    }
}

impl Writer for DashboardWriter {
    fn open(&mut self, engine: &mut Engine) -> Result<()> {
        let mut sink = self.open_backend(engine)?;
        self.add_graph(engine, sink.as_mut())?;
        self.sink = Some(sink);
        Ok(())
    }

    fn close(&mut self, _engine: &Engine) -> Result<()> {
        match self.sink.take() {
            Some(mut sink) => sink.close(),
            None => Ok(()),
        }
    }

    fn write(&mut self, engine: &Engine, window: usize) -> Result<()> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            EngineErr::InvalidConfig("DashboardWriter must be opened before writing".into())
        })?;

        let buffer = engine.buffer();
        let mode = engine.mode().as_str();
        let step = engine.iter();

        for key in buffer.keys() {
            match KeyKind::parse(key)? {
                KeyKind::Internal => continue,
                KeyKind::Media { name, kind } => {
                    if buffer.is_empty(key) {
                        continue;
                    }
                    let record = buffer.latest(key)?;
                    let tag = format!("{name}/{mode}");
                    backend::add_media(sink.as_mut(), kind, &tag, record, step)?;
                }
                KeyKind::Reportable => {
                    let tag = format!("{key}/{mode}");
                    match buffer.avg(key, window) {
                        Ok(Aggregate::Scalar(value)) => sink.add_scalar(&tag, value, step)?,
                        Ok(Aggregate::Dict(values)) => sink.add_scalars(&tag, &values, step)?,
                        Err(BufferErr::EmptySeries(_)) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        sink.flush()
    }
}
