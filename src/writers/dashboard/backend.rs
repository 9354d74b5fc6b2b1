use std::{collections::BTreeMap, path::Path};

use serde::Serialize;
use serde_json::Value;

use super::EventFileBackend;
use crate::{
    buffer::{MediaKind, Record},
    error::Result,
    registry::{ObjectSpec, Registry},
};

/// A single dashboard entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardEvent {
    /// `scalar`, `scalars`, `graph` or a media type.
    pub kind: String,
    pub tag: String,
    pub step: usize,
    pub value: Value,
}

impl DashboardEvent {
    pub fn new(kind: &str, tag: &str, step: usize, value: Value) -> Self {
        Self {
            kind: kind.to_string(),
            tag: tag.to_string(),
            step,
            value,
        }
    }
}

/// The sink a `DashboardWriter` renders into.
///
/// Implementors only need `emit`. Every `add_*` call turns into a `DashboardEvent` of its kind
/// by default.
pub trait DashboardBackend: Send {
    fn emit(&mut self, event: DashboardEvent) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.emit(DashboardEvent::new("scalar", tag, step, value.into()))
    }

    fn add_scalars(&mut self, tag: &str, values: &BTreeMap<String, f64>, step: usize) -> Result<()> {
        let value = serde_json::to_value(values)?;
        self.emit(DashboardEvent::new("scalars", tag, step, value))
    }

    fn add_graph(&mut self, graph: Value) -> Result<()> {
        self.emit(DashboardEvent::new("graph", "graph", 0, graph))
    }

    fn add_histogram(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Histogram, tag, record, step)
    }

    fn add_image(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Image, tag, record, step)
    }

    fn add_images(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Images, tag, record, step)
    }

    fn add_figure(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Figure, tag, record, step)
    }

    fn add_video(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Video, tag, record, step)
    }

    fn add_audio(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Audio, tag, record, step)
    }

    fn add_text(&mut self, tag: &str, record: &Record, step: usize) -> Result<()> {
        emit_media(self, MediaKind::Text, tag, record, step)
    }
}

fn emit_media<B>(
    backend: &mut B,
    kind: MediaKind,
    tag: &str,
    record: &Record,
    step: usize,
) -> Result<()>
where
    B: DashboardBackend + ?Sized,
{
    let value = serde_json::to_value(record)?;
    backend.emit(DashboardEvent::new(kind.as_str(), tag, step, value))
}

/// Routes a media record to the backend call of its type.
pub(super) fn add_media(
    backend: &mut dyn DashboardBackend,
    kind: MediaKind,
    tag: &str,
    record: &Record,
    step: usize,
) -> Result<()> {
    match kind {
        MediaKind::Histogram => backend.add_histogram(tag, record, step),
        MediaKind::Image => backend.add_image(tag, record, step),
        MediaKind::Images => backend.add_images(tag, record, step),
        MediaKind::Figure => backend.add_figure(tag, record, step),
        MediaKind::Video => backend.add_video(tag, record, step),
        MediaKind::Audio => backend.add_audio(tag, record, step),
        MediaKind::Text => backend.add_text(tag, record, step),
    }
}

/// Builds dashboard backends given the directory they log into.
pub type BackendRegistry = Registry<dyn DashboardBackend, Path>;

impl Registry<dyn DashboardBackend, Path> {
    /// A backend registry holding the `event_file` backend.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("dashboard backend");
        registry.insert("event_file", |_: &ObjectSpec, log_dir: &Path| {
            Ok(Box::new(EventFileBackend::create(log_dir)?) as Box<dyn DashboardBackend>)
        });
        registry
    }
}
