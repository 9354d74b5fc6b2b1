use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{collect_metrics, reported_values, Writer};
use crate::{
    engine::Engine,
    error::{EngineErr, Result},
};

fn default_filename() -> String {
    "metrics.json".into()
}

/// Appends one json object per flush to `<work_dir>/<filename>`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWriter {
    #[serde(default = "default_filename")]
    filename: String,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self::new(default_filename())
    }
}

impl JsonWriter {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    fn path(&self, engine: &Engine) -> Result<PathBuf> {
        engine
            .work_dir()
            .map(|dir| dir.join(&self.filename))
            .ok_or_else(|| EngineErr::InvalidConfig("JsonWriter needs a work_dir".into()))
    }

    /// The object `write` appends: the metrics snapshot followed by every reported value.
    pub fn record(&self, engine: &Engine, window: usize) -> Result<Map<String, Value>> {
        let metrics = serde_json::to_value(collect_metrics(engine, window))?;
        let Value::Object(mut record) = metrics else {
            return Ok(Map::new());
        };

        for (key, value) in reported_values(engine.buffer(), window)? {
            record.insert(key, value.into());
        }

        Ok(record)
    }
}

impl Writer for JsonWriter {
    fn open(&mut self, engine: &mut Engine) -> Result<()> {
        let path = self.path(engine)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn write(&mut self, engine: &Engine, window: usize) -> Result<()> {
        let record = self.record(engine, window)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(engine)?)?;

        serde_json::to_writer(&mut file, &record)?;
        file.write_all(b"\n")?;
        Ok(())
    }
}
