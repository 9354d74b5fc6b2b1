use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use super::{DashboardBackend, DashboardEvent};
use crate::error::Result;

/// Name of the file `EventFileBackend` appends to inside its log dir.
pub const EVENTS_FILE: &str = "events.jsonl";

/// Appends every dashboard event as a json line to `<log_dir>/events.jsonl`.
pub struct EventFileBackend {
    path: PathBuf,
    file: BufWriter<File>,
}

impl EventFileBackend {
    /// Opens, or creates, the events file inside `log_dir`.
    pub fn create(log_dir: &Path) -> Result<Self> {
        fs::create_dir_all(log_dir)?;

        let path = log_dir.join(EVENTS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DashboardBackend for EventFileBackend {
    fn emit(&mut self, event: DashboardEvent) -> Result<()> {
        serde_json::to_writer(&mut self.file, &event)?;
        self.file.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
