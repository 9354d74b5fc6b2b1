use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{error::Result, optimization::ParamGroup};

/// Everything needed to resume a run at an epoch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: usize,
    pub epoch: usize,
    pub iter: usize,
    pub params: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<Vec<ParamGroup>>,
    /// The optimizer's running state, saved along with its param groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optimizer_state: Vec<f32>,
}

impl Checkpoint {
    /// Writes the checkpoint as json, creating the parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/epoch_1.json");

        let checkpoint = Checkpoint {
            stage: 0,
            epoch: 1,
            iter: 4,
            params: vec![0.5, -1.0],
            optimizer: Some(vec![ParamGroup::new(0.1)]),
            optimizer_state: vec![0.25, 0.0],
        };

        checkpoint.save(&path).unwrap();
        assert_eq!(Checkpoint::load(&path).unwrap(), checkpoint);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_flushes_fail_the_save() {
        let checkpoint = Checkpoint {
            stage: 0,
            epoch: 1,
            iter: 4,
            params: vec![0.0; 16],
            optimizer: None,
            optimizer_state: Vec::new(),
        };

        assert!(checkpoint.save("/dev/full").is_err());
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Checkpoint::load(dir.path().join("nope.json")).is_err());
    }
}
