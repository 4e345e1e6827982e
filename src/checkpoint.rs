use crate::config::CheckpointConfig;
use crate::error::CheckpointError;
use crate::Dataset;
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Snapshot of a loaded [`Dataset`] in a single CBOR file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self::new(config.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Writes the dataset, creating the parent directory if needed
    pub fn save(&self, dataset: &Dataset) -> Result<(), CheckpointError> {
        let io_error = |source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_error)?;
        }

        let file = File::create(&self.path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        ciborium::into_writer(dataset, &mut writer).map_err(|e| CheckpointError::Encode(e.to_string()))?;
        writer.flush().map_err(io_error)?;

        info!("Checkpoint saved: {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Dataset, CheckpointError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let dataset: Dataset =
            ciborium::from_reader(BufReader::new(file)).map_err(|e| CheckpointError::Decode(e.to_string()))?;

        info!("Checkpoint loaded: {}", self.path.display());
        Ok(dataset)
    }
}
