//! Error types for loading, checkpointing and configuration.
//!
//! Data-quality problems (missing columns, empty streams, absent phase
//! directories) are not errors: they are logged and degrade to empty or zero
//! results. The enums below cover what the caller has to act on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while discovering or parsing raw sensor files
#[derive(Debug, Error)]
pub enum LoadError {
    /// The configured data root does not exist or is not a directory
    #[error("data root {} is not a directory", .0.display())]
    MissingRoot(PathBuf),
    /// Failed to walk a directory
    #[error("failed to list {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    /// Failed to open or parse a delimited file
    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors raised by the checkpoint store
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("checkpoint I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode checkpoint: {0}")]
    Encode(String),
    #[error("failed to decode checkpoint: {0}")]
    Decode(String),
}

/// Caller errors in analysis parameters, distinct from data-quality issues
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported sample-rate method '{0}', use 'median'")]
    UnsupportedMethod(String),
    #[error("bucket width must be a positive number of minutes, got {0}")]
    ZeroBucketWidth(u32),
    #[error("heatmap bucket width of {0} minutes does not divide a day")]
    BucketDoesNotDivideDay(u32),
}
