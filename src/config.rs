use crate::coverage::BucketWidth;
use crate::data_loading::{Channel, SensorKind};
use crate::error::ConfigError;
use crate::sample_rate::RateMethod;
use clap::Parser;
use std::path::PathBuf;

/// Where the loader finds `<participant>/<phase>/<file>` trees
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub data_root: PathBuf,
}

/// Checkpoint contract: one file, independent load and save switches.
/// Loading is attempted first; saving happens only after a raw load.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub load: bool,
    pub save: bool,
}

/// Summarise sensor log coverage per participant and exposure phase
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root directory holding one folder per participant
    #[arg(long, env = "SENSOR_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Checkpoint file for the loaded dataset
    #[arg(long, env = "SENSOR_CHECKPOINT", default_value = "data/checkpoints/loaded_data.cbor")]
    pub checkpoint_path: PathBuf,

    /// Read the dataset from the checkpoint instead of parsing raw files
    #[arg(long)]
    pub load_checkpoint: bool,

    /// Write the dataset to the checkpoint after parsing raw files
    #[arg(long)]
    pub save_checkpoint: bool,

    /// Sample-rate estimation method (only "median" is supported)
    #[arg(long, default_value = "median")]
    pub rate_method: RateMethod,

    /// Bucket width in minutes for the coverage summary
    #[arg(long, default_value = "1")]
    pub summary_bucket_minutes: u32,

    /// Bucket width in minutes for the heatmap, must divide 24 hours
    #[arg(long, default_value = "10")]
    pub heatmap_bucket_minutes: u32,

    /// Sensor stream shown in the heatmaps (hr, acc, ppg, gyro)
    #[arg(long, default_value = "acc")]
    pub heatmap_sensor: SensorKind,

    /// Channel that must be non-null for a heatmap record to count
    #[arg(long, default_value = "acc_x[mg]")]
    pub heatmap_channel: Channel,

    /// Directory for rendered SVG charts
    #[arg(long, default_value = "plots")]
    pub output_dir: PathBuf,

    /// Only print summaries, do not render charts
    #[arg(long)]
    pub skip_charts: bool,
}

/// Validated settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub loader: LoaderConfig,
    pub checkpoint: CheckpointConfig,
    pub rate_method: RateMethod,
    pub summary_bucket: BucketWidth,
    pub heatmap_bucket: BucketWidth,
    pub heatmap_sensor: SensorKind,
    pub heatmap_channel: Channel,
    pub output_dir: Option<PathBuf>,
}

impl Args {
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            loader: LoaderConfig {
                data_root: self.data_dir.clone(),
            },
            checkpoint: CheckpointConfig {
                path: self.checkpoint_path.clone(),
                load: self.load_checkpoint,
                save: self.save_checkpoint,
            },
            rate_method: self.rate_method,
            summary_bucket: BucketWidth::minutes(self.summary_bucket_minutes)?,
            heatmap_bucket: BucketWidth::time_of_day(self.heatmap_bucket_minutes)?,
            heatmap_sensor: self.heatmap_sensor,
            heatmap_channel: self.heatmap_channel,
            output_dir: (!self.skip_charts).then(|| self.output_dir.clone()),
        })
    }
}
