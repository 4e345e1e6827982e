use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use sensor_coverage::checkpoint::CheckpointStore;
use sensor_coverage::config::{Args, Settings};
use sensor_coverage::coverage::{coverage_heatmaps, coverage_matrix, daily_coverage, row_count_matrix};
use sensor_coverage::data_loading::{Channel, DataLoader, SensorKind};
use sensor_coverage::error::CheckpointError;
use sensor_coverage::output::{
    daily_coverage_path, format_rate, heatmap_path, print_daily_coverage, print_matrix, render_daily_coverage,
    render_heatmap, render_stacked_bars,
};
use sensor_coverage::preprocessing::merge_dataset;
use sensor_coverage::sample_rate::{estimated_minutes_matrix, file_sample_rates, sample_rate_matrix};
use sensor_coverage::Dataset;

fn load_dataset(settings: &Settings) -> Result<Dataset> {
    let store = CheckpointStore::from_config(&settings.checkpoint);

    if settings.checkpoint.load {
        match store.load() {
            Ok(dataset) => return Ok(dataset),
            Err(CheckpointError::NotFound(path)) => {
                warn!("Checkpoint {} not found, loading raw files", path.display());
            }
            Err(e) => return Err(e).context("Failed to load checkpoint"),
        }
    }

    let dataset = DataLoader::new(settings.loader.clone())
        .load_all()
        .with_context(|| format!("Failed to load sensor data from {}", settings.loader.data_root.display()))?;

    if settings.checkpoint.save {
        store.save(&dataset).context("Failed to save checkpoint")?;
    }
    Ok(dataset)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = args.settings()?;

    let dataset = load_dataset(&settings)?;
    info!("Loaded data for {} participants", dataset.len());

    let merged = merge_dataset(&dataset).context("Failed to merge sensor streams")?;
    let merged_cells = merged
        .iter()
        .flat_map(|(_, outcomes)| outcomes.iter())
        .filter(|outcome| outcome.frame().is_some())
        .count();
    info!("Merged accelerometer/PPG tables for {} participant phases", merged_cells);

    for kind in [SensorKind::Ppg, SensorKind::Accelerometer] {
        let rates = sample_rate_matrix(&dataset, kind, settings.rate_method);
        print_matrix(&format!("Sample rate of {} (sensor clock)", kind), &rates, format_rate);
    }

    for (participant, data) in &dataset {
        for (phase, phase_data) in data.phases() {
            let Some(ppg) = phase_data.ppg.as_ref() else {
                continue;
            };
            for (file, rate) in file_sample_rates(ppg, settings.rate_method) {
                debug!("{} / {} / {}: {}", participant, phase, file, format_rate(&rate));
            }
        }
    }

    let covered = coverage_matrix(&dataset, SensorKind::Ppg, Channel::PpgCh0, settings.summary_bucket);
    let covered_label = format!(
        "Covered {}-minute buckets of {}",
        settings.summary_bucket.as_minutes(),
        Channel::PpgCh0.name()
    );
    print_matrix(&covered_label, &covered, |n| n.to_string());

    let estimated = estimated_minutes_matrix(&dataset, SensorKind::Ppg, settings.rate_method);
    print_matrix("Estimated PPG minutes", &estimated, |m| {
        m.map(|m| format!("{:.1}", m)).unwrap_or_else(|| "-".to_string())
    });

    let data_points = row_count_matrix(&dataset, SensorKind::Accelerometer);
    print_matrix("Accelerometer data points", &data_points, |n| n.to_string());

    let days = daily_coverage(&dataset, settings.heatmap_sensor, settings.heatmap_channel);
    print_daily_coverage(&days);

    let heatmaps = coverage_heatmaps(
        &dataset,
        settings.heatmap_sensor,
        settings.heatmap_channel,
        settings.heatmap_bucket,
    );

    let Some(dir) = &settings.output_dir else {
        return Ok(());
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    render_stacked_bars(
        &dir.join("ppg_ch0_coverage.svg"),
        "PPG Data Availability by Participant and Exposure Category",
        &covered_label,
        &covered.map(|n| *n as f64),
    )?;
    render_stacked_bars(
        &dir.join("ppg_estimated_minutes.svg"),
        "Estimated PPG Data Availability (in Minutes)",
        "Estimated minutes of data",
        &estimated.map(|m| m.unwrap_or(0.0)),
    )?;
    render_stacked_bars(
        &dir.join("acc_data_points.svg"),
        "Data Availability Across Participants",
        "Number of data points",
        &data_points.map(|n| *n as f64),
    )?;
    for heatmap in &heatmaps {
        render_heatmap(&heatmap_path(dir, heatmap), heatmap)?;
    }
    for participant in dataset.keys() {
        render_daily_coverage(&daily_coverage_path(dir, participant), participant, &days)?;
    }

    Ok(())
}
