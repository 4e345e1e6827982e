use crate::data_loading::{SensorColumn, SensorKind, SensorTable};
use crate::error::ConfigError;
use crate::{Dataset, PhaseMatrix};
use log::warn;
use std::str::FromStr;

const NANOS_PER_SECOND: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMethod {
    /// Reciprocal of the median inter-sample interval
    Median,
}

impl FromStr for RateMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "median" => Ok(RateMethod::Median),
            other => Err(ConfigError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Estimates the sampling frequency in Hz of nanosecond timestamps.
///
/// The input may be unsorted and contain duplicates from overlapping files.
/// Returns `None` for fewer than two timestamps or when the median interval
/// is zero.
pub fn estimate_sample_rate(timestamps: &[i64]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    // i128 holds any span between two i64 clocks
    let mut diffs: Vec<i128> = sorted
        .windows(2)
        .map(|w| i128::from(w[1]) - i128::from(w[0]))
        .collect();
    diffs.sort_unstable();

    let mid = diffs.len() / 2;
    let median_ns = if diffs.len() % 2 == 0 {
        (diffs[mid - 1] as f64 + diffs[mid] as f64) / 2.0
    } else {
        diffs[mid] as f64
    };

    if median_ns == 0.0 {
        return None;
    }
    Some(NANOS_PER_SECOND / median_ns)
}

pub fn estimate_with(method: RateMethod, timestamps: &[i64]) -> Option<f64> {
    match method {
        RateMethod::Median => estimate_sample_rate(timestamps),
    }
}

/// Rate from a table's sensor clock, `None` when the table cannot provide one
pub fn table_sample_rate(table: &SensorTable, method: RateMethod) -> Option<f64> {
    if !table.has_column(SensorColumn::SensorClock) {
        return None;
    }
    estimate_with(method, &table.sensor_clocks())
}

/// Sample rate for one sensor type across every participant and phase
pub fn sample_rate_matrix(dataset: &Dataset, kind: SensorKind, method: RateMethod) -> PhaseMatrix<Option<f64>> {
    PhaseMatrix::from_dataset(dataset, |participant, phase, data| {
        let Some(table) = data.sensor(kind) else {
            warn!("Sensor group '{}' not found for participant '{}', category '{}'", kind, participant, phase);
            return None;
        };
        if !table.has_column(SensorColumn::SensorClock) {
            warn!(
                "No '{}' column for {} in participant '{}', category '{}'",
                SensorColumn::SensorClock,
                kind,
                participant,
                phase
            );
            return None;
        }
        if table.is_empty() {
            warn!("Timestamps for {} are empty for participant '{}', category '{}'", kind, participant, phase);
            return None;
        }
        estimate_with(method, &table.sensor_clocks())
    })
}

/// Rate of each source file of a table, in load order
pub fn file_sample_rates(table: &SensorTable, method: RateMethod) -> Vec<(String, Option<f64>)> {
    table
        .source_rows()
        .map(|(source, rows)| {
            let clocks: Vec<i64> = rows.iter().filter_map(|row| row.sensor_clock).collect();
            (source.name.clone(), estimate_with(method, &clocks))
        })
        .collect()
}

/// Minutes of recording implied by row count and estimated rate.
///
/// Absent or empty streams yield `Some(0.0)`; an undefined rate yields `None`.
pub fn estimated_minutes_matrix(
    dataset: &Dataset,
    kind: SensorKind,
    method: RateMethod,
) -> PhaseMatrix<Option<f64>> {
    let rates = sample_rate_matrix(dataset, kind, method);
    PhaseMatrix::from_dataset(dataset, |participant, phase, data| {
        let rows = data.sensor(kind).map_or(0, SensorTable::len);
        if rows == 0 {
            return Some(0.0);
        }
        let rate = rates.get(participant, phase).copied().flatten()?;
        Some(rows as f64 / (rate * 60.0))
    })
}
