//! Time-bucketed coverage: how many distinct windows contain at least one
//! reading, per participant and phase, plus a per-participant heatmap grid.

use crate::data_loading::{Channel, SensorColumn, SensorKind, SensorTable};
use crate::error::ConfigError;
use crate::{Dataset, ExposurePhase, ParticipantData, ParticipantId, PhaseMatrix};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Width of a coverage bucket in whole minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWidth {
    minutes: u32,
}

impl BucketWidth {
    pub const ONE_MINUTE: BucketWidth = BucketWidth { minutes: 1 };
    pub const TEN_MINUTES: BucketWidth = BucketWidth { minutes: 10 };

    pub fn minutes(minutes: u32) -> Result<Self, ConfigError> {
        if minutes == 0 {
            return Err(ConfigError::ZeroBucketWidth(minutes));
        }
        Ok(BucketWidth { minutes })
    }

    /// A width usable for time-of-day grids, which must tile a day exactly
    pub fn time_of_day(minutes: u32) -> Result<Self, ConfigError> {
        let width = Self::minutes(minutes)?;
        if MINUTES_PER_DAY % minutes != 0 {
            return Err(ConfigError::BucketDoesNotDivideDay(minutes));
        }
        Ok(width)
    }

    pub fn as_minutes(self) -> u32 {
        self.minutes
    }

    fn seconds(self) -> i64 {
        i64::from(self.minutes) * 60
    }

    /// Floors a wall-clock time to the start of its bucket (epoch aligned)
    pub fn floor(self, ts: NaiveDateTime) -> NaiveDateTime {
        let secs = ts.and_utc().timestamp();
        let start = secs - secs.rem_euclid(self.seconds());
        DateTime::from_timestamp(start, 0).map_or(ts, |dt| dt.naive_utc())
    }

    pub fn buckets_per_day(self) -> usize {
        (MINUTES_PER_DAY / self.minutes).max(1) as usize
    }

    /// Start of every bucket in a day
    pub fn time_of_day_bins(self) -> Vec<NaiveTime> {
        (0..self.buckets_per_day() as i64)
            .filter_map(|i| NaiveTime::from_num_seconds_from_midnight_opt((i * self.seconds()) as u32, 0))
            .collect()
    }

    fn bin_index(self, bucket: NaiveDateTime) -> usize {
        (i64::from(bucket.time().num_seconds_from_midnight()) / self.seconds()) as usize
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        BucketWidth::ONE_MINUTE
    }
}

/// Parses a phone wall-clock string. Offsets are dropped and the local time
/// kept, matching how the logger writes phone time.
pub fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

/// Distinct buckets holding a non-null `presence` value with a valid wall clock
pub fn qualifying_buckets(table: &SensorTable, presence: Channel, width: BucketWidth) -> BTreeSet<NaiveDateTime> {
    if !table.has_column(SensorColumn::Channel(presence)) || !table.has_column(SensorColumn::PhoneDatetime) {
        return BTreeSet::new();
    }

    table
        .rows()
        .iter()
        .filter(|row| row.value(presence).is_some_and(f64::is_finite))
        .filter_map(|row| row.phone_datetime.as_deref().and_then(parse_wall_clock))
        .map(|ts| width.floor(ts))
        .collect()
}

pub fn count_covered_buckets(table: &SensorTable, presence: Channel, width: BucketWidth) -> usize {
    qualifying_buckets(table, presence, width).len()
}

/// Covered bucket count for every participant and phase; absent streams count 0
pub fn coverage_matrix(
    dataset: &Dataset,
    kind: SensorKind,
    presence: Channel,
    width: BucketWidth,
) -> PhaseMatrix<usize> {
    PhaseMatrix::from_dataset(dataset, |participant, phase, data| match data.sensor(kind) {
        Some(table) => count_covered_buckets(table, presence, width),
        None => {
            debug!("No {} data for {} in {}", kind, participant, phase);
            0
        }
    })
}

/// Raw row counts for one sensor type
pub fn row_count_matrix(dataset: &Dataset, kind: SensorKind) -> PhaseMatrix<usize> {
    PhaseMatrix::from_dataset(dataset, |_, _, data| data.sensor(kind).map_or(0, SensorTable::len))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCoverage {
    pub participant: ParticipantId,
    pub phase: ExposurePhase,
    pub date: NaiveDate,
    pub minutes: usize,
}

/// Distinct covered minutes per participant, phase and calendar day
pub fn daily_coverage(dataset: &Dataset, kind: SensorKind, presence: Channel) -> Vec<DailyCoverage> {
    let mut days = Vec::new();
    for (participant, data) in dataset {
        for (phase, phase_data) in data.phases() {
            let Some(table) = phase_data.sensor(kind) else {
                continue;
            };
            let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
            for bucket in qualifying_buckets(table, presence, BucketWidth::ONE_MINUTE) {
                *per_day.entry(bucket.date()).or_default() += 1;
            }
            days.extend(per_day.into_iter().map(|(date, minutes)| DailyCoverage {
                participant: participant.clone(),
                phase,
                date,
                minutes,
            }));
        }
    }
    days
}

/// Presence grid of one phase, indexed `[date][bin]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseLayer {
    pub phase: ExposurePhase,
    cells: Vec<Vec<bool>>,
}

impl PhaseLayer {
    pub fn is_present(&self, date_idx: usize, bin_idx: usize) -> bool {
        self.cells
            .get(date_idx)
            .and_then(|row| row.get(bin_idx))
            .copied()
            .unwrap_or(false)
    }

    /// `(date_idx, bin_idx)` of every present cell
    pub fn present_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().enumerate().flat_map(|(d, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, present)| **present)
                .map(move |(b, _)| (d, b))
        })
    }
}

/// Date × time-of-day coverage of one participant. Each phase with data gets
/// its own layer; layers are never reconciled into a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageHeatmap {
    pub participant: ParticipantId,
    pub dates: Vec<NaiveDate>,
    pub bins: Vec<NaiveTime>,
    pub layers: Vec<PhaseLayer>,
}

impl CoverageHeatmap {
    pub fn layer(&self, phase: ExposurePhase) -> Option<&PhaseLayer> {
        self.layers.iter().find(|layer| layer.phase == phase)
    }

    /// Whether `phase` has data in the bucket starting at `date` / `bin`.
    /// `None` when the phase has no layer or the cell is outside the grid.
    pub fn cell(&self, phase: ExposurePhase, date: NaiveDate, bin: NaiveTime) -> Option<bool> {
        let layer = self.layer(phase)?;
        let d = self.dates.iter().position(|x| *x == date)?;
        let b = self.bins.iter().position(|x| *x == bin)?;
        Some(layer.is_present(d, b))
    }
}

pub fn participant_heatmap(
    participant: &ParticipantId,
    data: &ParticipantData,
    kind: SensorKind,
    presence: Channel,
    width: BucketWidth,
) -> Option<CoverageHeatmap> {
    let buckets: Vec<(ExposurePhase, BTreeSet<NaiveDateTime>)> = data
        .phases()
        .filter_map(|(phase, phase_data)| {
            let buckets = qualifying_buckets(phase_data.sensor(kind)?, presence, width);
            (!buckets.is_empty()).then_some((phase, buckets))
        })
        .collect();

    // observed days only
    let dates: Vec<NaiveDate> = buckets
        .iter()
        .flat_map(|(_, b)| b.iter().map(NaiveDateTime::date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if dates.is_empty() {
        return None;
    }

    let bins = width.time_of_day_bins();
    let layers = buckets
        .into_iter()
        .map(|(phase, phase_buckets)| {
            let mut cells = vec![vec![false; bins.len()]; dates.len()];
            for bucket in phase_buckets {
                let Ok(d) = dates.binary_search(&bucket.date()) else {
                    continue;
                };
                let b = width.bin_index(bucket);
                if let Some(cell) = cells[d].get_mut(b) {
                    *cell = true;
                }
            }
            PhaseLayer { phase, cells }
        })
        .collect();

    Some(CoverageHeatmap {
        participant: participant.clone(),
        dates,
        bins,
        layers,
    })
}

/// Heatmaps for every participant with data; others are skipped with a notice
pub fn coverage_heatmaps(
    dataset: &Dataset,
    kind: SensorKind,
    presence: Channel,
    width: BucketWidth,
) -> Vec<CoverageHeatmap> {
    dataset
        .iter()
        .filter_map(|(participant, data)| {
            let heatmap = participant_heatmap(participant, data, kind, presence, width);
            if heatmap.is_none() {
                info!("No data available for {}", participant);
            }
            heatmap
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loading::SensorRow;

    fn ppg_table(rows: &[(&str, Option<f64>)]) -> SensorTable {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, (wall, ch0))| {
                let mut row = SensorRow::new(Some(i as i64), Some(*wall));
                row.set(Channel::PpgCh0, *ch0);
                row
            })
            .collect();
        SensorTable::from_rows(
            [
                SensorColumn::SensorClock,
                SensorColumn::PhoneDatetime,
                SensorColumn::Channel(Channel::PpgCh0),
            ],
            rows,
        )
    }

    fn at(s: &str) -> NaiveDateTime {
        parse_wall_clock(s).unwrap()
    }

    #[test]
    fn test_minute_coverage_scenario() {
        let table = ppg_table(&[
            ("2024-05-01T09:00:00", Some(1.0)),
            ("2024-05-01T09:00:30", Some(2.0)),
            ("2024-05-01T09:01:15", Some(3.0)),
        ]);
        assert_eq!(count_covered_buckets(&table, Channel::PpgCh0, BucketWidth::ONE_MINUTE), 2);
    }

    #[test]
    fn test_duplicates_within_bucket_count_once() {
        let table = ppg_table(&[
            ("2024-05-01T09:00:10", Some(1.0)),
            ("2024-05-01T09:00:10", Some(1.0)),
            ("2024-05-01T09:00:50", Some(1.0)),
            ("2024-05-01T09:05:00", Some(1.0)),
            ("2024-05-01T09:05:59.999", Some(1.0)),
        ]);
        assert_eq!(count_covered_buckets(&table, Channel::PpgCh0, BucketWidth::ONE_MINUTE), 2);
        assert_eq!(count_covered_buckets(&table, Channel::PpgCh0, BucketWidth::TEN_MINUTES), 1);
    }

    #[test]
    fn test_null_and_invalid_rows_give_zero() {
        let all_null = ppg_table(&[("2024-05-01T09:00:00", None), ("2024-05-01T09:01:00", None)]);
        assert_eq!(count_covered_buckets(&all_null, Channel::PpgCh0, BucketWidth::ONE_MINUTE), 0);

        let bad_clock = ppg_table(&[("not a time", Some(1.0))]);
        assert_eq!(count_covered_buckets(&bad_clock, Channel::PpgCh0, BucketWidth::ONE_MINUTE), 0);

        assert_eq!(count_covered_buckets(&ppg_table(&[]), Channel::PpgCh0, BucketWidth::ONE_MINUTE), 0);

        // presence column never present in the source files
        let table = ppg_table(&[("2024-05-01T09:00:00", Some(1.0))]);
        assert_eq!(count_covered_buckets(&table, Channel::PpgCh1, BucketWidth::ONE_MINUTE), 0);
    }

    #[test]
    fn test_nan_presence_is_not_a_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_PPG.txt");
        std::fs::write(
            &path,
            "Phone timestamp;sensor timestamp [ns];channel 0;channel 1;channel 2;ambient;\n\
             2024-05-01T09:00:00;100;NaN;1;2;3;\n\
             2024-05-01T09:05:00;200;nan;1;2;3;\n",
        )
        .unwrap();
        let table = crate::data_loading::read_sensor_file(&path).unwrap();
        assert_eq!(count_covered_buckets(&table, Channel::PpgCh0, BucketWidth::ONE_MINUTE), 0);
        assert_eq!(count_covered_buckets(&table, Channel::PpgCh1, BucketWidth::ONE_MINUTE), 2);

        let in_memory = ppg_table(&[("2024-05-01T09:00:00", Some(f64::NAN))]);
        assert_eq!(count_covered_buckets(&in_memory, Channel::PpgCh0, BucketWidth::ONE_MINUTE), 0);
    }

    #[test]
    fn test_wall_clock_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(parse_wall_clock("2024-05-01T09:00:00"), Some(expected));
        assert_eq!(parse_wall_clock("2024-05-01 09:00:00.250").map(|t| t.second()), Some(0));
        assert_eq!(parse_wall_clock("2024-05-01T09:00:00+02:00"), Some(expected));
        assert_eq!(parse_wall_clock("yesterday"), None);
    }

    #[test]
    fn test_bucket_floor() {
        let ten = BucketWidth::TEN_MINUTES;
        assert_eq!(ten.floor(at("2024-05-01T09:17:45.5")), at("2024-05-01T09:10:00"));
        assert_eq!(ten.buckets_per_day(), 144);
        assert_eq!(ten.time_of_day_bins()[1], NaiveTime::from_hms_opt(0, 10, 0).unwrap());
        assert_eq!(BucketWidth::minutes(0), Err(ConfigError::ZeroBucketWidth(0)));
    }

    #[test]
    fn test_coverage_matrix_absent_stream_is_zero() {
        let mut data = ParticipantData::default();
        data.pre.ppg = Some(ppg_table(&[("2024-05-01T09:00:00", Some(1.0))]));
        let mut dataset = Dataset::new();
        dataset.insert(ParticipantId::new("P1"), data);

        let matrix = coverage_matrix(&dataset, SensorKind::Ppg, Channel::PpgCh0, BucketWidth::ONE_MINUTE);
        let p1 = ParticipantId::new("P1");
        assert_eq!(matrix.get(&p1, ExposurePhase::Pre), Some(&1));
        assert_eq!(matrix.get(&p1, ExposurePhase::Intra), Some(&0));
        assert_eq!(matrix.get(&p1, ExposurePhase::Post), Some(&0));

        let rows = row_count_matrix(&dataset, SensorKind::Ppg);
        assert_eq!(rows.get(&p1, ExposurePhase::Pre), Some(&1));
    }

    #[test]
    fn test_heatmap_layers_are_independent() {
        let mut data = ParticipantData::default();
        data.pre.ppg = Some(ppg_table(&[("2024-05-01T09:03:00", Some(1.0))]));
        data.post.ppg = Some(ppg_table(&[
            ("2024-05-03T23:55:00", Some(1.0)),
            ("2024-05-01T09:09:59", Some(1.0)),
        ]));
        let p1 = ParticipantId::new("P1");

        let heatmap =
            participant_heatmap(&p1, &data, SensorKind::Ppg, Channel::PpgCh0, BucketWidth::TEN_MINUTES).unwrap();

        let may = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let late = NaiveTime::from_hms_opt(23, 50, 0).unwrap();

        // days without data are not rows of the grid
        assert_eq!(heatmap.dates, vec![may(1), may(3)]);
        assert_eq!(heatmap.bins.len(), 144);
        assert!(heatmap.layer(ExposurePhase::Intra).is_none());

        assert_eq!(heatmap.cell(ExposurePhase::Pre, may(1), nine), Some(true));
        assert_eq!(heatmap.cell(ExposurePhase::Post, may(1), nine), Some(true));
        assert_eq!(heatmap.cell(ExposurePhase::Pre, may(3), late), Some(false));
        assert_eq!(heatmap.cell(ExposurePhase::Post, may(3), late), Some(true));
        assert_eq!(heatmap.cell(ExposurePhase::Intra, may(1), nine), None);

        let post_cells: Vec<_> = heatmap.layer(ExposurePhase::Post).unwrap().present_cells().collect();
        assert_eq!(post_cells, vec![(0, 54), (1, 143)]);
    }

    #[test]
    fn test_stray_clock_does_not_widen_heatmap() {
        let mut data = ParticipantData::default();
        data.pre.ppg = Some(ppg_table(&[
            ("1970-01-01T00:00:05", Some(1.0)),
            ("2024-05-01T09:00:00", Some(1.0)),
        ]));
        let heatmap = participant_heatmap(
            &ParticipantId::new("P1"),
            &data,
            SensorKind::Ppg,
            Channel::PpgCh0,
            BucketWidth::TEN_MINUTES,
        )
        .unwrap();

        let dates: Vec<String> = heatmap.dates.iter().map(|d| d.to_string()).collect();
        assert_eq!(dates, vec!["1970-01-01", "2024-05-01"]);
        let cells: Vec<_> = heatmap.layer(ExposurePhase::Pre).unwrap().present_cells().collect();
        assert_eq!(cells, vec![(0, 0), (1, 54)]);
    }

    #[test]
    fn test_participants_without_data_are_skipped() {
        let mut with_data = ParticipantData::default();
        with_data.intra.ppg = Some(ppg_table(&[("2024-05-01T09:00:00", Some(1.0))]));
        let mut nulls_only = ParticipantData::default();
        nulls_only.pre.ppg = Some(ppg_table(&[("2024-05-01T09:00:00", None)]));

        let mut dataset = Dataset::new();
        dataset.insert(ParticipantId::new("P1"), with_data);
        dataset.insert(ParticipantId::new("P2"), nulls_only);
        dataset.insert(ParticipantId::new("P3"), ParticipantData::default());

        let heatmaps = coverage_heatmaps(&dataset, SensorKind::Ppg, Channel::PpgCh0, BucketWidth::TEN_MINUTES);
        assert_eq!(heatmaps.len(), 1);
        assert_eq!(heatmaps[0].participant, ParticipantId::new("P1"));
    }

    #[test]
    fn test_daily_coverage() {
        let mut data = ParticipantData::default();
        data.pre.ppg = Some(ppg_table(&[
            ("2024-05-01T09:00:00", Some(1.0)),
            ("2024-05-01T09:00:30", Some(1.0)),
            ("2024-05-01T10:00:00", Some(1.0)),
            ("2024-05-02T08:00:00", Some(1.0)),
        ]));
        let mut dataset = Dataset::new();
        dataset.insert(ParticipantId::new("P1"), data);

        let days = daily_coverage(&dataset, SensorKind::Ppg, Channel::PpgCh0);
        let minutes: Vec<_> = days.iter().map(|d| (d.date.to_string(), d.minutes)).collect();
        assert_eq!(minutes, vec![("2024-05-01".to_string(), 2), ("2024-05-02".to_string(), 1)]);
        assert!(days.iter().all(|d| d.phase == ExposurePhase::Pre));
    }
}
