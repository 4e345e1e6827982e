use crate::data_loading::{Channel, SensorColumn, SensorKind, SensorRow, SensorTable};
use crate::{Dataset, PhaseData, PhaseMatrix};
use log::{debug, warn};
use polars::prelude::{
    col, Column, DataFrame, IntoLazy, JoinArgs, JoinCoalesce, JoinType, PolarsResult, SortMultipleOptions,
};
use std::fmt;

/// Join key shared by both streams
pub const SENSOR_CLOCK: &str = "sensor_clock[ns]";

const ACC_COLUMNS: [SensorColumn; 5] = [
    SensorColumn::SensorClock,
    SensorColumn::PhoneDatetime,
    SensorColumn::Channel(Channel::AccX),
    SensorColumn::Channel(Channel::AccY),
    SensorColumn::Channel(Channel::AccZ),
];

const PPG_COLUMNS: [SensorColumn; 6] = [
    SensorColumn::SensorClock,
    SensorColumn::PhoneDatetime,
    SensorColumn::Channel(Channel::PpgCh0),
    SensorColumn::Channel(Channel::PpgCh1),
    SensorColumn::Channel(Channel::PpgCh2),
    SensorColumn::Channel(Channel::PpgAmbient),
];

/// A stream taking part in the merge and the columns it must carry
pub struct MergeStream {
    pub kind: SensorKind,
    prefix: &'static str,
    pub required: &'static [SensorColumn],
}

pub const ACCELEROMETER_STREAM: MergeStream = MergeStream {
    kind: SensorKind::Accelerometer,
    prefix: "acc",
    required: &ACC_COLUMNS,
};

pub const PPG_STREAM: MergeStream = MergeStream {
    kind: SensorKind::Ppg,
    prefix: "ppg",
    required: &PPG_COLUMNS,
};

impl MergeStream {
    /// Output name of a column; wall clocks keep their stream prefix so both
    /// survive the join
    pub fn frame_column_name(&self, column: SensorColumn) -> String {
        match column {
            SensorColumn::PhoneDatetime => format!("{}_{}", self.prefix, column.name()),
            other => other.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unusable {
    Absent,
    Empty,
    MissingColumns(Vec<SensorColumn>),
}

impl fmt::Display for Unusable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unusable::Absent => write!(f, "no data"),
            Unusable::Empty => write!(f, "no rows"),
            Unusable::MissingColumns(columns) => {
                let names: Vec<&str> = columns.iter().map(|c| c.name()).collect();
                write!(f, "missing columns {}", names.join(", "))
            }
        }
    }
}

/// Outcome of checking a stream before the merge
#[derive(Debug, Clone, PartialEq)]
pub enum StreamCheck<'a> {
    Usable(&'a SensorTable),
    Unusable(Unusable),
}

pub fn validate_stream<'a>(table: Option<&'a SensorTable>, required: &[SensorColumn]) -> StreamCheck<'a> {
    let Some(table) = table else {
        return StreamCheck::Unusable(Unusable::Absent);
    };
    if table.is_empty() {
        return StreamCheck::Unusable(Unusable::Empty);
    }
    let missing = table.missing_columns(required);
    if !missing.is_empty() {
        return StreamCheck::Unusable(Unusable::MissingColumns(missing));
    }
    StreamCheck::Usable(table)
}

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Merged(DataFrame),
    NoData,
}

impl MergeOutcome {
    pub fn frame(&self) -> Option<&DataFrame> {
        match self {
            MergeOutcome::Merged(frame) => Some(frame),
            MergeOutcome::NoData => None,
        }
    }
}

fn usable_stream<'a>(data: &'a PhaseData, stream: &MergeStream) -> Option<&'a SensorTable> {
    match validate_stream(data.sensor(stream.kind), stream.required) {
        StreamCheck::Usable(table) => Some(table),
        StreamCheck::Unusable(Unusable::Absent) => {
            debug!("No {} stream to merge", stream.kind);
            None
        }
        StreamCheck::Unusable(reason) => {
            warn!("{} data is not usable for merging: {}", stream.kind, reason);
            None
        }
    }
}

/// Builds the frame for one stream. Rows without a sensor clock cannot be
/// joined and are left out.
pub fn stream_frame(table: &SensorTable, stream: &MergeStream) -> PolarsResult<DataFrame> {
    let rows: Vec<&SensorRow> = table.rows().iter().filter(|r| r.sensor_clock.is_some()).collect();
    if rows.len() < table.len() {
        debug!(
            "Dropping {} {} rows without a sensor clock",
            table.len() - rows.len(),
            stream.kind
        );
    }

    let columns = stream
        .required
        .iter()
        .map(|column| {
            let name = stream.frame_column_name(*column);
            match column {
                SensorColumn::SensorClock => {
                    let clocks: Vec<i64> = rows.iter().filter_map(|r| r.sensor_clock).collect();
                    Column::new(name.into(), clocks)
                }
                SensorColumn::PhoneDatetime => {
                    let wall: Vec<Option<String>> = rows.iter().map(|r| r.phone_datetime.clone()).collect();
                    Column::new(name.into(), wall)
                }
                SensorColumn::Channel(channel) => {
                    let values: Vec<Option<f64>> = rows.iter().map(|r| r.value(*channel)).collect();
                    Column::new(name.into(), values)
                }
            }
        })
        .collect();

    DataFrame::new(columns)
}

fn sort_by_clock(frame: DataFrame) -> PolarsResult<DataFrame> {
    frame.sort([SENSOR_CLOCK], SortMultipleOptions::default().with_maintain_order(true))
}

/// Full outer join on exact sensor-clock equality, no resampling
pub fn join_on_sensor_clock(left: DataFrame, right: DataFrame) -> PolarsResult<DataFrame> {
    left.lazy()
        .join(
            right.lazy(),
            [col(SENSOR_CLOCK)],
            [col(SENSOR_CLOCK)],
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .sort([SENSOR_CLOCK], SortMultipleOptions::default().with_maintain_order(true))
        .collect()
}

/// Aligns the accelerometer and PPG streams of one phase.
///
/// Streams missing a required column are treated as absent. With one usable
/// stream the result is that stream alone; with none, `NoData`.
pub fn merge_phase(data: &PhaseData) -> PolarsResult<MergeOutcome> {
    let acc = usable_stream(data, &ACCELEROMETER_STREAM);
    let ppg = usable_stream(data, &PPG_STREAM);

    let frame = match (acc, ppg) {
        (Some(acc), Some(ppg)) => join_on_sensor_clock(
            stream_frame(acc, &ACCELEROMETER_STREAM)?,
            stream_frame(ppg, &PPG_STREAM)?,
        )?,
        (Some(acc), None) => sort_by_clock(stream_frame(acc, &ACCELEROMETER_STREAM)?)?,
        (None, Some(ppg)) => sort_by_clock(stream_frame(ppg, &PPG_STREAM)?)?,
        (None, None) => return Ok(MergeOutcome::NoData),
    };
    Ok(MergeOutcome::Merged(frame))
}

pub fn merge_dataset(dataset: &Dataset) -> PolarsResult<PhaseMatrix<MergeOutcome>> {
    PhaseMatrix::try_from_dataset(dataset, |participant, phase, data| {
        let outcome = merge_phase(data)?;
        match outcome.frame() {
            Some(frame) => debug!("Merged {} / {}: {} rows", participant, phase, frame.height()),
            None => warn!("No mergeable data for {} / {}", participant, phase),
        }
        Ok(outcome)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc_table(clocks: &[i64]) -> SensorTable {
        let rows = clocks
            .iter()
            .map(|c| {
                SensorRow::new(Some(*c), Some("2024-05-01T09:00:00"))
                    .with(Channel::AccX, 1.0)
                    .with(Channel::AccY, 2.0)
                    .with(Channel::AccZ, 3.0)
            })
            .collect();
        SensorTable::from_rows(ACC_COLUMNS, rows)
    }

    fn ppg_table(clocks: &[i64]) -> SensorTable {
        let rows = clocks
            .iter()
            .map(|c| {
                SensorRow::new(Some(*c), Some("2024-05-01T09:00:00"))
                    .with(Channel::PpgCh0, 10.0)
                    .with(Channel::PpgCh1, 11.0)
                    .with(Channel::PpgCh2, 12.0)
                    .with(Channel::PpgAmbient, 13.0)
            })
            .collect();
        SensorTable::from_rows(PPG_COLUMNS, rows)
    }

    fn clocks(frame: &DataFrame) -> Vec<Option<i64>> {
        frame
            .column(SENSOR_CLOCK)
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_disjoint_merge_keeps_every_row() {
        let data = PhaseData {
            accelerometer: Some(acc_table(&[100, 300])),
            ppg: Some(ppg_table(&[600, 200, 400])),
            ..Default::default()
        };

        let outcome = merge_phase(&data).unwrap();
        let frame = outcome.frame().unwrap();

        assert_eq!(frame.height(), 5);
        assert_eq!(clocks(frame), vec![Some(100), Some(200), Some(300), Some(400), Some(600)]);
        assert_eq!(frame.column("acc_x[mg]").unwrap().null_count(), 3);
        assert_eq!(frame.column("acc_phone_datetime").unwrap().null_count(), 3);
        assert_eq!(frame.column("ppg_ch0").unwrap().null_count(), 2);
        assert_eq!(frame.column("ppg_amb").unwrap().null_count(), 2);
    }

    #[test]
    fn test_shared_timestamps_align() {
        let data = PhaseData {
            accelerometer: Some(acc_table(&[100, 200])),
            ppg: Some(ppg_table(&[200, 300])),
            ..Default::default()
        };

        let outcome = merge_phase(&data).unwrap();
        let frame = outcome.frame().unwrap();

        assert_eq!(frame.height(), 3);
        assert_eq!(clocks(frame), vec![Some(100), Some(200), Some(300)]);
        assert_eq!(frame.column("acc_z[mg]").unwrap().null_count(), 1);
        assert_eq!(frame.column("ppg_ch2").unwrap().null_count(), 1);
    }

    #[test]
    fn test_stream_missing_column_is_treated_as_absent() {
        let full_ppg = ppg_table(&[200, 400]);
        let broken_ppg = SensorTable::from_rows(
            PPG_COLUMNS.into_iter().filter(|c| *c != SensorColumn::Channel(Channel::PpgAmbient)),
            full_ppg.rows().to_vec(),
        );

        let with_broken = PhaseData {
            accelerometer: Some(acc_table(&[300, 100])),
            ppg: Some(broken_ppg),
            ..Default::default()
        };
        let without = PhaseData {
            accelerometer: Some(acc_table(&[300, 100])),
            ..Default::default()
        };

        let a = merge_phase(&with_broken).unwrap();
        let b = merge_phase(&without).unwrap();
        let (a, b) = (a.frame().unwrap(), b.frame().unwrap());
        assert!(a.equals_missing(b));
        assert_eq!(clocks(a), vec![Some(100), Some(300)]);
        assert!(a.column("ppg_ch0").is_err());
    }

    #[test]
    fn test_ppg_alone() {
        let data = PhaseData {
            ppg: Some(ppg_table(&[5, 1])),
            ..Default::default()
        };
        let outcome = merge_phase(&data).unwrap();
        let frame = outcome.frame().unwrap();
        assert_eq!(clocks(frame), vec![Some(1), Some(5)]);
        assert!(frame.column("ppg_phone_datetime").is_ok());
        assert!(frame.column("acc_x[mg]").is_err());
    }

    #[test]
    fn test_no_usable_stream() {
        assert!(matches!(merge_phase(&PhaseData::default()).unwrap(), MergeOutcome::NoData));

        let empty = PhaseData {
            accelerometer: Some(SensorTable::from_rows(ACC_COLUMNS, Vec::new())),
            ..Default::default()
        };
        assert!(matches!(merge_phase(&empty).unwrap(), MergeOutcome::NoData));
    }

    #[test]
    fn test_validate_stream_reasons() {
        let table = SensorTable::from_rows(
            [SensorColumn::SensorClock, SensorColumn::Channel(Channel::AccX)],
            vec![SensorRow::new(Some(1), None)],
        );
        assert_eq!(
            validate_stream(Some(&table), &ACC_COLUMNS),
            StreamCheck::Unusable(Unusable::MissingColumns(vec![
                SensorColumn::PhoneDatetime,
                SensorColumn::Channel(Channel::AccY),
                SensorColumn::Channel(Channel::AccZ),
            ]))
        );
        assert_eq!(validate_stream(None, &ACC_COLUMNS), StreamCheck::Unusable(Unusable::Absent));
        let ok = acc_table(&[1]);
        assert_eq!(validate_stream(Some(&ok), &ACC_COLUMNS), StreamCheck::Usable(&ok));
    }

    #[test]
    fn test_rows_without_clock_are_dropped() {
        let mut table = acc_table(&[10, 20]);
        table.extend(SensorTable::from_rows(
            ACC_COLUMNS,
            vec![SensorRow::new(None, Some("2024-05-01T09:00:01")).with(Channel::AccX, 1.0)],
        ));
        let frame = stream_frame(&table, &ACCELEROMETER_STREAM).unwrap();
        assert_eq!(frame.height(), 2);
    }
}
