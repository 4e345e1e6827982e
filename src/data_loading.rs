use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::{Dataset, ExposurePhase, ParticipantData, ParticipantId, PhaseData};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    HeartRate,
    Accelerometer,
    Ppg,
    Gyroscope,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::HeartRate,
        SensorKind::Accelerometer,
        SensorKind::Ppg,
        SensorKind::Gyroscope,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SensorKind::HeartRate => "hr",
            SensorKind::Accelerometer => "acc",
            SensorKind::Ppg => "ppg",
            SensorKind::Gyroscope => "gyro",
        }
    }

    /// Filename suffix written by the logger app for this stream
    pub fn file_suffix(self) -> &'static str {
        match self {
            SensorKind::HeartRate => "_HR.txt",
            SensorKind::Accelerometer => "_ACC.txt",
            SensorKind::Ppg => "_PPG.txt",
            SensorKind::Gyroscope => "_GYRO.txt",
        }
    }

    pub fn classify(file_name: &str) -> Option<SensorKind> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| file_name.ends_with(kind.file_suffix()))
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| format!("Invalid sensor type: {}. Use one of hr, acc, ppg, gyro", s))
    }
}

/// Numeric measurement columns across all sensor types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    AccX,
    AccY,
    AccZ,
    PpgCh0,
    PpgCh1,
    PpgCh2,
    PpgAmbient,
    HeartRate,
    GyroX,
    GyroY,
    GyroZ,
}

pub const CHANNEL_COUNT: usize = 11;

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::AccX,
        Channel::AccY,
        Channel::AccZ,
        Channel::PpgCh0,
        Channel::PpgCh1,
        Channel::PpgCh2,
        Channel::PpgAmbient,
        Channel::HeartRate,
        Channel::GyroX,
        Channel::GyroY,
        Channel::GyroZ,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Normalized column name
    pub fn name(self) -> &'static str {
        match self {
            Channel::AccX => "acc_x[mg]",
            Channel::AccY => "acc_y[mg]",
            Channel::AccZ => "acc_z[mg]",
            Channel::PpgCh0 => "ppg_ch0",
            Channel::PpgCh1 => "ppg_ch1",
            Channel::PpgCh2 => "ppg_ch2",
            Channel::PpgAmbient => "ppg_amb",
            Channel::HeartRate => "heart_rate[bpm]",
            Channel::GyroX => "gyro_x[dps]",
            Channel::GyroY => "gyro_y[dps]",
            Channel::GyroZ => "gyro_z[dps]",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.name() == s)
            .ok_or_else(|| format!("Unknown channel: {}", s))
    }
}

/// A column after header normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorColumn {
    SensorClock,
    PhoneDatetime,
    Channel(Channel),
}

impl SensorColumn {
    pub fn name(self) -> &'static str {
        match self {
            SensorColumn::SensorClock => "sensor_clock[ns]",
            SensorColumn::PhoneDatetime => "phone_datetime",
            SensorColumn::Channel(channel) => channel.name(),
        }
    }

    /// Maps a raw logger header to its normalized column
    pub fn from_header(header: &str) -> Option<SensorColumn> {
        let column = match header.trim() {
            "Phone timestamp" => SensorColumn::PhoneDatetime,
            "sensor timestamp [ns]" => SensorColumn::SensorClock,
            "X [mg]" => SensorColumn::Channel(Channel::AccX),
            "Y [mg]" => SensorColumn::Channel(Channel::AccY),
            "Z [mg]" => SensorColumn::Channel(Channel::AccZ),
            "channel 0" => SensorColumn::Channel(Channel::PpgCh0),
            "channel 1" => SensorColumn::Channel(Channel::PpgCh1),
            "channel 2" => SensorColumn::Channel(Channel::PpgCh2),
            "ambient" => SensorColumn::Channel(Channel::PpgAmbient),
            "HR [bpm]" => SensorColumn::Channel(Channel::HeartRate),
            "X [dps]" => SensorColumn::Channel(Channel::GyroX),
            "Y [dps]" => SensorColumn::Channel(Channel::GyroY),
            "Z [dps]" => SensorColumn::Channel(Channel::GyroZ),
            _ => return None,
        };
        Some(column)
    }
}

impl fmt::Display for SensorColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRow {
    pub sensor_clock: Option<i64>,
    pub phone_datetime: Option<String>,
    values: [Option<f64>; CHANNEL_COUNT],
}

impl SensorRow {
    pub fn new(sensor_clock: Option<i64>, phone_datetime: Option<&str>) -> Self {
        SensorRow {
            sensor_clock,
            phone_datetime: phone_datetime.map(str::to_owned),
            values: [None; CHANNEL_COUNT],
        }
    }

    pub fn with(mut self, channel: Channel, value: f64) -> Self {
        self.set(channel, Some(value));
        self
    }

    pub fn set(&mut self, channel: Channel, value: Option<f64>) {
        self.values[channel.index()] = value;
    }

    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.values[channel.index()]
    }
}

/// Rows contributed by one raw file, in load order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub first_row: usize,
    pub row_count: usize,
}

/// Concatenated readings of one sensor for one participant and phase.
///
/// `columns` holds the normalized columns that appeared in any source header,
/// so a stream whose files never carried e.g. `ppg_amb` can be told apart from
/// one where the values happen to be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorTable {
    columns: BTreeSet<SensorColumn>,
    rows: Vec<SensorRow>,
    sources: Vec<SourceFile>,
}

impl SensorTable {
    pub fn from_rows(columns: impl IntoIterator<Item = SensorColumn>, rows: Vec<SensorRow>) -> Self {
        SensorTable {
            columns: columns.into_iter().collect(),
            rows,
            sources: Vec::new(),
        }
    }

    pub fn columns(&self) -> &BTreeSet<SensorColumn> {
        &self.columns
    }

    pub fn has_column(&self, column: SensorColumn) -> bool {
        self.columns.contains(&column)
    }

    /// Required columns absent from this table, in the order given
    pub fn missing_columns(&self, required: &[SensorColumn]) -> Vec<SensorColumn> {
        required
            .iter()
            .copied()
            .filter(|column| !self.has_column(*column))
            .collect()
    }

    pub fn rows(&self) -> &[SensorRow] {
        &self.rows
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Non-null sensor clock values, in row order
    pub fn sensor_clocks(&self) -> Vec<i64> {
        self.rows.iter().filter_map(|row| row.sensor_clock).collect()
    }

    /// Rows of each source file, in load order
    pub fn source_rows(&self) -> impl Iterator<Item = (&SourceFile, &[SensorRow])> {
        self.sources.iter().map(move |source| {
            let end = (source.first_row + source.row_count).min(self.rows.len());
            let start = source.first_row.min(end);
            (source, &self.rows[start..end])
        })
    }

    /// Appends another table; the column set becomes the union of both
    pub fn extend(&mut self, other: SensorTable) {
        let offset = self.rows.len();
        self.columns.extend(other.columns);
        self.sources
            .extend(other.sources.into_iter().map(|source| SourceFile {
                first_row: source.first_row + offset,
                ..source
            }));
        self.rows.extend(other.rows);
    }
}

/// A numeric cell; `NaN` and infinities are missing readings
fn parse_reading(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses one `;`-delimited logger file, normalizing its headers
pub fn read_sensor_file(path: &Path) -> Result<SensorTable, LoadError> {
    let csv_error = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true) // logger lines end with a trailing separator
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let layout: Vec<Option<SensorColumn>> = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|header| {
            let column = SensorColumn::from_header(header);
            if column.is_none() && !header.is_empty() {
                debug!("Ignoring column '{}' in {}", header, path.display());
            }
            column
        })
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let mut row = SensorRow::new(None, None);

        for (field, column) in record.iter().zip(&layout) {
            if field.is_empty() {
                continue;
            }
            match column {
                Some(SensorColumn::SensorClock) => row.sensor_clock = field.parse().ok(),
                Some(SensorColumn::PhoneDatetime) => row.phone_datetime = Some(field.to_owned()),
                Some(SensorColumn::Channel(channel)) => row.set(*channel, parse_reading(field)),
                None => {}
            }
        }
        rows.push(row);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(SensorTable {
        columns: layout.into_iter().flatten().collect(),
        sources: vec![SourceFile {
            name,
            first_row: 0,
            row_count: rows.len(),
        }],
        rows,
    })
}

/// Discovers and parses `<root>/<participant>/<phase>/<file>`
pub struct DataLoader {
    config: LoaderConfig,
}

impl DataLoader {
    pub fn new(config: LoaderConfig) -> Self {
        DataLoader { config }
    }

    /// Participant directories under the data root, sorted by name
    pub fn participants(&self) -> Result<Vec<ParticipantId>, LoadError> {
        let root = &self.config.data_root;
        if !root.is_dir() {
            return Err(LoadError::MissingRoot(root.clone()));
        }

        let mut participants = Vec::new();
        for entry in sorted_entries(root) {
            let entry = entry.map_err(|source| LoadError::Walk {
                path: root.clone(),
                source,
            })?;
            if entry.file_type().is_dir() {
                participants.push(ParticipantId::new(entry.file_name().to_string_lossy()));
            }
        }
        Ok(participants)
    }

    pub fn load_participant(&self, participant: &ParticipantId) -> Result<ParticipantData, LoadError> {
        let mut data = ParticipantData::default();

        for phase in ExposurePhase::ALL {
            let phase_path = self
                .config
                .data_root
                .join(participant.as_str())
                .join(phase.dir_name());
            if !phase_path.is_dir() {
                warn!("Missing category: {} for {}", phase.dir_name(), participant);
                continue;
            }
            *data.phase_mut(phase) = self.load_phase(&phase_path)?;
        }

        Ok(data)
    }

    fn load_phase(&self, phase_path: &Path) -> Result<PhaseData, LoadError> {
        let mut phase = PhaseData::default();

        for entry in sorted_entries(phase_path) {
            let entry = entry.map_err(|source| LoadError::Walk {
                path: phase_path.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            debug!("Checking file: {}", entry.path().display());
            let Some(kind) = SensorKind::classify(&file_name) else {
                debug!("Skipping unrecognised file: {}", file_name);
                continue;
            };

            let table = read_sensor_file(entry.path())?;
            info!("File matched pattern {}: {} ({} rows)", kind, file_name, table.len());
            phase.append(kind, table);
        }

        Ok(phase)
    }

    pub fn load_all(&self) -> Result<Dataset, LoadError> {
        let mut dataset = Dataset::new();
        for participant in self.participants()? {
            info!("Loading data for: {}", participant);
            let data = self.load_participant(&participant)?;
            dataset.insert(participant, data);
        }
        Ok(dataset)
    }
}

fn sorted_entries(dir: &Path) -> walkdir::IntoIter {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
}
