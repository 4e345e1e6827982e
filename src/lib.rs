pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod data_loading;
pub mod error;
pub mod output;
pub mod preprocessing;
pub mod sample_rate;

use data_loading::{SensorKind, SensorTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Subject identifier, taken from the participant directory name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExposurePhase {
    Pre,
    Intra,
    Post,
}

impl ExposurePhase {
    pub const ALL: [ExposurePhase; 3] = [
        ExposurePhase::Pre,
        ExposurePhase::Intra,
        ExposurePhase::Post,
    ];

    /// Directory name under each participant
    pub fn dir_name(self) -> &'static str {
        match self {
            ExposurePhase::Pre => "pre_heat_exposure",
            ExposurePhase::Intra => "intra_heat_exposure",
            ExposurePhase::Post => "post_heat_exposure",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExposurePhase::Pre => "pre",
            ExposurePhase::Intra => "intra",
            ExposurePhase::Post => "post",
        }
    }

    fn index(self) -> usize {
        match self {
            ExposurePhase::Pre => 0,
            ExposurePhase::Intra => 1,
            ExposurePhase::Post => 2,
        }
    }
}

impl fmt::Display for ExposurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sensor tables recorded during one exposure phase. A sensor with no
/// matching files stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseData {
    pub heart_rate: Option<SensorTable>,
    pub accelerometer: Option<SensorTable>,
    pub ppg: Option<SensorTable>,
    pub gyroscope: Option<SensorTable>,
}

impl PhaseData {
    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorTable> {
        match kind {
            SensorKind::HeartRate => self.heart_rate.as_ref(),
            SensorKind::Accelerometer => self.accelerometer.as_ref(),
            SensorKind::Ppg => self.ppg.as_ref(),
            SensorKind::Gyroscope => self.gyroscope.as_ref(),
        }
    }

    pub fn sensor_mut(&mut self, kind: SensorKind) -> &mut Option<SensorTable> {
        match kind {
            SensorKind::HeartRate => &mut self.heart_rate,
            SensorKind::Accelerometer => &mut self.accelerometer,
            SensorKind::Ppg => &mut self.ppg,
            SensorKind::Gyroscope => &mut self.gyroscope,
        }
    }

    /// Appends a parsed file to the table for `kind`, creating it if needed
    pub fn append(&mut self, kind: SensorKind, table: SensorTable) {
        let slot = self.sensor_mut(kind);
        if let Some(existing) = slot.as_mut() {
            existing.extend(table);
        } else {
            *slot = Some(table);
        }
    }

    pub fn is_empty(&self) -> bool {
        SensorKind::ALL
            .iter()
            .all(|kind| self.sensor(*kind).map_or(true, |t| t.is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantData {
    pub pre: PhaseData,
    pub intra: PhaseData,
    pub post: PhaseData,
}

impl ParticipantData {
    pub fn phase(&self, phase: ExposurePhase) -> &PhaseData {
        match phase {
            ExposurePhase::Pre => &self.pre,
            ExposurePhase::Intra => &self.intra,
            ExposurePhase::Post => &self.post,
        }
    }

    pub fn phase_mut(&mut self, phase: ExposurePhase) -> &mut PhaseData {
        match phase {
            ExposurePhase::Pre => &mut self.pre,
            ExposurePhase::Intra => &mut self.intra,
            ExposurePhase::Post => &mut self.post,
        }
    }

    pub fn phases(&self) -> impl Iterator<Item = (ExposurePhase, &PhaseData)> {
        ExposurePhase::ALL.into_iter().map(|p| (p, self.phase(p)))
    }
}

/// Everything loaded from the data root, keyed by participant
pub type Dataset = BTreeMap<ParticipantId, ParticipantData>;

/// One value per participant and exposure phase, the shape shared by the
/// rate, coverage and row-count summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMatrix<T> {
    rows: BTreeMap<ParticipantId, [T; 3]>,
}

impl<T> PhaseMatrix<T> {
    /// Evaluates `cell` for every participant and phase of the dataset
    pub fn from_dataset<F>(dataset: &Dataset, mut cell: F) -> Self
    where
        F: FnMut(&ParticipantId, ExposurePhase, &PhaseData) -> T,
    {
        let rows = dataset
            .iter()
            .map(|(participant, data)| {
                let values = ExposurePhase::ALL.map(|phase| cell(participant, phase, data.phase(phase)));
                (participant.clone(), values)
            })
            .collect();
        PhaseMatrix { rows }
    }

    /// Like [`PhaseMatrix::from_dataset`], stopping at the first error
    pub fn try_from_dataset<E, F>(dataset: &Dataset, mut cell: F) -> Result<Self, E>
    where
        F: FnMut(&ParticipantId, ExposurePhase, &PhaseData) -> Result<T, E>,
    {
        let mut rows = BTreeMap::new();
        for (participant, data) in dataset {
            let values = [
                cell(participant, ExposurePhase::Pre, &data.pre)?,
                cell(participant, ExposurePhase::Intra, &data.intra)?,
                cell(participant, ExposurePhase::Post, &data.post)?,
            ];
            rows.insert(participant.clone(), values);
        }
        Ok(PhaseMatrix { rows })
    }

    pub fn get(&self, participant: &ParticipantId, phase: ExposurePhase) -> Option<&T> {
        self.rows.get(participant).map(|values| &values[phase.index()])
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &[T; 3])> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> PhaseMatrix<U> {
        PhaseMatrix {
            rows: self
                .rows
                .iter()
                .map(|(participant, values)| (participant.clone(), [f(&values[0]), f(&values[1]), f(&values[2])]))
                .collect(),
        }
    }
}
