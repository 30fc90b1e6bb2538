use serde::{Deserialize, Serialize};

pub type Milliseconds = f64;

pub const PLAYFIELD_WIDTH: f64 = 512.0;
pub const PLAYFIELD_HEIGHT: f64 = 384.0;

/// Version written into the header of every persisted measurement table.
pub const SCHEMA_VERSION: u32 = 3;

/// A generated pattern note. `t` is seconds from pattern start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatternPoint {
    pub x: f64,
    pub y: f64,
    pub t: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    pub points: Vec<PatternPoint>,
    /// Set when any coordinate had to be clamped into the playfield.
    pub clipped: bool,
}

impl Pattern {
    pub fn to_map_notes(&self) -> Vec<MapNote> {
        self.points
            .iter()
            .map(|p| MapNote {
                time_ms: p.t * 1000.0,
                x: p.x,
                y: p.y,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MapNote {
    pub time_ms: Milliseconds,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    #[default]
    Free,
    Press,
    Hold,
    Release,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReplayFrame {
    pub time_ms: Milliseconds,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub k1: ButtonState,
    #[serde(default)]
    pub k2: ButtonState,
    #[serde(default)]
    pub m1: ButtonState,
    #[serde(default)]
    pub m2: ButtonState,
}

impl ReplayFrame {
    /// True when any key or mouse button went down on this frame.
    pub fn is_press(&self) -> bool {
        [self.k1, self.k2, self.m1, self.m2]
            .iter()
            .any(|b| *b == ButtonState::Press)
    }
}

/// Pattern parameters a measurement is filed under. Compared exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParamKey {
    pub bpm: f64,
    pub spacing: f64,
    pub angle: f64,
    pub rotation: f64,
    pub note_count: u32,
}

impl ParamKey {
    pub fn is_finite(&self) -> bool {
        self.bpm.is_finite()
            && self.spacing.is_finite()
            && self.angle.is_finite()
            && self.rotation.is_finite()
    }

    /// Cursor velocity the pattern asks for, in px/s.
    pub fn velocity(&self) -> f64 {
        self.spacing * self.bpm / 60.0
    }
}

/// Legacy row layout, written before timing deviation was recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordV1 {
    pub stddev_x: f64,
    pub stddev_y: f64,
    pub key: ParamKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordV2 {
    pub stddev_x: f64,
    pub stddev_y: f64,
    pub stddev_t: f64,
    pub key: ParamKey,
}

/// Current row layout: deviations plus the mean offsets of the trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordV3 {
    pub stddev_x: f64,
    pub stddev_y: f64,
    pub stddev_t: f64,
    pub avg_x: f64,
    pub avg_y: f64,
    pub avg_t: f64,
    pub key: ParamKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "version")]
pub enum StoredRecord {
    #[serde(rename = "v1")]
    V1(RecordV1),

    #[serde(rename = "v2")]
    V2(RecordV2),

    #[serde(rename = "v3")]
    V3(RecordV3),
}

/// Mean aim and timing offsets of a trial, same axes as the deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanOffsets {
    pub x: f64,
    pub y: f64,
    pub t: f64,
}

impl MeanOffsets {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.t.is_finite()
    }
}

/// In-memory view of a measurement row, independent of its stored layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRecord {
    pub key: ParamKey,
    pub stddev_x: f64,
    pub stddev_y: f64,
    /// `None` for rows migrated from the v1 layout.
    pub stddev_t: Option<f64>,
    /// `None` for rows written before means were kept.
    pub means: Option<MeanOffsets>,
}

impl MeasurementRecord {
    /// Combined aim deviation used to rank trials.
    pub fn combined(&self) -> f64 {
        (self.stddev_x * self.stddev_x + self.stddev_y * self.stddev_y).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.key.is_finite()
            && self.stddev_x.is_finite()
            && self.stddev_y.is_finite()
            && self.stddev_t.map_or(true, f64::is_finite)
            && self.means.map_or(true, |m| m.is_finite())
    }
}

impl From<StoredRecord> for MeasurementRecord {
    fn from(record: StoredRecord) -> Self {
        match record {
            StoredRecord::V1(r) => Self {
                key: r.key,
                stddev_x: r.stddev_x,
                stddev_y: r.stddev_y,
                stddev_t: None,
                means: None,
            },
            StoredRecord::V2(r) => Self {
                key: r.key,
                stddev_x: r.stddev_x,
                stddev_y: r.stddev_y,
                stddev_t: Some(r.stddev_t),
                means: None,
            },
            StoredRecord::V3(r) => Self {
                key: r.key,
                stddev_x: r.stddev_x,
                stddev_y: r.stddev_y,
                stddev_t: Some(r.stddev_t),
                means: Some(MeanOffsets {
                    x: r.avg_x,
                    y: r.avg_y,
                    t: r.avg_t,
                }),
            },
        }
    }
}

/// Picks the oldest layout that holds every field the record carries.
/// Means without timing deviation cannot be stored and are dropped.
impl From<&MeasurementRecord> for StoredRecord {
    fn from(record: &MeasurementRecord) -> Self {
        match (record.stddev_t, record.means) {
            (Some(stddev_t), Some(means)) => StoredRecord::V3(RecordV3 {
                stddev_x: record.stddev_x,
                stddev_y: record.stddev_y,
                stddev_t,
                avg_x: means.x,
                avg_y: means.y,
                avg_t: means.t,
                key: record.key,
            }),
            (Some(stddev_t), None) => StoredRecord::V2(RecordV2 {
                stddev_x: record.stddev_x,
                stddev_y: record.stddev_y,
                stddev_t,
                key: record.key,
            }),
            (None, _) => StoredRecord::V1(RecordV1 {
                stddev_x: record.stddev_x,
                stddev_y: record.stddev_y,
                key: record.key,
            }),
        }
    }
}

/// On-disk measurement table for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementTable {
    pub schema_version: u32,
    pub user_id: u64,
    #[serde(default)]
    pub records: Vec<StoredRecord>,
}

impl MeasurementTable {
    pub fn new(user_id: u64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            user_id,
            records: Vec::new(),
        }
    }
}
