use std::{
    collections::HashMap,
    fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    sync::Arc,
};

use aim_schema::{
    MeanOffsets, MeasurementRecord, MeasurementTable, ParamKey, StoredRecord, SCHEMA_VERSION,
};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::deviation::TrialStats;
use crate::error::StoreError;

/// Inclusive parameter ranges used to slice the store. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub bpm: Option<RangeInclusive<f64>>,
    pub spacing: Option<RangeInclusive<f64>>,
    pub angle: Option<RangeInclusive<f64>>,
    pub rotation: Option<RangeInclusive<f64>>,
    pub note_count: Option<RangeInclusive<u32>>,
}

impl Selection {
    pub fn matches(&self, key: &ParamKey) -> bool {
        fn within<T: PartialOrd>(range: &Option<RangeInclusive<T>>, value: &T) -> bool {
            range.as_ref().map_or(true, |r| r.contains(value))
        }

        within(&self.bpm, &key.bpm)
            && within(&self.spacing, &key.spacing)
            && within(&self.angle, &key.angle)
            && within(&self.rotation, &key.rotation)
            && within(&self.note_count, &key.note_count)
    }
}

/// Mean of the best N values, each axis ranked on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisAverages {
    pub x: f64,
    pub y: f64,
    /// `None` when no matching record carries timing deviation.
    pub t: Option<f64>,
}

/// Append-only table of trial measurements for one user.
///
/// Rows are never updated in place. Several rows may share a key; `best` and
/// `average_best_n` decide at read time how to collapse them.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementStore {
    user_id: u64,
    records: Vec<MeasurementRecord>,
}

impl MeasurementStore {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            records: Vec::new(),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn append(
        &mut self,
        key: ParamKey,
        stddev_x: f64,
        stddev_y: f64,
        stddev_t: f64,
    ) -> Result<(), StoreError> {
        self.append_record(MeasurementRecord {
            key,
            stddev_x,
            stddev_y,
            stddev_t: Some(stddev_t),
            means: None,
        })
    }

    /// Records an accepted trial with its deviations and mean offsets.
    pub fn append_trial(&mut self, key: ParamKey, stats: &TrialStats) -> Result<(), StoreError> {
        self.append_record(MeasurementRecord {
            key,
            stddev_x: stats.stddev_x,
            stddev_y: stats.stddev_y,
            stddev_t: Some(stats.stddev_t),
            means: Some(MeanOffsets {
                x: stats.mean_x,
                y: stats.mean_y,
                t: stats.mean_t,
            }),
        })
    }

    /// Appends a row; rows with non-finite numbers are refused.
    pub fn append_record(&mut self, record: MeasurementRecord) -> Result<(), StoreError> {
        if !record.is_finite() {
            return Err(StoreError::NonFinite {
                stddev_x: record.stddev_x,
                stddev_y: record.stddev_y,
                stddev_t: record.stddev_t,
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn query(&self, key: &ParamKey) -> Vec<MeasurementRecord> {
        self.records.iter().filter(|r| r.key == *key).copied().collect()
    }

    pub fn select(&self, selection: &Selection) -> Vec<MeasurementRecord> {
        self.records
            .iter()
            .filter(|r| selection.matches(&r.key))
            .copied()
            .collect()
    }

    /// Record with the lowest combined aim deviation.
    pub fn best(&self, key: &ParamKey) -> Option<MeasurementRecord> {
        self.records
            .iter()
            .filter(|r| r.key == *key)
            .min_by(|a, b| a.combined().total_cmp(&b.combined()))
            .copied()
    }

    /// Per axis, the mean of the `n` lowest deviations recorded under `key`.
    ///
    /// Biased slightly optimistic by construction; it trades that for
    /// resistance to the occasional bad trial.
    pub fn average_best_n(&self, key: &ParamKey, n: usize) -> Option<AxisAverages> {
        if n == 0 {
            return None;
        }
        let matching = self.query(key);
        if matching.is_empty() {
            return None;
        }

        let x = mean_of_lowest(matching.iter().map(|r| r.stddev_x).collect(), n)?;
        let y = mean_of_lowest(matching.iter().map(|r| r.stddev_y).collect(), n)?;
        let t = mean_of_lowest(matching.iter().filter_map(|r| r.stddev_t).collect(), n);
        Some(AxisAverages { x, y, t })
    }

    pub fn from_table(table: MeasurementTable) -> Result<Self, StoreError> {
        if table.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: table.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        let mut store = Self::new(table.user_id);
        for stored in table.records {
            store.append_record(MeasurementRecord::from(stored))?;
        }
        Ok(store)
    }

    pub fn to_table(&self) -> MeasurementTable {
        MeasurementTable {
            schema_version: SCHEMA_VERSION,
            user_id: self.user_id,
            records: self.records.iter().map(StoredRecord::from).collect(),
        }
    }

    /// Loads the table at `path`, or an empty store for `user_id` if there is none yet.
    pub fn load(path: impl AsRef<Path>, user_id: u64) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), user_id, "no measurement table yet, starting empty");
                return Ok(Self::new(user_id));
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let table: MeasurementTable = serde_json::from_slice(&bytes)?;
        if table.user_id != user_id {
            warn!(expected = user_id, found = table.user_id, "measurement table belongs to another user id");
        }
        if table.schema_version < SCHEMA_VERSION {
            info!(from = table.schema_version, to = SCHEMA_VERSION, "upgrading measurement table schema");
        }
        Self::from_table(table)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.to_table())?;
        fs::write(path, json).map_err(io_err)?;

        info!(path = %path.display(), records = self.records.len(), "measurement table saved");
        Ok(())
    }
}

fn mean_of_lowest(mut values: Vec<f64>, n: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let take = n.min(values.len());
    Some(values[..take].iter().sum::<f64>() / take as f64)
}

/// File name of the measurement table for `user_id`.
pub fn data_file_name(user_id: u64) -> String {
    format!("stdev_data_{user_id}.json")
}

pub fn data_file_path(dir: impl AsRef<Path>, user_id: u64) -> PathBuf {
    dir.as_ref().join(data_file_name(user_id))
}

pub type SharedStore = Arc<Mutex<MeasurementStore>>;

/// Hands out one shared store per user id. Appends through a handle are
/// serialised by that user's lock.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<u64, SharedStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, user_id: u64) -> SharedStore {
        self.stores
            .lock()
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(MeasurementStore::new(user_id))))
            .clone()
    }

    /// Registers a loaded store, replacing any handle for the same user.
    pub fn insert(&self, store: MeasurementStore) -> SharedStore {
        let handle = Arc::new(Mutex::new(store));
        let user_id = handle.lock().user_id();
        self.stores.lock().insert(user_id, handle.clone());
        handle
    }

    pub fn get(&self, user_id: u64) -> Option<SharedStore> {
        self.stores.lock().get(&user_id).cloned()
    }
}
