//! Aim precision measurement core.
//!
//! Generates drilling patterns, turns a captured trial into direction-corrected
//! offsets, files the resulting deviations in a versioned store and fits models
//! over slices of that store. Everything here is synchronous and deterministic;
//! waiting for a capture is the caller's business.

pub mod config;
pub mod deviation;
pub mod error;
pub mod pattern;
pub mod regression;
pub mod report;
pub mod rules;
pub mod scoring;
pub mod session;
pub mod store;

pub use config::{ExtractConfig, HitWindows, TrialParams};
pub use deviation::{
    extract_offsets, extract_offsets_from_score, Diagnostics, OffsetSample, RawOffset,
    TrialOffsets, TrialStats,
};
pub use error::{FitError, PatternError, Rejection, StoreError, TrialError};
pub use pattern::{generate_pattern, Cyclic};
pub use regression::{exp_fit, linear_confidence, linear_fit, r_squared, ExpFit, LinearConfidence, LinearFit};
pub use report::{
    angle_report, average_by, bpm_report, notes_report, velocity_report, DevAxis, Model, Series,
    SeriesPoint,
};
pub use scoring::{score_trial, HitPoint, ScoreEntry, ScoreMachine};
pub use session::{SessionSignal, SessionState, SignalQueue, TrialOutcome, TrialSession};
pub use store::{
    data_file_name, data_file_path, AxisAverages, MeasurementStore, Selection, SharedStore,
    StoreRegistry,
};
