use aim_schema::{ParamKey, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::pattern::generate_pattern;
use crate::rules;

/// Accepted press offsets around a note, both as positive magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitWindows {
    pub early_ms: f64,
    pub late_ms: f64,
}

impl Default for HitWindows {
    fn default() -> Self {
        // Outermost window at OD 0.
        Self {
            early_ms: 200.0,
            late_ms: 200.0,
        }
    }
}

/// Everything extraction needs, passed in explicitly per trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub hit_radius: f64,
    pub approach_window_ms: f64,
    pub hit_windows: HitWindows,

    /// Trials with a larger miss ratio are rejected.
    pub max_miss_ratio: f64,
    pub angle_tolerance_deg: f64,
    pub spacing_tolerance_px: f64,

    // Geometry under test.
    pub test_spacing: f64,
    pub test_angle: f64,
    pub note_count: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            hit_radius: rules::cs_to_hit_radius(4.0),
            approach_window_ms: rules::ar_to_ms(8.0),
            hit_windows: HitWindows::default(),
            max_miss_ratio: 0.1,
            angle_tolerance_deg: 3.0,
            spacing_tolerance_px: 3.0,
            test_spacing: 100.0,
            test_angle: 90.0,
            note_count: 3,
        }
    }
}

impl ExtractConfig {
    /// Angle and spacing gating is meaningless for stationary or two-note patterns.
    pub fn accepts_any_angle(&self) -> bool {
        self.test_spacing == 0.0 || self.note_count == 2
    }
}

/// Parameters of one drilling trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialParams {
    pub bpm: f64,
    pub spacing: f64,
    /// Interior angle between the incoming and outgoing jump, degrees.
    pub angle: f64,
    /// Heading of the first jump, degrees.
    pub rotation: f64,
    pub note_count: u32,
    pub repeats: u32,
    pub cs: f64,
    pub ar: f64,
    /// Added to `bpm` after every recorded trial.
    pub bpm_step: Option<f64>,
}

impl Default for TrialParams {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            spacing: 100.0,
            angle: 90.0,
            rotation: 0.0,
            note_count: 3,
            repeats: 20,
            cs: 4.0,
            ar: 8.0,
            bpm_step: None,
        }
    }
}

impl TrialParams {
    pub fn key(&self) -> ParamKey {
        ParamKey {
            bpm: self.bpm,
            spacing: self.spacing,
            angle: self.angle,
            rotation: self.rotation,
            note_count: self.note_count,
        }
    }

    pub fn pattern(&self) -> Result<Pattern, PatternError> {
        if !(self.bpm > 0.0) {
            return Err(PatternError::invalid("bpm", format!("must be > 0, got {}", self.bpm)));
        }
        generate_pattern(
            self.rotation,
            self.spacing,
            rules::bpm_to_interval_ms(self.bpm) / 1000.0,
            180.0 - self.angle,
            self.note_count as usize,
            self.repeats as usize,
        )
    }

    /// Derives the per-trial extraction config, keeping `base`'s windows and tolerances.
    pub fn extract_config(&self, base: &ExtractConfig) -> ExtractConfig {
        ExtractConfig {
            hit_radius: rules::cs_to_hit_radius(self.cs),
            approach_window_ms: rules::ar_to_ms(self.ar),
            test_spacing: self.spacing,
            test_angle: self.angle,
            note_count: self.note_count,
            ..*base
        }
    }

    pub fn next(&self) -> Self {
        match self.bpm_step {
            Some(step) => Self {
                bpm: self.bpm + step,
                ..*self
            },
            None => *self,
        }
    }
}
