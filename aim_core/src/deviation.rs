use aim_schema::{MapNote, ReplayFrame};
use glam::DVec2;
use tracing::{debug, info};

use crate::config::ExtractConfig;
use crate::error::Rejection;
use crate::scoring::{score_trial, ScoreEntry};

/// Aim and timing error for one matched note.
///
/// `aim_dx` runs along the jump into the note, `aim_dy` across it.
/// `tap_dt` is the signed press offset in ms (positive = late).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSample {
    pub note_index: usize,
    pub aim_dx: f64,
    pub aim_dy: f64,
    pub tap_dt: f64,
}

/// Offset of a hit in screen coordinates, before direction correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawOffset {
    pub note_index: usize,
    pub dx: f64,
    pub dy: f64,
    pub dt: f64,
}

/// Population statistics over a trial's accepted samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialStats {
    pub stddev_x: f64,
    pub stddev_y: f64,
    pub stddev_t: f64,
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_t: f64,
    pub count: usize,
}

impl TrialStats {
    pub fn from_samples(samples: &[OffsetSample]) -> Self {
        let (mean_x, stddev_x) = mean_std(samples.iter().map(|s| s.aim_dx));
        let (mean_y, stddev_y) = mean_std(samples.iter().map(|s| s.aim_dy));
        let (mean_t, stddev_t) = mean_std(samples.iter().map(|s| s.tap_dt));
        Self {
            stddev_x,
            stddev_y,
            stddev_t,
            mean_x,
            mean_y,
            mean_t,
            count: samples.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialOffsets {
    pub samples: Vec<OffsetSample>,
    pub stats: TrialStats,
    pub misses: usize,
    pub total: usize,
}

/// Intermediate arrays surfaced when nothing survives gating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Screen-space offsets of every hit note.
    pub raw: Vec<RawOffset>,
    /// Direction-corrected offsets before angle/spacing gating.
    pub local: Vec<OffsetSample>,
    /// Interior angle at each corrected note, degrees.
    pub angles: Vec<f64>,
    /// Length of the jump into each corrected note.
    pub spacings: Vec<f64>,
}

/// Scores a capture against its map and extracts direction-corrected offsets.
pub fn extract_offsets(
    map: &[MapNote],
    replay: &[ReplayFrame],
    config: &ExtractConfig,
) -> Result<TrialOffsets, Rejection> {
    let score = score_trial(map, replay, config);
    extract_offsets_from_score(&score, config)
}

/// Same as [`extract_offsets`] for a score table produced elsewhere.
///
/// `score` must hold one entry per map note, in map order.
pub fn extract_offsets_from_score(
    score: &[ScoreEntry],
    config: &ExtractConfig,
) -> Result<TrialOffsets, Rejection> {
    let total = score.len();
    if total == 0 {
        return Err(Rejection::NoMatchingSamples {
            diagnostics: Box::default(),
        });
    }

    let misses = score.iter().filter(|e| e.is_miss()).count();
    if misses as f64 / total as f64 > config.max_miss_ratio {
        debug!(misses, total, max_ratio = config.max_miss_ratio, "trial rejected: too many misses");
        return Err(Rejection::TooManyMisses { misses, total });
    }

    let mut diagnostics = Diagnostics::default();
    for entry in score {
        if let Some(hit) = entry.hit {
            diagnostics.raw.push(RawOffset {
                note_index: entry.note_index,
                dx: hit.x - entry.map_x,
                dy: hit.y - entry.map_y,
                dt: hit.time_ms - entry.map_t,
            });
        }
    }

    let target_angle = interior_angle_deg(config.test_angle);
    let any_angle = config.accepts_any_angle();
    let mut samples = Vec::new();

    // First and last notes lack an incoming or outgoing jump.
    for i in 1..total.saturating_sub(1) {
        let entry = &score[i];
        let Some(hit) = entry.hit else {
            continue;
        };

        let incoming = entry.map_pos() - score[i - 1].map_pos();
        let outgoing = score[i + 1].map_pos() - entry.map_pos();

        let raw = DVec2::new(hit.x - entry.map_x, hit.y - entry.map_y);
        let theta_map = incoming.y.atan2(incoming.x);
        let theta_hit = raw.y.atan2(raw.x);
        let mag = raw.length();

        let sample = OffsetSample {
            note_index: entry.note_index,
            aim_dx: mag * (theta_map - theta_hit).cos(),
            aim_dy: mag * (theta_map - theta_hit).sin(),
            tap_dt: hit.time_ms - entry.map_t,
        };

        let angle = (-incoming).perp_dot(outgoing).atan2((-incoming).dot(outgoing)).abs().to_degrees();
        let spacing = incoming.length();

        diagnostics.local.push(sample);
        diagnostics.angles.push(angle);
        diagnostics.spacings.push(spacing);

        let angle_ok = any_angle || (angle - target_angle).abs() <= config.angle_tolerance_deg;
        let spacing_ok = (spacing - config.test_spacing).abs() <= config.spacing_tolerance_px;
        let finite = sample.aim_dx.is_finite() && sample.aim_dy.is_finite() && sample.tap_dt.is_finite();

        if angle_ok && spacing_ok && finite {
            samples.push(sample);
        }
    }

    if samples.is_empty() {
        debug!(
            raw = ?diagnostics.raw,
            angles = ?diagnostics.angles,
            spacings = ?diagnostics.spacings,
            target_angle,
            target_spacing = config.test_spacing,
            "trial rejected: no samples matched geometry"
        );
        return Err(Rejection::NoMatchingSamples {
            diagnostics: Box::new(diagnostics),
        });
    }

    let stats = TrialStats::from_samples(&samples);
    info!(
        samples = stats.count,
        misses,
        total,
        stddev_x = stats.stddev_x,
        stddev_y = stats.stddev_y,
        stddev_t = stats.stddev_t,
        "trial accepted"
    );

    Ok(TrialOffsets {
        samples,
        stats,
        misses,
        total,
    })
}

/// Folds any angle in degrees onto the 0..=180 range of interior angles.
fn interior_angle_deg(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a > 180.0 {
        360.0 - a
    } else {
        a
    }
}

fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::HitPoint;

    fn entry(i: usize, x: f64, y: f64, hit: Option<(f64, f64, f64)>) -> ScoreEntry {
        ScoreEntry {
            note_index: i,
            map_x: x,
            map_y: y,
            map_t: i as f64 * 500.0,
            hit: hit.map(|(dx, dy, dt)| HitPoint {
                x: x + dx,
                y: y + dy,
                time_ms: i as f64 * 500.0 + dt,
            }),
        }
    }

    #[test]
    fn straight_line_offsets_split_along_and_across() {
        let score = [
            entry(0, 0.0, 0.0, Some((0.0, 0.0, 0.0))),
            entry(1, 100.0, 0.0, Some((5.0, 3.0, 12.0))),
            entry(2, 200.0, 0.0, Some((0.0, 0.0, 0.0))),
        ];
        let cfg = ExtractConfig {
            test_spacing: 100.0,
            test_angle: 180.0,
            ..ExtractConfig::default()
        };

        let out = extract_offsets_from_score(&score, &cfg).unwrap();
        assert_eq!(out.samples.len(), 1);
        let s = out.samples[0];
        assert_eq!(s.note_index, 1);
        assert!((s.aim_dx - 5.0).abs() < 1e-9);
        assert!((s.aim_dy + 3.0).abs() < 1e-9);
        assert_eq!(s.tap_dt, 12.0);
    }

    #[test]
    fn reversal_points_are_gated_out() {
        // Back and forth on three points: the middle one has the test angle,
        // the ends reverse direction.
        let xs = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (100.0, 0.0), (0.0, 0.0)];
        let score: Vec<ScoreEntry> = xs
            .iter()
            .enumerate()
            .map(|(i, (x, y))| entry(i, *x, *y, Some((1.0, 1.0, 0.0))))
            .collect();
        let cfg = ExtractConfig {
            test_spacing: 100.0,
            test_angle: 90.0,
            ..ExtractConfig::default()
        };

        let out = extract_offsets_from_score(&score, &cfg).unwrap();
        let indices: Vec<usize> = out.samples.iter().map(|s| s.note_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    fn square_walk(broken: &[usize]) -> Vec<ScoreEntry> {
        let xs = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (100.0, 0.0), (0.0, 0.0)];
        xs.iter()
            .enumerate()
            .map(|(i, (x, y))| {
                let mut e = entry(i, *x, *y, Some((1.0, 1.0, 4.0)));
                if broken.contains(&i) {
                    if let Some(hit) = e.hit.as_mut() {
                        hit.time_ms = f64::INFINITY;
                    }
                }
                e
            })
            .collect()
    }

    fn right_angle_config() -> ExtractConfig {
        ExtractConfig {
            test_spacing: 100.0,
            test_angle: 90.0,
            ..ExtractConfig::default()
        }
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        let out = extract_offsets_from_score(&square_walk(&[3]), &right_angle_config()).unwrap();
        let indices: Vec<usize> = out.samples.iter().map(|s| s.note_index).collect();
        assert_eq!(indices, vec![1]);
        assert_eq!(out.stats.count, 1);
        assert_eq!(out.stats.mean_t, 4.0);
        assert!(out.stats.stddev_x.is_finite());
        assert!(out.stats.stddev_t.is_finite());
    }

    #[test]
    fn only_non_finite_samples_is_no_match() {
        let Err(Rejection::NoMatchingSamples { diagnostics }) =
            extract_offsets_from_score(&square_walk(&[1, 3]), &right_angle_config())
        else {
            panic!("expected NoMatchingSamples");
        };
        // The scrubbed samples are still reported.
        let broken: Vec<usize> = diagnostics
            .local
            .iter()
            .filter(|s| !s.tap_dt.is_finite())
            .map(|s| s.note_index)
            .collect();
        assert_eq!(broken, vec![1, 3]);
        assert!(diagnostics.raw.iter().any(|r| r.dt == f64::INFINITY));
    }

    #[test]
    fn mismatched_geometry_surfaces_diagnostics() {
        let xs = [(0.0, 0.0), (100.0, 0.0), (200.0, 0.0), (300.0, 0.0)];
        let score: Vec<ScoreEntry> = xs
            .iter()
            .enumerate()
            .map(|(i, (x, y))| entry(i, *x, *y, Some((2.0, 0.0, 5.0))))
            .collect();
        let cfg = ExtractConfig {
            test_spacing: 100.0,
            test_angle: 60.0,
            ..ExtractConfig::default()
        };

        let Err(Rejection::NoMatchingSamples { diagnostics }) = extract_offsets_from_score(&score, &cfg) else {
            panic!("expected NoMatchingSamples");
        };
        assert_eq!(diagnostics.raw.len(), 4);
        assert_eq!(diagnostics.local.len(), 2);
        assert!(diagnostics.angles.iter().all(|a| (a - 180.0).abs() < 1e-9));
        assert!(diagnostics.spacings.iter().all(|s| (s - 100.0).abs() < 1e-9));
    }

    #[test]
    fn two_note_patterns_accept_any_angle() {
        let xs = [(0.0, 0.0), (100.0, 0.0), (0.0, 0.0), (100.0, 0.0)];
        let score: Vec<ScoreEntry> = xs
            .iter()
            .enumerate()
            .map(|(i, (x, y))| entry(i, *x, *y, Some((1.0, 0.0, 0.0))))
            .collect();
        let cfg = ExtractConfig {
            test_spacing: 100.0,
            test_angle: 45.0,
            note_count: 2,
            ..ExtractConfig::default()
        };

        let out = extract_offsets_from_score(&score, &cfg).unwrap();
        assert_eq!(out.samples.len(), 2);
    }

    #[test]
    fn zero_spacing_keeps_samples_with_undefined_heading() {
        let score: Vec<ScoreEntry> = (0..5)
            .map(|i| entry(i, 256.0, 192.0, Some((3.0, 4.0, 1.0))))
            .collect();
        let cfg = ExtractConfig {
            test_spacing: 0.0,
            test_angle: 90.0,
            ..ExtractConfig::default()
        };

        let out = extract_offsets_from_score(&score, &cfg).unwrap();
        assert_eq!(out.samples.len(), 3);
        assert!((out.samples[0].aim_dx.hypot(out.samples[0].aim_dy) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_score_is_rejected() {
        assert!(matches!(
            extract_offsets_from_score(&[], &ExtractConfig::default()),
            Err(Rejection::NoMatchingSamples { .. })
        ));
    }

    #[test]
    fn interior_angle_folding() {
        assert_eq!(interior_angle_deg(90.0), 90.0);
        assert_eq!(interior_angle_deg(270.0), 90.0);
        assert_eq!(interior_angle_deg(-30.0), 30.0);
        assert_eq!(interior_angle_deg(360.0), 0.0);
    }

    #[test]
    fn population_statistics() {
        let (mean, std) = mean_std([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter());
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
    }
}
