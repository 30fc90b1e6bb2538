use aim_schema::{Pattern, PatternPoint, PLAYFIELD_HEIGHT, PLAYFIELD_WIDTH};
use glam::DVec2;
use tracing::debug;

use crate::error::PatternError;

/// A per-step parameter: one value for every step, or a list reused cyclically.
#[derive(Debug, Clone, PartialEq)]
pub enum Cyclic {
    Scalar(f64),
    Sequence(Vec<f64>),
}

impl Cyclic {
    /// Value for step `i`, wrapping around shorter sequences.
    /// Only called once `validate` has ruled out an empty sequence.
    pub(crate) fn at(&self, i: usize) -> f64 {
        match self {
            Cyclic::Scalar(v) => *v,
            Cyclic::Sequence(values) => values[i % values.len()],
        }
    }

    fn validate(&self, name: &'static str) -> Result<(), PatternError> {
        let all_finite = match self {
            Cyclic::Scalar(v) => v.is_finite(),
            Cyclic::Sequence(values) => {
                if values.is_empty() {
                    return Err(PatternError::invalid(name, "sequence is empty"));
                }
                values.iter().all(|v| v.is_finite())
            }
        };
        if !all_finite {
            return Err(PatternError::invalid(name, "values must be finite"));
        }
        Ok(())
    }
}

impl From<f64> for Cyclic {
    fn from(value: f64) -> Self {
        Cyclic::Scalar(value)
    }
}

impl From<Vec<f64>> for Cyclic {
    fn from(values: Vec<f64>) -> Self {
        Cyclic::Sequence(values)
    }
}

impl From<&[f64]> for Cyclic {
    fn from(values: &[f64]) -> Self {
        Cyclic::Sequence(values.to_vec())
    }
}

/// Builds a jump pattern and repeats it back and forth in place.
///
/// Starting at the origin with heading `initial_angle`, each step moves by
/// `distances[i]` along the heading, then turns the heading by `angles[i]`.
/// The path is centred on the playfield, mirrored about its last point
/// `n_repeats - 1` times and clamped into the playfield. Angles are degrees,
/// `time_deltas` are seconds between consecutive notes.
///
/// Positions are rounded to whole pixels like the host stores them.
/// `clipped` reports whether any position had to be clamped.
pub fn generate_pattern(
    initial_angle: f64,
    distances: impl Into<Cyclic>,
    time_deltas: impl Into<Cyclic>,
    angles: impl Into<Cyclic>,
    n_points: usize,
    n_repeats: usize,
) -> Result<Pattern, PatternError> {
    let distances = distances.into();
    let time_deltas = time_deltas.into();
    let angles = angles.into();

    if n_points < 2 {
        return Err(PatternError::invalid(
            "n_points",
            format!("need at least 2 points, got {n_points}"),
        ));
    }
    if n_repeats < 1 {
        return Err(PatternError::invalid("n_repeats", "need at least 1 repeat"));
    }
    if !initial_angle.is_finite() {
        return Err(PatternError::invalid("initial_angle", "must be finite"));
    }
    distances.validate("distances")?;
    time_deltas.validate("time_deltas")?;
    angles.validate("angles")?;

    let mut pos = DVec2::ZERO;
    let mut dir = DVec2::from_angle(initial_angle.to_radians());
    let mut path = Vec::with_capacity(n_points);
    let mut deltas = Vec::with_capacity(n_points - 1);
    path.push(pos);

    for i in 0..n_points - 1 {
        pos += dir * distances.at(i);
        deltas.push(time_deltas.at(i));
        dir = DVec2::from_angle(angles.at(i).to_radians()).rotate(dir);
        path.push(pos);
    }

    let centroid = path.iter().fold(DVec2::ZERO, |acc, p| acc + *p) / n_points as f64;
    let bounds = DVec2::new(PLAYFIELD_WIDTH, PLAYFIELD_HEIGHT);
    let shift = bounds / 2.0 - centroid;

    let total = n_points * n_repeats;
    let mut points = Vec::with_capacity(total);
    let mut clipped = false;
    let mut t = 0.0;

    for i in 0..total {
        if i > 0 {
            t += deltas[symmetric_index(i - 1, deltas.len())];
        }

        let p = path[reflect_index(i, n_points)] + shift;
        let clamped = p.clamp(DVec2::ZERO, bounds);
        if clamped != p {
            clipped = true;
        }
        let q = clamped.round();
        points.push(PatternPoint { x: q.x, y: q.y, t });
    }

    if clipped {
        debug!(n_points, n_repeats, initial_angle, "pattern clamped into playfield");
    }

    Ok(Pattern { points, clipped })
}

/// Index into `len` items when mirroring about the last item, excluding it
/// from the mirror (`a b c` -> `a b c b a b c ...`).
fn reflect_index(i: usize, len: usize) -> usize {
    let period = 2 * (len - 1);
    let m = i % period;
    if m < len {
        m
    } else {
        period - m
    }
}

/// Index into `len` items when mirroring with the edge item repeated
/// (`a b` -> `a b b a a b ...`).
fn symmetric_index(i: usize, len: usize) -> usize {
    let period = 2 * len;
    let m = i % period;
    if m < len {
        m
    } else {
        period - 1 - m
    }
}
