//! Difficulty-to-geometry conversions for the host game. The rest of the core
//! treats their outputs as opaque calibration constants.

/// Approach rate to preempt time in milliseconds.
pub fn ar_to_ms(ar: f64) -> f64 {
    if ar <= 5.0 {
        1800.0 - 120.0 * ar
    } else {
        1950.0 - 150.0 * ar
    }
}

pub fn ms_to_ar(ms: f64) -> f64 {
    if ms >= 1200.0 {
        (1800.0 - ms) / 120.0
    } else {
        (1950.0 - ms) / 150.0
    }
}

/// Circle size to circle diameter in playfield pixels.
pub fn cs_to_px(cs: f64) -> f64 {
    109.0 - 9.0 * cs
}

pub fn cs_to_hit_radius(cs: f64) -> f64 {
    cs_to_px(cs) / 2.0
}

/// Approach circle size `dt` ms before the note is due.
pub fn approach_circle_to_radius(cs_px: f64, ar_ms: f64, dt: f64) -> f64 {
    cs_px * (1.0 + 3.0 * dt / ar_ms)
}

/// One note per beat.
pub fn bpm_to_interval_ms(bpm: f64) -> f64 {
    60_000.0 / bpm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ar_conversion_is_piecewise_and_invertible() {
        assert_eq!(ar_to_ms(5.0), 1200.0);
        assert_eq!(ar_to_ms(9.0), 600.0);
        assert_eq!(ar_to_ms(0.0), 1800.0);

        for ar in [0.0, 2.5, 5.0, 7.0, 10.0] {
            assert!((ms_to_ar(ar_to_ms(ar)) - ar).abs() < 1e-12);
        }
    }

    #[test]
    fn circle_size_to_pixels() {
        assert_eq!(cs_to_px(4.0), 73.0);
        assert_eq!(cs_to_hit_radius(4.0), 36.5);
    }

    #[test]
    fn approach_circle_shrinks_to_note_size() {
        assert_eq!(approach_circle_to_radius(73.0, 600.0, 0.0), 73.0);
        assert_eq!(approach_circle_to_radius(73.0, 600.0, 600.0), 292.0);
    }

    #[test]
    fn bpm_interval() {
        assert_eq!(bpm_to_interval_ms(120.0), 500.0);
    }
}
