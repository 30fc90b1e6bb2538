use aim_schema::MeasurementRecord;
use tracing::{debug, info};

use crate::error::FitError;
use crate::regression::{
    exp_fit, linear_confidence, linear_fit, r_squared, ExpFit, LinearConfidence, LinearFit,
};

/// Which per-trial statistic a report plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevAxis {
    X,
    Y,
    /// `sqrt(x² + y²)`
    XY,
    T,
    /// Mean offsets rather than spread.
    AvgX,
    AvgY,
    AvgT,
}

impl DevAxis {
    /// `None` when the record predates the statistic.
    pub fn value(self, record: &MeasurementRecord) -> Option<f64> {
        match self {
            DevAxis::X => Some(record.stddev_x),
            DevAxis::Y => Some(record.stddev_y),
            DevAxis::XY => Some(record.combined()),
            DevAxis::T => record.stddev_t,
            DevAxis::AvgX => record.means.map(|m| m.x),
            DevAxis::AvgY => record.means.map(|m| m.y),
            DevAxis::AvgT => record.means.map(|m| m.t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Model {
    Linear {
        fit: LinearFit,
        /// Missing when there are too few points for a band.
        confidence: Option<LinearConfidence>,
    },
    Exponential {
        fit: ExpFit,
        r_squared: Option<f64>,
    },
}

/// One plotted series. When `model` is an error, show `points` alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Value shared by every record in the series (angle, bpm or spacing).
    pub group: f64,
    pub points: Vec<SeriesPoint>,
    pub model: Result<Model, FitError>,
}

/// Groups `records` by `group_of`, keeps the `best_n` lowest values of
/// `axis` per group and averages them. Points come back sorted by x.
pub fn average_by(
    records: &[MeasurementRecord],
    group_of: impl Fn(&MeasurementRecord) -> f64,
    axis: DevAxis,
    best_n: usize,
) -> Vec<SeriesPoint> {
    if best_n == 0 {
        return Vec::new();
    }
    let pairs: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| axis.value(r).map(|v| (group_of(r), v)))
        .collect();

    distinct(pairs.iter().map(|p| p.0))
        .into_iter()
        .map(|x| {
            let mut ys: Vec<f64> = pairs.iter().filter(|p| p.0 == x).map(|p| p.1).collect();
            ys.sort_by(f64::total_cmp);
            ys.truncate(best_n);
            SeriesPoint {
                x,
                y: ys.iter().sum::<f64>() / ys.len() as f64,
            }
        })
        .collect()
}

/// Deviation against cursor velocity (px/s), one series per angle.
///
/// Every record is its own point; a two-centroid line is fitted per series.
pub fn velocity_report(records: &[MeasurementRecord], axis: DevAxis) -> Vec<Series> {
    distinct(records.iter().map(|r| r.key.angle))
        .into_iter()
        .map(|angle| {
            let mut points: Vec<SeriesPoint> = records
                .iter()
                .filter(|r| r.key.angle == angle)
                .filter_map(|r| {
                    axis.value(r).map(|y| SeriesPoint {
                        x: r.key.velocity(),
                        y,
                    })
                })
                .collect();
            points.sort_by(|a, b| a.x.total_cmp(&b.x));

            let (x, y) = unzip(&points);
            let model = linear_fit(&x, &y).map(|fit| Model::Linear {
                fit,
                confidence: linear_confidence(&fit, &x, &y).ok(),
            });
            log_model("velocity", angle, points.len(), &model);

            Series {
                group: angle,
                points,
                model,
            }
        })
        .collect()
}

/// Deviation against angle, one series per bpm, averaging the best
/// `best_n` trials at each angle before the exponential fit.
pub fn angle_report(records: &[MeasurementRecord], axis: DevAxis, best_n: usize) -> Vec<Series> {
    distinct(records.iter().map(|r| r.key.bpm))
        .into_iter()
        .map(|bpm| {
            let slice: Vec<MeasurementRecord> =
                records.iter().filter(|r| r.key.bpm == bpm).copied().collect();
            let points = average_by(&slice, |r| r.key.angle, axis, best_n);

            let (x, y) = unzip(&points);
            let model = exp_fit(&x, &y).map(|fit| {
                let y_model: Vec<f64> = x.iter().map(|v| fit.predict(*v)).collect();
                Model::Exponential {
                    fit,
                    r_squared: r_squared(&y, &y_model),
                }
            });
            log_model("angle", bpm, points.len(), &model);

            Series {
                group: bpm,
                points,
                model,
            }
        })
        .collect()
}

/// Deviation against bpm, one series per spacing. The best `best_n` trials
/// at each bpm are averaged before the line is fitted.
pub fn bpm_report(records: &[MeasurementRecord], axis: DevAxis, best_n: usize) -> Vec<Series> {
    distinct(records.iter().map(|r| r.key.spacing))
        .into_iter()
        .map(|spacing| {
            let slice: Vec<MeasurementRecord> = records
                .iter()
                .filter(|r| r.key.spacing == spacing)
                .copied()
                .collect();
            let points = average_by(&slice, |r| r.key.bpm, axis, best_n);

            let (x, y) = unzip(&points);
            let model = linear_fit(&x, &y).map(|fit| Model::Linear {
                fit,
                confidence: linear_confidence(&fit, &x, &y).ok(),
            });
            log_model("bpm", spacing, points.len(), &model);

            Series {
                group: spacing,
                points,
                model,
            }
        })
        .collect()
}

/// Mean of every selected trial per note count. No model is fitted.
pub fn notes_report(records: &[MeasurementRecord], axis: DevAxis) -> Vec<SeriesPoint> {
    let points = average_by(records, |r| f64::from(r.key.note_count), axis, usize::MAX);
    debug!(n = points.len(), "note count points");
    points
}

fn log_model(kind: &str, group: f64, n: usize, model: &Result<Model, FitError>) {
    match model {
        Ok(Model::Linear { fit, confidence }) => info!(
            kind,
            group,
            n,
            slope = fit.slope,
            intercept = fit.intercept,
            slope_se_95 = confidence.map(|c| c.slope_se_95),
            "linear fit"
        ),
        Ok(Model::Exponential { fit, r_squared }) => info!(
            kind,
            group,
            n,
            a = fit.a,
            b = fit.b,
            c = fit.c,
            r_squared,
            "exponential fit"
        ),
        Err(e) => debug!(kind, group, n, error = %e, "no model, raw points only"),
    }
}

fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

fn unzip(points: &[SeriesPoint]) -> (Vec<f64>, Vec<f64>) {
    points.iter().map(|p| (p.x, p.y)).unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_schema::{MeanOffsets, ParamKey};

    fn record(bpm: f64, angle: f64, sx: f64, st: Option<f64>) -> MeasurementRecord {
        MeasurementRecord {
            key: ParamKey {
                bpm,
                spacing: 100.0,
                angle,
                rotation: 0.0,
                note_count: 3,
            },
            stddev_x: sx,
            stddev_y: 0.0,
            stddev_t: st,
            means: None,
        }
    }

    #[test]
    fn axis_values() {
        let r = MeasurementRecord {
            stddev_y: 4.0,
            ..record(120.0, 90.0, 3.0, None)
        };
        assert_eq!(DevAxis::X.value(&r), Some(3.0));
        assert_eq!(DevAxis::XY.value(&r), Some(5.0));
        assert_eq!(DevAxis::T.value(&r), None);
        assert_eq!(DevAxis::AvgX.value(&r), None);

        let r = MeasurementRecord {
            means: Some(MeanOffsets { x: -2.0, y: 0.5, t: 7.0 }),
            ..r
        };
        assert_eq!(DevAxis::AvgX.value(&r), Some(-2.0));
        assert_eq!(DevAxis::AvgY.value(&r), Some(0.5));
        assert_eq!(DevAxis::AvgT.value(&r), Some(7.0));
    }

    #[test]
    fn average_by_keeps_best_n_per_group() {
        let records = [
            record(120.0, 90.0, 10.0, None),
            record(120.0, 30.0, 2.0, None),
            record(120.0, 90.0, 1.0, None),
            record(120.0, 90.0, 2.0, None),
            record(120.0, 90.0, 3.0, None),
        ];
        let points = average_by(&records, |r| r.key.angle, DevAxis::X, 2);
        assert_eq!(
            points,
            vec![SeriesPoint { x: 30.0, y: 2.0 }, SeriesPoint { x: 90.0, y: 1.5 }]
        );
        assert!(average_by(&records, |r| r.key.angle, DevAxis::X, 0).is_empty());
    }

    #[test]
    fn timing_axis_skips_legacy_records() {
        let records = [record(120.0, 90.0, 1.0, None), record(120.0, 60.0, 1.0, Some(9.0))];
        let points = average_by(&records, |r| r.key.angle, DevAxis::T, 5);
        assert_eq!(points, vec![SeriesPoint { x: 60.0, y: 9.0 }]);
    }

    #[test]
    fn velocity_report_fits_each_angle() {
        let mut records = Vec::new();
        for bpm in [60.0, 120.0, 180.0, 240.0] {
            // velocity = 100 * bpm / 60; deviation grows by 0.01 per px/s
            records.push(record(bpm, 90.0, 1.0 + 0.01 * (100.0 * bpm / 60.0), None));
        }
        records.push(record(120.0, 45.0, 5.0, None));

        let series = velocity_report(&records, DevAxis::X);
        assert_eq!(series.len(), 2);

        assert_eq!(series[0].group, 45.0);
        assert_eq!(series[0].model, Err(FitError::Underdetermined { needed: 2, got: 1 }));

        let Ok(Model::Linear { fit, .. }) = series[1].model else {
            panic!("Should fit a line, got {:?}", series[1].model);
        };
        assert!((fit.slope - 0.01).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        let xs: Vec<f64> = series[1].points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn angle_report_fits_each_bpm() {
        let mut records = Vec::new();
        for i in 0..=18 {
            let angle = i as f64 * 10.0;
            let dev = 1.0 + 2.0 * (0.01 * angle).exp();
            records.push(record(180.0, angle, dev, None));
            records.push(record(180.0, angle, dev + 5.0, None));
        }
        records.push(record(200.0, 90.0, 3.0, None));

        let series = angle_report(&records, DevAxis::X, 1);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].points.len(), 19);

        let Ok(Model::Exponential { fit, r_squared }) = series[0].model else {
            panic!("Should fit an exponential, got {:?}", series[0].model);
        };
        assert!((fit.c - 0.01).abs() < 1e-3);
        assert!(r_squared.unwrap() > 0.999);

        assert!(matches!(series[1].model, Err(FitError::Underdetermined { .. })));
    }

    #[test]
    fn bpm_report_fits_each_spacing() {
        let mut records = Vec::new();
        for bpm in [120.0, 150.0, 180.0, 210.0] {
            // deviation = 0.05 * bpm - 2; a worse repeat is dropped by best_n
            records.push(record(bpm, 90.0, 0.05 * bpm - 2.0, None));
            records.push(record(bpm, 90.0, 0.05 * bpm + 4.0, None));
        }
        let first = records[0];
        records.push(MeasurementRecord {
            key: ParamKey {
                spacing: 200.0,
                ..first.key
            },
            ..first
        });

        let series = bpm_report(&records, DevAxis::X, 1);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].group, 100.0);
        assert_eq!(series[1].group, 200.0);

        let xs: Vec<f64> = series[0].points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![120.0, 150.0, 180.0, 210.0]);
        let Ok(Model::Linear { fit, .. }) = series[0].model else {
            panic!("Should fit a line, got {:?}", series[0].model);
        };
        assert!((fit.slope - 0.05).abs() < 1e-12);
        assert!((fit.intercept + 2.0).abs() < 1e-9);

        assert_eq!(series[1].points.len(), 1);
        assert!(matches!(series[1].model, Err(FitError::Underdetermined { .. })));
    }

    #[test]
    fn notes_report_averages_every_trial() {
        let with_notes = |n: u32, sx: f64| MeasurementRecord {
            key: ParamKey {
                note_count: n,
                ..record(120.0, 90.0, sx, None).key
            },
            ..record(120.0, 90.0, sx, None)
        };
        let records = [with_notes(5, 4.0), with_notes(3, 1.0), with_notes(3, 3.0), with_notes(3, 8.0)];

        assert_eq!(
            notes_report(&records, DevAxis::X),
            vec![SeriesPoint { x: 3.0, y: 4.0 }, SeriesPoint { x: 5.0, y: 4.0 }]
        );
        assert!(notes_report(&records, DevAxis::AvgT).is_empty());
    }
}
