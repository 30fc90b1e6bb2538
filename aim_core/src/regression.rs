//! Closed-form fits used to summarise deviation against a driving variable.
//!
//! Both fits are deliberately non-iterative: slices are small and the models
//! are refitted every time the selection changes.

use crate::error::FitError;

/// `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Inverse model `x = (y - intercept) / slope`.
    pub fn invert(&self, y: f64) -> f64 {
        (y - self.intercept) / self.slope
    }
}

/// Residual spreads of a linear fit and the derived 95% standard errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearConfidence {
    /// Spread of `y` around the model.
    pub dev_y: f64,
    /// Spread of `x` around the inverse model.
    pub dev_x: f64,
    pub slope_se_95: f64,
    pub intercept_se_95: f64,
}

/// `y = a + b * exp(c * x)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ExpFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.a + self.b * (self.c * x).exp()
    }
}

/// Two-centroid line fit.
///
/// Points are paired into a "low" and a "high" group by quadrant around
/// `(mean x, mean y)`; which diagonal is used depends on whether the upper
/// half of `x` (split at the median) has a larger mean `y` than the lower
/// half. The line passes through both group centroids.
///
/// # Panics
/// If `x` and `y` differ in length.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<LinearFit, FitError> {
    assert_eq!(x.len(), y.len(), "x and y must have the same length");
    let n = x.len();
    if n < 2 {
        return Err(FitError::Underdetermined { needed: 2, got: n });
    }

    let med = median(x);
    let (left, right): (Vec<(f64, f64)>, Vec<(f64, f64)>) =
        x.iter().copied().zip(y.iter().copied()).partition(|(xi, _)| *xi < med);
    if left.is_empty() || right.is_empty() {
        return Err(FitError::DegenerateSplit);
    }
    let rising = mean(left.iter().map(|p| p.1)) < mean(right.iter().map(|p| p.1));

    let mean_x = mean(x.iter().copied());
    let mean_y = mean(y.iter().copied());

    let mut low = Centroid::default();
    let mut high = Centroid::default();
    for (&xi, &yi) in x.iter().zip(y) {
        let x_low = xi < mean_x;
        let y_low = yi < mean_y;
        match (x_low, y_low == rising) {
            (true, true) => low.add(xi, yi),
            (false, false) => high.add(xi, yi),
            _ => {}
        }
    }
    let (p1, p2) = match (low.get(), high.get()) {
        (Some(p1), Some(p2)) => (p1, p2),
        _ => return Err(FitError::DegenerateSplit),
    };

    let run = p1.0 - p2.0;
    if run == 0.0 {
        return Err(FitError::Singular);
    }
    let slope = (p1.1 - p2.1) / run;
    Ok(LinearFit {
        slope,
        intercept: p1.1 - slope * p1.0,
    })
}

/// 95% standard errors of `fit` over the points it was fitted to.
///
/// Needs at least three points, a non-zero slope and some spread of `x`
/// around the inverse model.
pub fn linear_confidence(fit: &LinearFit, x: &[f64], y: &[f64]) -> Result<LinearConfidence, FitError> {
    assert_eq!(x.len(), y.len(), "x and y must have the same length");
    let n = x.len();
    if n < 3 {
        return Err(FitError::Underdetermined { needed: 3, got: n });
    }
    if fit.slope == 0.0 {
        return Err(FitError::Singular);
    }

    let (_, dev_y) = mean_std(x.iter().zip(y).map(|(xi, yi)| yi - fit.predict(*xi)));
    let (_, dev_x) = mean_std(x.iter().zip(y).map(|(xi, yi)| xi - fit.invert(*yi)));
    if dev_x == 0.0 || !dev_x.is_finite() {
        return Err(FitError::Singular);
    }

    let slope_se_95 = (dev_y / dev_x) / ((n - 2) as f64).sqrt() * 1.96;
    let intercept_se_95 = 2.0 * slope_se_95 * mean(x.iter().copied());
    Ok(LinearConfidence {
        dev_y,
        dev_x,
        slope_se_95,
        intercept_se_95,
    })
}

/// Fits `y = a + b * exp(c * x)` by integral-equation linearisation.
///
/// The running trapezoid integral `S` of `y` over `x` satisfies
/// `y - y0 = A (x - x0) + c S` for the exponential model, which gives `c`
/// from one 2x2 least-squares system; `a` and `b` then follow from a second
/// one against `exp(c x)`. Points are sorted by `x` first.
///
/// # Panics
/// If `x` and `y` differ in length.
pub fn exp_fit(x: &[f64], y: &[f64]) -> Result<ExpFit, FitError> {
    assert_eq!(x.len(), y.len(), "x and y must have the same length");
    let n = x.len();
    if n < 4 {
        return Err(FitError::Underdetermined { needed: 4, got: n });
    }

    let mut pts: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (x0, y0) = pts[0];

    let mut s = 0.0;
    let (mut sxx, mut sxs, mut sss, mut syx, mut sys) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for k in 1..n {
        let (xk, yk) = pts[k];
        let (xp, yp) = pts[k - 1];
        s += (xk - xp) * (yk + yp) / 2.0;

        let dx = xk - x0;
        let dy = yk - y0;
        sxx += dx * dx;
        sxs += dx * s;
        sss += s * s;
        syx += dy * dx;
        sys += dy * s;
    }
    let (_, c) = solve2([[sxx, sxs], [sxs, sss]], [syx, sys])?;

    let (mut st, mut stt, mut sy, mut syt) = (0.0, 0.0, 0.0, 0.0);
    for &(xk, yk) in &pts {
        let t = (c * xk).exp();
        st += t;
        stt += t * t;
        sy += yk;
        syt += yk * t;
    }
    let (a, b) = solve2([[n as f64, st], [st, stt]], [sy, syt])?;

    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return Err(FitError::Singular);
    }
    Ok(ExpFit { a, b, c })
}

/// Coefficient of determination. `None` when `y` has no spread.
///
/// # Panics
/// If `y` and `y_model` differ in length.
pub fn r_squared(y: &[f64], y_model: &[f64]) -> Option<f64> {
    assert_eq!(y.len(), y_model.len(), "y and y_model must have the same length");
    if y.is_empty() {
        return None;
    }
    let mean_y = mean(y.iter().copied());
    let ss_res: f64 = y.iter().zip(y_model).map(|(yi, mi)| (yi - mi).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    Some(1.0 - ss_res / ss_tot)
}

fn solve2(m: [[f64; 2]; 2], v: [f64; 2]) -> Result<(f64, f64), FitError> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if det == 0.0 || !det.is_finite() {
        return Err(FitError::Singular);
    }
    Ok((
        (v[0] * m[1][1] - m[0][1] * v[1]) / det,
        (m[0][0] * v[1] - m[1][0] * v[0]) / det,
    ))
}

#[derive(Default)]
struct Centroid {
    sum_x: f64,
    sum_y: f64,
    count: usize,
}

impl Centroid {
    fn add(&mut self, x: f64, y: f64) {
        self.sum_x += x;
        self.sum_y += y;
        self.count += 1;
    }

    fn get(&self) -> Option<(f64, f64)> {
        (self.count > 0).then(|| (self.sum_x / self.count as f64, self.sum_y / self.count as f64))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count as f64
}

// Population (ddof = 0).
fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let m = mean(values.clone());
    (m, mean(values.map(|v| (v - m).powi(2))).sqrt())
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_fit_recovers_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 3.0).collect();
        let fit = linear_fit(&x, &y).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 3.0).abs() < 1e-12);
    }

    #[test]
    fn linear_fit_handles_falling_data() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [9.0, 7.0, 5.0, 3.0];
        let fit = linear_fit(&x, &y).unwrap();
        assert!((fit.slope + 2.0).abs() < 1e-12);
        assert!((fit.intercept - 9.0).abs() < 1e-12);
    }

    #[test]
    fn linear_fit_shrugs_off_one_outlier() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mut y: Vec<f64> = x.iter().map(|v| v + 1.0).collect();
        y[1] = 12.0;
        // The outlier lands in neither group.
        let fit = linear_fit(&x, &y).unwrap();
        assert!((fit.slope - 1.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
    }

    #[test]
    fn linear_fit_needs_two_points() {
        assert_eq!(
            linear_fit(&[1.0], &[2.0]),
            Err(FitError::Underdetermined { needed: 2, got: 1 })
        );
    }

    #[test]
    fn identical_x_cannot_be_split() {
        assert_eq!(
            linear_fit(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]),
            Err(FitError::DegenerateSplit)
        );
    }

    #[test]
    fn flat_data_leaves_one_group_empty() {
        assert_eq!(
            linear_fit(&[1.0, 2.0, 3.0, 4.0], &[5.0, 5.0, 5.0, 5.0]),
            Err(FitError::DegenerateSplit)
        );
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn mismatched_lengths_panic() {
        let _ = exp_fit(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn exp_fit_recovers_known_curve() {
        let x: Vec<f64> = (0..=20).map(|i| i as f64 * 5.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * (0.01 * v).exp()).collect();

        let fit = exp_fit(&x, &y).unwrap();
        assert!((fit.c - 0.01).abs() < 1e-4, "c = {}", fit.c);
        assert!((fit.a - 1.0).abs() < 0.05, "a = {}", fit.a);
        assert!((fit.b - 2.0).abs() < 0.05, "b = {}", fit.b);

        let model: Vec<f64> = x.iter().map(|v| fit.predict(*v)).collect();
        assert!(r_squared(&y, &model).unwrap() > 0.9999);
    }

    #[test]
    fn exp_fit_sorts_input_by_x() {
        let x: Vec<f64> = (0..=20).rev().map(|i| i as f64 * 5.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * (0.01 * v).exp()).collect();
        let fit = exp_fit(&x, &y).unwrap();
        assert!((fit.c - 0.01).abs() < 1e-4);
    }

    #[test]
    fn exp_fit_needs_four_points() {
        assert_eq!(
            exp_fit(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]),
            Err(FitError::Underdetermined { needed: 4, got: 3 })
        );
    }

    #[test]
    fn exp_fit_on_repeated_x_is_singular() {
        assert_eq!(exp_fit(&[2.0; 5], &[1.0, 2.0, 3.0, 4.0, 5.0]), Err(FitError::Singular));
    }

    #[test]
    fn r_squared_of_constant_data_is_undefined() {
        assert_eq!(r_squared(&[2.0, 2.0, 2.0], &[2.0, 2.0, 2.0]), None);
        assert_eq!(r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), Some(1.0));
    }

    #[test]
    fn confidence_bands_follow_closed_form() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [3.1, 4.9, 7.2, 8.8, 11.1, 12.9];
        let fit = linear_fit(&x, &y).unwrap();
        let conf = linear_confidence(&fit, &x, &y).unwrap();

        assert!(conf.dev_y > 0.0);
        let expected = (conf.dev_y / conf.dev_x) / 4f64.sqrt() * 1.96;
        assert!((conf.slope_se_95 - expected).abs() < 1e-12);
        assert!((conf.intercept_se_95 - 2.0 * expected * 3.5).abs() < 1e-12);
    }

    #[test]
    fn confidence_needs_three_points_and_spread() {
        let fit = LinearFit {
            slope: 2.0,
            intercept: 3.0,
        };
        assert_eq!(
            linear_confidence(&fit, &[1.0, 2.0], &[5.0, 7.0]),
            Err(FitError::Underdetermined { needed: 3, got: 2 })
        );
        // Points exactly on the line leave no spread in x.
        assert_eq!(
            linear_confidence(&fit, &[1.0, 2.0, 3.0], &[5.0, 7.0, 9.0]),
            Err(FitError::Singular)
        );
    }
}
