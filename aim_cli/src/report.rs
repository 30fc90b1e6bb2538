use aim_core::{Model, Series, SeriesPoint, TrialOffsets};

pub fn print_trial(offsets: &TrialOffsets) {
    let stats = &offsets.stats;
    println!(
        "accepted: {} samples ({}/{} notes missed)",
        stats.count, offsets.misses, offsets.total
    );
    println!("aim dev x: {:.3} px (mean {:+.3})", stats.stddev_x, stats.mean_x);
    println!("aim dev y: {:.3} px (mean {:+.3})", stats.stddev_y, stats.mean_y);
    println!("tap dev:   {:.3} ms (mean {:+.3})", stats.stddev_t, stats.mean_t);
}

pub fn print_series(kind: &str, group_name: &str, series: &[Series]) {
    if series.is_empty() {
        println!("No records selected.");
        return;
    }

    for s in series {
        let head = format!("[{kind}] {group_name}={} n={}", s.group, s.points.len());
        match &s.model {
            Ok(Model::Linear { fit, confidence }) => match confidence {
                Some(c) => println!(
                    "{head}  y = {:.5}x + {:.2}  slope ±{:.5}  intercept ±{:.2}  σ={:.2}",
                    fit.slope, fit.intercept, c.slope_se_95, c.intercept_se_95, c.dev_y
                ),
                None => println!("{head}  y = {:.5}x + {:.2}", fit.slope, fit.intercept),
            },
            Ok(Model::Exponential { fit, r_squared }) => {
                let r2 = r_squared.map_or_else(|| "-".to_string(), |r| format!("{r:.4}"));
                println!(
                    "{head}  y = {:.2} + {:.2}·e^({:.5}x)  r²={r2}",
                    fit.a, fit.b, fit.c
                );
            }
            Err(e) => println!("{head}  no fit: {e}"),
        }

        print_rows(&s.points);
    }
}

/// Bare points with no model, e.g. the note count report.
pub fn print_points(kind: &str, points: &[SeriesPoint]) {
    if points.is_empty() {
        println!("No records selected.");
        return;
    }
    println!("[{kind}] n={}", points.len());
    print_rows(points);
}

fn print_rows(points: &[SeriesPoint]) {
    for p in points {
        println!("  {:>10.2}  {:.3}", p.x, p.y);
    }
}
