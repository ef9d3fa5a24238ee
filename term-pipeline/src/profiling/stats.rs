//! Exact summary statistics over collected values.

use super::report::{NumericSummary, Percentile};

/// Summarises values sorted ascending. Returns `None` for an empty slice.
pub(crate) fn summarize(sorted: &[f64], percentiles: &[f64]) -> Option<NumericSummary> {
    let (first, last) = (sorted.first()?, sorted.last()?);
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std_dev = (sorted.len() > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });

    Some(NumericSummary {
        count: sorted.len() as u64,
        min: *first,
        max: *last,
        mean,
        std_dev,
        percentiles: percentiles
            .iter()
            .map(|p| Percentile {
                percentile: *p,
                value: percentile(sorted, *p),
            })
            .collect(),
    })
}

/// Percentile `p` with linear interpolation between ranks.
///
/// `p` is clamped to `[0, 100]`; NaN yields NaN.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let position = (p.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// Pearson correlation of paired values.
pub(crate) fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}
