/// Quantile with linear interpolation between closest ranks, the default
/// used by most dataframe libraries. `values` need not be sorted.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Upper Tukey fence: `Q3 + multiplier * (Q3 - Q1)`.
pub fn upper_fence(values: &[f64], multiplier: f64) -> Option<f64> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    Some(q3 + multiplier * (q3 - q1))
}
