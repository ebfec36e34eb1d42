/// Average object area for one band, from the detection areas centred in it.
///
/// With fewer than `min_samples` areas, or if outlier removal leaves nothing,
/// returns `fallback`. Otherwise drops values outside
/// `[q1 - 1.5 IQR, q3 + 1.5 IQR]` and averages the rest.
pub fn calibrate_object_area(areas: &[f64], min_samples: usize, fallback: f64) -> f64 {
    if areas.len() < min_samples || areas.is_empty() {
        return fallback;
    }

    let inliers = iqr_filter(areas);
    if inliers.is_empty() {
        return fallback;
    }
    let mean = inliers.iter().sum::<f64>() / inliers.len() as f64;
    if mean > 0.0 {
        mean
    } else {
        fallback
    }
}

/// Values within 1.5 IQR of the quartiles, in input order.
pub fn iqr_filter(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return sorted;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    values
        .iter()
        .copied()
        .filter(|&v| v.is_finite() && v >= lo && v <= hi)
        .collect()
}

/// Linearly interpolated quantile of sorted, non-empty data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_outlier_ten_times_larger_is_dropped() {
        let mut areas: Vec<f64> = (95..=105).map(|a| a as f64).collect();
        areas.push(1000.0);
        assert_eq!(areas.len(), 12);

        let avg = calibrate_object_area(&areas, 10, 1600.0);

        assert_relative_eq!(avg, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sparse_samples_use_fallback() {
        let areas = vec![100.0; 9];
        assert_relative_eq!(calibrate_object_area(&areas, 10, 1600.0), 1600.0);
    }

    #[test]
    fn test_uniform_samples_average_exactly() {
        let areas = vec![250.0; 10];
        assert_relative_eq!(calibrate_object_area(&areas, 10, 1600.0), 250.0);
    }

    #[test]
    fn test_non_finite_values_fall_back() {
        let areas = vec![f64::NAN; 12];
        assert_relative_eq!(calibrate_object_area(&areas, 10, 1600.0), 1600.0);
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(0.25, 1.75)]
    #[case(0.5, 2.5)]
    #[case(1.0, 4.0)]
    fn test_quantile_interpolates(#[case] q: f64, #[case] expected: f64) {
        assert_relative_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], q), expected);
    }
}
