//! Small order statistics shared by filters, leveling and measurements

use num_traits::Float;

/// Sort ascending, NaNs last
fn sorted<T: Float>(values: &[T]) -> Vec<T> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
    });
    sorted
}

/// Arithmetic mean; NaN for an empty slice
pub fn mean<T: Float>(values: &[T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let sum = values.iter().fold(T::zero(), |acc, &v| acc + v);
    sum / T::from(values.len()).unwrap_or_else(T::nan)
}

/// Population standard deviation; NaN for an empty slice
pub fn std_dev<T: Float>(values: &[T]) -> T {
    let m = mean(values);
    let squares: Vec<T> = values.iter().map(|&v| (v - m) * (v - m)).collect();
    mean(&squares).sqrt()
}

/// Median averaging the two middle samples for even lengths.
/// Any NaN in the input yields NaN.
pub fn median<T: Float>(values: &[T]) -> T {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return T::nan();
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / (T::one() + T::one())
    } else {
        sorted[mid]
    }
}

/// Percentile `q` in [0, 100] with linear interpolation between closest
/// ranks. NaNs are ignored; NaN if no finite sample remains.
pub fn percentile<T: Float>(values: &[T], q: f64) -> T {
    let valid: Vec<T> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return T::nan();
    }
    let sorted = sorted(&valid);
    let q = q.clamp(0.0, 100.0);
    let position = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = T::from(position - lower as f64).unwrap_or_else(T::zero);
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Minimum ignoring NaNs
pub fn nan_min<T: Float>(values: impl IntoIterator<Item = T>) -> Option<T> {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<T>, v| Some(acc.map_or(v, |m| m.min(v))))
}

/// Maximum ignoring NaNs
pub fn nan_max<T: Float>(values: impl IntoIterator<Item = T>) -> Option<T> {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<T>, v| Some(acc.map_or(v, |m| m.max(v))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[1.0, f64::NAN]).is_nan());
        assert!(median::<f64>(&[]).is_nan());
    }

    #[test]
    fn test_percentile_matches_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_abs_diff_eq!(percentile(&values, 25.0), 2.0);
        assert_abs_diff_eq!(percentile(&values, 50.0), 3.0);

        let values = [10.0, 20.0, 30.0, 40.0];
        assert_abs_diff_eq!(percentile(&values, 25.0), 17.5);
        assert_abs_diff_eq!(percentile(&values, 75.0), 32.5);
        assert_abs_diff_eq!(percentile(&[f64::NAN, 1.0, 3.0], 50.0), 2.0);
    }

    #[test]
    fn test_nan_aware_extrema() {
        let values = vec![f64::NAN, 3.0, -1.0, 2.0];
        assert_eq!(nan_min(values.iter().copied()), Some(-1.0));
        assert_eq!(nan_max(values.iter().copied()), Some(3.0));
        assert_eq!(nan_min(vec![f64::NAN]), None);
    }

    #[test]
    fn test_mean() {
        assert_abs_diff_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
        assert!(mean::<f64>(&[]).is_nan());
        assert_abs_diff_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
    }
}
