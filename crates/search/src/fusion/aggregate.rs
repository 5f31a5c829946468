//! Score aggregation over one key's calibrated contributions

const EPSILON: f64 = 1e-9;

/// Weighted power mean of `(weight, score)` pairs
///
/// `p = 0` is the weighted geometric mean. Negative scores count as 0.
pub fn power_mean(values: &[(f64, f64)], p: f64) -> f64 {
    let total: f64 = values.iter().map(|(w, _)| w.max(0.0)).sum();
    if total <= 0.0 {
        return 0.0;
    }

    if p.abs() < EPSILON {
        let log_sum: f64 = values
            .iter()
            .map(|(w, s)| w.max(0.0) * s.max(EPSILON).ln())
            .sum();
        return (log_sum / total).exp();
    }

    let sum: f64 = values
        .iter()
        .map(|(w, s)| w.max(0.0) * s.max(0.0).powf(p))
        .sum();
    (sum / total).powf(1.0 / p)
}

/// Mean of the top `ceil(alpha * n)` values (at least one)
pub fn tail_mean(values: &[f64], alpha: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let take = ((alpha * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[..take].iter().sum::<f64>() / take as f64
}

/// Lift the power mean halfway toward a higher tail mean
pub fn boost(power_mean: f64, tail_mean: f64) -> f64 {
    power_mean + 0.5 * (tail_mean - power_mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_mean_of_equal_scores() {
        let values = [(1.0, 0.6), (2.0, 0.6), (0.5, 0.6)];
        for p in [-1.0, 0.0, 0.3, 1.0, 2.0] {
            assert!((power_mean(&values, p) - 0.6).abs() < 1e-9);
        }
    }

    #[test]
    fn test_power_mean_p1_is_weighted_average() {
        let values = [(1.0, 0.2), (3.0, 0.6)];
        assert!((power_mean(&values, 1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_power_mean_orders_by_p() {
        let values = [(1.0, 0.1), (1.0, 0.9)];
        let geo = power_mean(&values, 0.0);
        let low = power_mean(&values, 0.3);
        let arith = power_mean(&values, 1.0);
        assert!(geo < low && low < arith);
    }

    #[test]
    fn test_power_mean_zero_weight() {
        assert_eq!(power_mean(&[(0.0, 0.9)], 0.3), 0.0);
        assert_eq!(power_mean(&[], 0.3), 0.0);
    }

    #[test]
    fn test_tail_mean() {
        let values = [0.1, 0.9, 0.5, 0.7];
        // ceil(0.25 * 4) = 1
        assert_eq!(tail_mean(&values, 0.25), 0.9);
        // ceil(0.5 * 4) = 2
        assert!((tail_mean(&values, 0.5) - 0.8).abs() < 1e-9);
        assert_eq!(tail_mean(&values, 0.0), 0.9);
        assert!((tail_mean(&values, 1.0) - 0.55).abs() < 1e-9);
        assert_eq!(tail_mean(&[], 0.5), 0.0);
    }

    #[test]
    fn test_boost() {
        assert!((boost(0.4, 0.8) - 0.6).abs() < 1e-12);
        assert_eq!(boost(0.7, 0.5), 0.7);
    }
}
