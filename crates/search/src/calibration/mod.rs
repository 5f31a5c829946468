//! Per-source score calibration
//!
//! Maps raw backend scores onto a shared [0, 1] probability scale:
//! - robust z-score from seeded `{p10, p50, p90}` percentiles
//! - average of a Platt term and a configured monotone (isotonic) term
//! - optional coverage rescaling
//!
//! Stats are static configuration; `reload` swaps them atomically.

use std::sync::RwLock;

use fusegate_common::config::{CalibrationConfig, IsotonicConfig, SourceCalibrationConfig};
use tracing::info;

const EPSILON: f64 = 1e-6;

/// Numerically stable logistic function
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Linear interpolation over knots made monotone by a running maximum
fn piecewise(knots: &[[f64; 2]], z: f64) -> f64 {
    let mut points: Vec<(f64, f64)> = knots
        .iter()
        .filter(|k| k[0].is_finite() && k[1].is_finite())
        .map(|k| (k[0], k[1]))
        .collect();
    if points.is_empty() {
        return sigmoid(z);
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut running = f64::NEG_INFINITY;
    for point in &mut points {
        running = running.max(point.1);
        point.1 = running;
    }

    let (first, last) = (points[0], points[points.len() - 1]);
    if z <= first.0 {
        return first.1;
    }
    if z >= last.0 {
        return last.1;
    }

    points
        .windows(2)
        .find(|w| z <= w[1].0)
        .map(|w| {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x1 - x0 <= EPSILON {
                y1
            } else {
                y0 + (y1 - y0) * (z - x0) / (x1 - x0)
            }
        })
        .unwrap_or(last.1)
}

fn calibrate_with(stats: &SourceCalibrationConfig, raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }

    let z = (raw - stats.p50) / (stats.p90 - stats.p10).max(EPSILON);
    let platt = sigmoid(stats.platt_a * z + stats.platt_b);
    let isotonic = match &stats.isotonic {
        IsotonicConfig::Sigmoid { k } => sigmoid(k * z),
        IsotonicConfig::Piecewise { knots } => piecewise(knots, z),
    };

    clamp_unit(0.5 * (platt + isotonic))
}

pub struct ScoreCalibrator {
    config: RwLock<CalibrationConfig>,
}

impl ScoreCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Replace all source stats
    pub fn reload(&self, config: CalibrationConfig) {
        let sources = config.sources.len();
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        info!(sources, "Calibration stats reloaded");
    }

    /// Calibrated probability of `raw` from `source`, in [0, 1]
    pub fn calibrate(&self, source: &str, raw: f64) -> f64 {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        let stats = config.sources.get(source).unwrap_or(&config.fallback);
        calibrate_with(stats, raw)
    }

    /// Calibrated probability rescaled by evidence coverage in [0, 1]
    ///
    /// Without a configured coverage term this equals `calibrate`.
    pub fn calibrate_with_coverage(&self, source: &str, raw: f64, coverage: f64) -> f64 {
        let base = self.calibrate(source, raw);
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        let Some(term) = &config.coverage else {
            return base;
        };

        let coverage = clamp_unit(coverage);
        clamp_unit(base.powf(term.gamma) * (1.0 - (-term.lambda * coverage).exp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusegate_common::config::CoverageConfig;
    use rand::Rng;

    fn calibrator() -> ScoreCalibrator {
        ScoreCalibrator::new(CalibrationConfig::default())
    }

    #[test]
    fn test_median_maps_to_half() {
        let c = calibrator();
        assert!((c.calibrate("web", 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_monotone_in_raw_score() {
        let c = calibrator();
        let mut prev = 0.0;
        for i in 0..=100 {
            let p = c.calibrate("vector", i as f64 / 100.0);
            assert!(p >= prev);
            prev = p;
        }
    }

    #[test]
    fn test_random_inputs_stay_in_range() {
        let mut rng = rand::thread_rng();
        let mut config = CalibrationConfig::default();
        config.coverage = Some(CoverageConfig { gamma: 1.5, lambda: 2.0 });
        let c = ScoreCalibrator::new(config);

        for _ in 0..2000 {
            let raw: f64 = rng.gen_range(-1e6..1e6);
            let source = ["web", "vector", "knowledge_graph", "unknown"][rng.gen_range(0..4)];
            let p = c.calibrate(source, raw);
            assert!((0.0..=1.0).contains(&p));

            let q = c.calibrate_with_coverage(source, raw, rng.gen_range(-1.0..2.0));
            assert!((0.0..=1.0).contains(&q));
        }
    }

    #[test]
    fn test_non_finite_maps_to_zero() {
        let c = calibrator();
        assert_eq!(c.calibrate("web", f64::NAN), 0.0);
        assert_eq!(c.calibrate("web", f64::INFINITY), 0.0);
    }

    #[test]
    fn test_degenerate_spread() {
        let mut config = CalibrationConfig::default();
        config
            .sources
            .insert("flat".into(), SourceCalibrationConfig::with_stats(0.5, 0.5, 0.5));
        let c = ScoreCalibrator::new(config);
        let p = c.calibrate("flat", 0.7);
        assert!(p.is_finite() && p > 0.99);
    }

    #[test]
    fn test_piecewise_isotonic() {
        let mut stats = SourceCalibrationConfig::with_stats(0.0, 0.5, 1.0);
        stats.isotonic = IsotonicConfig::Piecewise {
            knots: vec![[-1.0, 0.0], [0.0, 0.6], [0.5, 0.4], [1.0, 1.0]],
        };
        // Non-monotone knot is lifted to the running max
        assert_eq!(piecewise(&[[-1.0, 0.0], [0.0, 0.6], [0.5, 0.4], [1.0, 1.0]], 0.25), 0.6);
        assert!((piecewise(&[[0.0, 0.2], [1.0, 0.8]], 0.5) - 0.5).abs() < 1e-9);
        assert_eq!(piecewise(&[[0.0, 0.2], [1.0, 0.8]], -3.0), 0.2);
        assert_eq!(piecewise(&[[0.0, 0.2], [1.0, 0.8]], 3.0), 0.8);

        let mut prev = 0.0;
        for i in 0..=20 {
            let p = calibrate_with(&stats, i as f64 / 20.0);
            assert!(p >= prev);
            prev = p;
        }
    }

    #[test]
    fn test_coverage_rescaling() {
        let mut config = CalibrationConfig::default();
        config.coverage = Some(CoverageConfig { gamma: 1.0, lambda: 3.0 });
        let c = ScoreCalibrator::new(config);

        let base = c.calibrate("web", 0.9);
        assert_eq!(c.calibrate_with_coverage("web", 0.9, 0.0), 0.0);
        let full = c.calibrate_with_coverage("web", 0.9, 1.0);
        assert!(full < base && full > 0.9 * base);
    }

    #[test]
    fn test_reload_swaps_stats() {
        let c = calibrator();
        let before = c.calibrate("web", 0.6);

        let mut config = CalibrationConfig::default();
        config
            .sources
            .insert("web".into(), SourceCalibrationConfig::with_stats(0.6, 0.8, 0.95));
        c.reload(config);

        assert!(c.calibrate("web", 0.6) < before);
    }
}
