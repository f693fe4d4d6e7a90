/// models/spread.rs - Spread and standardised spread (z-score)
///
/// ─────────────────────────────────────────────────────────────────────────
/// SIGN CONVENTION
///
///   spread_t = x̃_t − ỹ_t      (x = first / independent leg,
///                              y = second / dependent leg)
///
///   z_t high → x rich relative to y → SHORT the spread (short x, long y)
///   z_t low  → x cheap relative to y → LONG the spread (long x, short y)
///
///   This is the convention the return attributor assumes: a LONG position
///   earns r_x − r_y, a SHORT position earns r_y − r_x.
///
/// Z-SCORE (in-sample standardisation)
///
///   μ = mean(spread_in),  σ = std(spread_in)  (population, ddof = 0)
///   z_t = (spread_t − μ) / σ                  for both segments
/// ─────────────────────────────────────────────────────────────────────────
use statrs::statistics::Statistics;

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;

/// `x − y` on a shared index.
pub fn spread(x: &TimeSeries<f64>, y: &TimeSeries<f64>) -> Result<TimeSeries<f64>> {
    x.ensure_aligned(y, "x prices", "y prices")?;
    let diff = x
        .values()
        .iter()
        .zip(y.values())
        .map(|(a, b)| a - b)
        .collect();
    x.with_values(diff)
}

/// In-sample mean and population standard deviation of a spread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadStats {
    pub mean: f64,
    pub std:  f64,
}

impl SpreadStats {
    pub fn estimate(train_spread: &TimeSeries<f64>) -> Result<Self> {
        if train_spread.is_empty() {
            return Err(PairsError::EmptyInput { what: "in-sample spread" });
        }
        train_spread.ensure_finite("in-sample spread")?;
        let mean = train_spread.values().iter().mean();
        let std = train_spread.values().iter().population_std_dev();
        if !(std.is_finite() && std > f64::EPSILON) {
            return Err(PairsError::undefined(
                "in-sample spread std (zero variance)",
                0,
                train_spread.first_date(),
            ));
        }
        Ok(Self { mean, std })
    }

    pub fn standardise(&self, s: &TimeSeries<f64>) -> TimeSeries<f64> {
        s.map(|v| (v - self.mean) / self.std)
    }
}

/// Standardise both spread segments with the in-sample statistics.
pub fn zscore(
    train_spread: &TimeSeries<f64>,
    test_spread:  &TimeSeries<f64>,
) -> Result<(TimeSeries<f64>, TimeSeries<f64>)> {
    let stats = SpreadStats::estimate(train_spread)?;
    test_spread.ensure_finite("out-of-sample spread")?;
    Ok((stats.standardise(train_spread), stats.standardise(test_spread)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{dates, series};

    #[test]
    fn spread_is_x_minus_y() {
        let x = series(&[1.0, 0.5, 0.2]);
        let y = series(&[0.5, 0.5, 0.4]);
        let s = spread(&x, &y).unwrap();
        let v = s.values();
        assert!((v[0] - 0.5).abs() < 1e-12 && v[1].abs() < 1e-12 && (v[2] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn spread_requires_shared_index() {
        let x = series(&[1.0, 2.0]);
        let d = dates(3);
        let y = TimeSeries::new(vec![d[0], d[2]], vec![1.0, 2.0]).unwrap();
        assert!(matches!(spread(&x, &y), Err(PairsError::IndexMismatch { .. })));
    }

    #[test]
    fn zscore_uses_population_std_of_train() {
        // mean 2, population std sqrt(2/3)
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let (train, test) = s.split_at(3);
        let (zt, zs) = zscore(&train, &test).unwrap();
        let sd = (2.0f64 / 3.0).sqrt();
        assert!((zt.values()[0] + 1.0 / sd).abs() < 1e-12);
        assert!(zt.values()[1].abs() < 1e-12);
        assert!((zs.values()[0] - 2.0 / sd).abs() < 1e-12);
    }

    #[test]
    fn zero_variance_spread_is_undefined() {
        let s = series(&[0.3, 0.3, 0.3, 1.0]);
        let (train, test) = s.split_at(3);
        assert!(matches!(zscore(&train, &test), Err(PairsError::UndefinedValue { .. })));
    }
}
