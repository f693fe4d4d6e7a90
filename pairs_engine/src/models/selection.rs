/// models/selection.rs - Candidate pair ranking (distance approach)
///
/// ─────────────────────────────────────────────────────────────────────────
///   Euclidean distance   d(x, y) = √ Σ_t (x̃_t − ỹ_t)²
///   Pearson correlation  ρ(x, y) = cov(x, y) / (σ_x · σ_y)
///
///   Both are computed on in-sample normalised prices.  Pairs with the
///   smallest distance move most alike and are the best candidates.
///   Nothing here feeds the signal engine; it only picks the tickers.
/// ─────────────────────────────────────────────────────────────────────────
use ahash::AHashSet;
use ndarray::Array2;
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::{debug, warn};

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;

pub fn euclidean_distance(x: &TimeSeries<f64>, y: &TimeSeries<f64>) -> Result<f64> {
    x.ensure_aligned(y, "x", "y")?;
    if x.is_empty() {
        return Err(PairsError::EmptyInput { what: "distance input" });
    }
    let sq: f64 = x
        .values()
        .iter()
        .zip(y.values())
        .map(|(a, b)| (a - b).powi(2))
        .sum();
    Ok(sq.sqrt())
}

pub fn correlation(x: &TimeSeries<f64>, y: &TimeSeries<f64>) -> Result<f64> {
    x.ensure_aligned(y, "x", "y")?;
    if x.len() < 2 {
        return Err(PairsError::EmptyInput { what: "correlation input (need >= 2 points)" });
    }
    let xv = x.values();
    let yv = y.values();
    let cov = xv.iter().population_covariance(yv.iter());
    let sx = xv.iter().population_std_dev();
    let sy = yv.iter().population_std_dev();
    if sx < f64::EPSILON || sy < f64::EPSILON {
        return Err(PairsError::undefined("correlation (constant series)", 0, x.first_date()));
    }
    Ok(cov / (sx * sy))
}

#[derive(Debug, Clone, Serialize)]
pub struct PairCandidate {
    pub x:           String,
    pub y:           String,
    pub distance:    f64,
    pub correlation: f64,
}

/// Distance matrix over a ticker universe.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    pub tickers:  Vec<String>,
    pub distance: Array2<f64>,
}

impl DistanceMatrix {
    /// Build from normalised in-sample series.  All series must share one index.
    pub fn build(universe: &[(String, TimeSeries<f64>)]) -> Result<Self> {
        let n = universe.len();
        if n < 2 {
            return Err(PairsError::EmptyInput { what: "ticker universe (need >= 2)" });
        }
        let mut seen = AHashSet::with_capacity(n);
        for (ticker, _) in universe {
            if !seen.insert(ticker.as_str()) {
                return Err(PairsError::InvalidParameter {
                    name:   "tickers",
                    reason: format!("duplicate ticker {ticker}"),
                });
            }
        }

        let mut distance = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d = euclidean_distance(&universe[i].1, &universe[j].1)?;
                distance[[i, j]] = d;
                distance[[j, i]] = d;
            }
        }
        debug!(n, "built distance matrix");

        Ok(Self {
            tickers: universe.iter().map(|(t, _)| t.clone()).collect(),
            distance,
        })
    }
}

/// Rank every unordered pair by ascending distance; keep the `top` best.
pub fn rank_pairs(universe: &[(String, TimeSeries<f64>)], top: usize) -> Result<Vec<PairCandidate>> {
    let matrix = DistanceMatrix::build(universe)?;
    let n = matrix.tickers.len();
    let mut out = Vec::with_capacity(n * (n - 1) / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            let correlation = match correlation(&universe[i].1, &universe[j].1) {
                Ok(c) => c,
                Err(e) => {
                    warn!(x = %matrix.tickers[i], y = %matrix.tickers[j], "correlation skipped: {e}");
                    f64::NAN
                }
            };
            out.push(PairCandidate {
                x: matrix.tickers[i].clone(),
                y: matrix.tickers[j].clone(),
                distance: matrix.distance[[i, j]],
                correlation,
            });
        }
    }

    out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    out.truncate(top);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::series;

    #[test]
    fn distance_of_identical_series_is_zero() {
        let x = series(&[0.1, 0.5, 0.9]);
        assert_eq!(euclidean_distance(&x, &x).unwrap(), 0.0);
        let y = series(&[0.1, 0.5, 0.5]);
        assert!((euclidean_distance(&x, &y).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn correlation_sign() {
        let x = series(&[1.0, 2.0, 3.0, 4.0]);
        let y = series(&[2.0, 4.0, 6.0, 8.0]);
        let z = series(&[4.0, 3.0, 2.0, 1.0]);
        assert!((correlation(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        assert!((correlation(&x, &z).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn ranks_closest_pair_first() {
        let universe = vec![
            ("A".to_string(), series(&[0.0, 0.5, 1.0])),
            ("B".to_string(), series(&[0.0, 0.6, 1.0])),
            ("C".to_string(), series(&[1.0, 0.0, 0.2])),
        ];
        let ranked = rank_pairs(&universe, 2).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!((ranked[0].x.as_str(), ranked[0].y.as_str()), ("A", "B"));

        let m = DistanceMatrix::build(&universe).unwrap();
        assert_eq!(m.distance, m.distance.t());
        assert!(m.distance.diag().iter().all(|&d| d == 0.0));
        assert_eq!(m.tickers, vec!["A", "B", "C"]);
    }

    #[test]
    fn duplicate_ticker_rejected() {
        let universe = vec![
            ("A".to_string(), series(&[0.0, 1.0])),
            ("A".to_string(), series(&[1.0, 0.0])),
        ];
        assert!(DistanceMatrix::build(&universe).is_err());
    }
}
