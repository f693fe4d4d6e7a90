/// models/normalize.rs - In-sample / out-of-sample split and min-max scaling
///
/// ─────────────────────────────────────────────────────────────────────────
/// MIN-MAX NORMALISATION (distance approach)
///
///   n_in   = round(N · pct)
///   lo, hi = min / max over the in-sample prices only
///   x̃_t    = (x_t − lo) / (hi − lo)           for both segments
///
///   In-sample values land in [0, 1]; out-of-sample values may leave the
///   range, which is intended: using their extremes would leak the future.
/// ─────────────────────────────────────────────────────────────────────────
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;

/// Default in-sample share.
pub const DEFAULT_TRAIN_PCT: f64 = 0.7;

/// Split a series into in-sample `[0, round(N·pct))` and out-of-sample rest.
pub fn split_train_test(
    series: &TimeSeries<f64>,
    pct:    f64,
) -> Result<(TimeSeries<f64>, TimeSeries<f64>)> {
    if !(pct > 0.0 && pct <= 1.0) {
        return Err(PairsError::InvalidParameter {
            name:   "train_pct",
            reason: format!("must lie in (0, 1], got {pct}"),
        });
    }
    if series.is_empty() {
        return Err(PairsError::EmptyInput { what: "price series" });
    }
    let n_train = (series.len() as f64 * pct).round() as usize;
    if n_train == 0 {
        return Err(PairsError::EmptyInput { what: "in-sample segment" });
    }
    debug!(n = series.len(), n_train, "split train/test");
    Ok(series.split_at(n_train))
}

/// Scale both segments by the in-sample min/max.
pub fn normalize(
    train: &TimeSeries<f64>,
    test:  &TimeSeries<f64>,
) -> Result<(TimeSeries<f64>, TimeSeries<f64>)> {
    if train.is_empty() {
        return Err(PairsError::EmptyInput { what: "in-sample prices" });
    }
    train.ensure_finite("in-sample prices")?;
    test.ensure_finite("out-of-sample prices")?;

    let lo = Statistics::min(train.values().iter());
    let hi = Statistics::max(train.values().iter());
    let range = hi - lo;
    if range.abs() < f64::EPSILON {
        // Constant in-sample prices: every scaled value would be 0/0.
        return Err(PairsError::undefined("in-sample price range", 0, train.first_date()));
    }

    let scale = |v: &f64| (v - lo) / range;
    Ok((train.map(scale), test.map(scale)))
}
