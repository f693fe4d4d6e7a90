/// returns.rs - Lagged return attribution and compounding
///
/// ─────────────────────────────────────────────────────────────────────────
/// ATTRIBUTION (no look-ahead)
///
///   The position decided at t−1 earns the return realised over [t−1, t]:
///
///   trade_r[0] = 0
///   trade_r[t] = r_x[t] − r_y[t]   if signal[t−1] = LONG
///              = r_y[t] − r_x[t]   if signal[t−1] = SHORT
///              = 0                  if signal[t−1] = FLAT
///
///   r_x, r_y are per-step log-returns of the first (x) and second (y) leg.
///
/// COMPOUNDING
///
///   cum[t] = exp(Σ_{s ≤ t} trade_r[s]) − 1
///
///   Stateless prefix sum; log(1 + cum[t]) − log(1 + cum[t−1]) = trade_r[t].
/// ─────────────────────────────────────────────────────────────────────────
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;
use crate::signal::Position;

/// Per-step log-returns of a price series; the first step has no prior
/// price and is reported as 0.
pub fn log_returns(prices: &TimeSeries<f64>) -> Result<TimeSeries<f64>> {
    if prices.is_empty() {
        return Err(PairsError::EmptyInput { what: "price series" });
    }
    if let Some(i) = prices.values().iter().position(|p| !(p.is_finite() && *p > 0.0)) {
        return Err(PairsError::undefined("price (must be finite and > 0)", i, prices.date_at(i)));
    }
    let p = prices.values();
    let mut out = Vec::with_capacity(p.len());
    out.push(0.0);
    out.extend(p.windows(2).map(|w| (w[1] / w[0]).ln()));
    prices.with_values(out)
}

/// Attribute leg returns to the lagged position.
pub fn trade_returns(
    signal:    &TimeSeries<Position>,
    x_returns: &TimeSeries<f64>,
    y_returns: &TimeSeries<f64>,
) -> Result<TimeSeries<f64>> {
    signal.ensure_aligned(x_returns, "signal", "x returns")?;
    signal.ensure_aligned(y_returns, "signal", "y returns")?;
    if signal.is_empty() {
        return Err(PairsError::EmptyInput { what: "signal series" });
    }

    let pos = signal.values();
    let rx = x_returns.values();
    let ry = y_returns.values();

    let mut out = Vec::with_capacity(pos.len());
    out.push(0.0);
    for t in 1..pos.len() {
        let r = match pos[t - 1] {
            Position::Flat => 0.0,
            Position::Long => rx[t] - ry[t],
            Position::Short => ry[t] - rx[t],
        };
        if !r.is_finite() {
            return Err(PairsError::undefined("leg return", t, signal.date_at(t)));
        }
        out.push(r);
    }
    signal.with_values(out)
}

/// `exp(running_sum(r)) − 1`
pub fn compound_returns(returns: &TimeSeries<f64>) -> Result<TimeSeries<f64>> {
    if returns.is_empty() {
        return Err(PairsError::EmptyInput { what: "return series" });
    }
    returns.ensure_finite("trade return")?;
    let cum = returns
        .values()
        .iter()
        .scan(0.0f64, |acc, r| {
            *acc += r;
            Some(acc.exp() - 1.0)
        })
        .collect();
    returns.with_values(cum)
}

/// One round trip of the synthetic pair position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub direction:   Position,
    pub entry_index: usize,
    pub entry_date:  NaiveDate,
    /// `None` while the position is still open at the end of the series.
    pub exit_index:  Option<usize>,
    pub exit_date:   Option<NaiveDate>,
    pub bars_held:   usize,
    /// Summed attributed log-return over the holding period
    pub log_return:  f64,
}

impl Trade {
    pub fn simple_return(&self) -> f64 {
        self.log_return.exp() - 1.0
    }

    pub fn is_closed(&self) -> bool {
        self.exit_index.is_some()
    }
}

/// Split a run into round trips.
///
/// A position opened at step `i` (signal non-flat, previous flat) and closed
/// at step `j` (first flat step after it) is held over `i..j` and earns the
/// attributed returns `i+1 ..= j`.
pub fn extract_trades(
    signal:        &TimeSeries<Position>,
    trade_returns: &TimeSeries<f64>,
) -> Result<Vec<Trade>> {
    signal.ensure_aligned(trade_returns, "signal", "trade returns")?;
    let pos = signal.values();
    let r = trade_returns.values();
    let idx = signal.index();

    let mut trades = Vec::new();
    let mut open: Option<(usize, Position)> = None;

    for t in 0..pos.len() {
        if let Some((entry, dir)) = open {
            if pos[t] != dir {
                trades.push(Trade {
                    direction:   dir,
                    entry_index: entry,
                    entry_date:  idx[entry],
                    exit_index:  Some(t),
                    exit_date:   Some(idx[t]),
                    bars_held:   t - entry,
                    log_return:  r[entry + 1..=t].iter().sum(),
                });
                open = None;
            }
        }
        // A hand-built signal may flip sign directly; the new leg opens here.
        if open.is_none() && pos[t].is_open() {
            open = Some((t, pos[t]));
        }
    }

    if let Some((entry, dir)) = open {
        let last = pos.len() - 1;
        trades.push(Trade {
            direction:   dir,
            entry_index: entry,
            entry_date:  idx[entry],
            exit_index:  None,
            exit_date:   None,
            bars_held:   last - entry,
            log_return:  r[entry + 1..].iter().sum(),
        });
    }
    Ok(trades)
}
