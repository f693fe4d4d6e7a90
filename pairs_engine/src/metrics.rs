/// metrics.rs - Drawdown and performance metrics
///
/// ─────────────────────────────────────────────────────────────────────────
/// DRAWDOWN
///
///   Geometric:   W_t  = Π_{s ≤ t} (1 + r_s)
///                DD_t = W_t / max_{s ≤ t}(W_s) − 1
///   Arithmetic:  W_t  = Σ_{s ≤ t} r_s
///                DD_t = W_t − max_{s ≤ t}(W_s)
///
///   Missing returns (NaN) are skipped by the accumulation and yield a
///   missing drawdown row.  DD_t ≤ 0, and DD_t = 0 at every new maximum.
///
/// SHARPE RATIO (annualised)
///
///   SR  = mean(r) / std(r) × √N_annual
///
/// SORTINO RATIO (annualised)
///
///   σ_d = √(mean(min(r_t, 0)²))
///   SoR = mean(r) / σ_d × √N_annual
///
/// CALMAR RATIO
///
///   CAGR   = (1 + total_return)^(N_annual / N_bars) − 1
///   Calmar = CAGR / |MaxDD|
///
/// WIN RATE & AVERAGE TRADE  (closed round trips only)
///
///   P_win  = count(winners) / N_trades
///   Profit Factor = (P_win × AvgWin) / (P_loss × |AvgLoss|)
/// ─────────────────────────────────────────────────────────────────────────
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::{PairsError, Result};
use crate::returns::Trade;
use crate::series::TimeSeries;

/// Default annualisation for daily bars.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Running drawdown from the cumulative high-water mark.
pub fn drawdown(
    returns:      &TimeSeries<f64>,
    geometric:    bool,
    drop_missing: bool,
) -> Result<TimeSeries<f64>> {
    if returns.is_empty() {
        return Err(PairsError::EmptyInput { what: "return series" });
    }

    let mut wealth = if geometric { 1.0 } else { 0.0 };
    let mut peak: Option<f64> = None;
    let mut out = Vec::with_capacity(returns.len());

    for (i, &r) in returns.values().iter().enumerate() {
        if r.is_nan() {
            out.push(f64::NAN);
            continue;
        }
        if r.is_infinite() || (geometric && r <= -1.0) {
            return Err(PairsError::undefined("return for drawdown", i, returns.date_at(i)));
        }

        if geometric {
            wealth *= 1.0 + r;
        } else {
            wealth += r;
        }
        let hw = peak.map_or(wealth, |p| p.max(wealth));
        peak = Some(hw);

        let dd = if geometric { wealth / hw - 1.0 } else { wealth - hw };
        out.push(dd.min(0.0));
    }

    if !drop_missing {
        return returns.with_values(out);
    }
    let (index, values): (Vec<_>, Vec<_>) = returns
        .index()
        .iter()
        .copied()
        .zip(out)
        .filter(|(_, v)| !v.is_nan())
        .unzip();
    TimeSeries::new(index, values)
}

/// Maximum drawdown from an equity curve.
/// Returns a negative value (e.g. −0.15 = −15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0f64;

    for &e in equity_curve {
        if e > peak {
            peak = e;
        }
        if peak <= 0.0 {
            continue;
        }
        let dd = (e - peak) / peak;
        if dd < max_dd {
            max_dd = dd;
        }
    }
    max_dd
}

/// Performance summary of one pair backtest.
#[derive(Debug, Clone, Serialize)]
pub struct PerfReport {
    pub n_bars:        usize,
    pub n_trades:      usize,
    pub open_trades:   usize,
    pub win_rate:      f64,
    pub avg_win:       f64,  // fraction
    pub avg_loss:      f64,  // fraction
    pub profit_factor: f64,
    pub total_return:  f64,  // fraction
    pub cagr:          f64,
    pub sharpe:        f64,
    pub sortino:       f64,
    pub max_drawdown:  f64,  // fraction (negative)
    pub calmar:        f64,
    /// Fraction of bars holding a position
    pub exposure:      f64,
}

impl std::fmt::Display for PerfReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  PAIRS BACKTEST - PERFORMANCE REPORT")?;
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  Bars           : {}", self.n_bars)?;
        writeln!(f, "  Trades         : {} (+{} open)", self.n_trades, self.open_trades)?;
        writeln!(f, "  Win Rate       : {:.2}%", self.win_rate * 100.0)?;
        writeln!(f, "  Avg Win        : {:.4}%", self.avg_win * 100.0)?;
        writeln!(f, "  Avg Loss       : {:.4}%", self.avg_loss * 100.0)?;
        writeln!(f, "  Profit Factor  : {:.3}", self.profit_factor)?;
        writeln!(f, "  Total Return   : {:.2}%", self.total_return * 100.0)?;
        writeln!(f, "  CAGR           : {:.2}%", self.cagr * 100.0)?;
        writeln!(f, "  Sharpe Ratio   : {:.3}", self.sharpe)?;
        writeln!(f, "  Sortino Ratio  : {:.3}", self.sortino)?;
        writeln!(f, "  Max Drawdown   : {:.2}%", self.max_drawdown * 100.0)?;
        writeln!(f, "  Calmar Ratio   : {:.3}", self.calmar)?;
        writeln!(f, "  Exposure       : {:.2}%", self.exposure * 100.0)?;
        writeln!(f, "════════════════════════════════════════════")
    }
}

/// Compute all metrics from attributed log-returns, the compounded curve and
/// the trade log.
///
/// # Arguments
/// * `trade_returns` - per-step attributed log-returns
/// * `cumulative`    - `exp(cumsum) − 1` of the same returns
/// * `trades`        - round trips from `extract_trades`
/// * `bars_per_year` - annualisation factor
pub fn compute_metrics(
    trade_returns: &TimeSeries<f64>,
    cumulative:    &TimeSeries<f64>,
    trades:        &[Trade],
    bars_per_year: f64,
) -> Result<PerfReport> {
    trade_returns.ensure_aligned(cumulative, "trade returns", "cumulative returns")?;
    let n_bars = trade_returns.len();
    if n_bars == 0 {
        return Err(PairsError::EmptyInput { what: "trade returns" });
    }

    // ── Per-trade statistics ──────────────────────────────────────────────
    let closed: Vec<f64> = trades
        .iter()
        .filter(|t| t.is_closed())
        .map(Trade::simple_return)
        .collect();
    let n_trades = closed.len();
    let open_trades = trades.len() - n_trades;

    let winners: Vec<f64> = closed.iter().copied().filter(|&r| r > 0.0).collect();
    let losers: Vec<f64> = closed.iter().filter(|&&r| r <= 0.0).map(|r| r.abs()).collect();

    let win_rate = if n_trades == 0 { 0.0 } else { winners.len() as f64 / n_trades as f64 };
    let avg_win = mean(&winners).unwrap_or(0.0);
    let avg_loss = mean(&losers).unwrap_or(0.0);
    let p_loss = 1.0 - win_rate;

    let profit_factor = if n_trades == 0 {
        0.0
    } else if p_loss * avg_loss < 1e-10 {
        f64::INFINITY
    } else {
        win_rate * avg_win / (p_loss * avg_loss)
    };

    // ── Curve statistics ──────────────────────────────────────────────────
    let simple: Vec<f64> = trade_returns.values().iter().map(|r| r.exp() - 1.0).collect();
    let total_return = *cumulative.values().last().unwrap_or(&0.0);

    let years = n_bars as f64 / bars_per_year;
    let cagr = if years > 0.0 && total_return > -1.0 {
        (1.0 + total_return).powf(1.0 / years) - 1.0
    } else {
        -1.0
    };

    //   SR = mean(r) / std(r) × √N_annual
    let r_mean = mean(&simple).unwrap_or(0.0);
    let r_std = if simple.len() < 2 { 0.0 } else { simple.iter().std_dev() };
    let sharpe = if r_std < 1e-12 { 0.0 } else { r_mean / r_std * bars_per_year.sqrt() };

    //   σ_d = √(mean(min(r, 0)²))
    let downside_sq: Vec<f64> = simple.iter().map(|&r| if r < 0.0 { r * r } else { 0.0 }).collect();
    let sigma_d = mean(&downside_sq).unwrap_or(0.0).sqrt();
    let sortino = if sigma_d < 1e-12 {
        if r_mean > 0.0 { f64::INFINITY } else { 0.0 }
    } else {
        r_mean / sigma_d * bars_per_year.sqrt()
    };

    let equity: Vec<f64> = cumulative.values().iter().map(|c| 1.0 + c).collect();
    let max_drawdown = max_drawdown(&equity);

    let calmar = if max_drawdown.abs() < 1e-10 {
        if cagr > 0.0 { f64::INFINITY } else { 0.0 }
    } else {
        cagr / max_drawdown.abs()
    };

    // Position held at t−1 earns bar t, so exposure counts non-zero bars.
    let exposure = trades.iter().map(|t| t.bars_held).sum::<usize>() as f64 / n_bars as f64;

    Ok(PerfReport {
        n_bars,
        n_trades,
        open_trades,
        win_rate,
        avg_win,
        avg_loss,
        profit_factor,
        total_return,
        cagr,
        sharpe,
        sortino,
        max_drawdown,
        calmar,
        exposure,
    })
}

// ── Statistical helpers ───────────────────────────────────────────────────

fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().mean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::{compound_returns, extract_trades, trade_returns};
    use crate::series::{dates, series};
    use crate::signal::Position::{self, Flat, Long, Short};

    #[test]
    fn max_drawdown_of_idle_curve_is_zero() {
        // never in the market: every attributed return is 0
        let cum = compound_returns(&series(&[0.0; 5])).unwrap();
        let equity: Vec<f64> = cum.values().iter().map(|c| 1.0 + c).collect();
        assert_eq!(max_drawdown(&equity), 0.0);
    }

    #[test]
    fn max_drawdown_on_compounded_curve() {
        // equity 1.0 → 1.2 → 0.6 → 0.8: peak 1.2, trough 0.6
        let r = series(&[0.0, 1.2f64.ln(), 0.5f64.ln(), (0.8f64 / 0.6).ln()]);
        let cum = compound_returns(&r).unwrap();
        let equity: Vec<f64> = cum.values().iter().map(|c| 1.0 + c).collect();
        let dd = max_drawdown(&equity);
        assert!((dd + 0.5).abs() < 1e-9, "dd = {dd}");

        // agrees with the deepest point of the running drawdown series
        let simple = r.map(|x| x.exp() - 1.0);
        let running = drawdown(&simple, true, false).unwrap();
        let deepest = running.values().iter().copied().fold(0.0f64, f64::min);
        assert!((dd - deepest).abs() < 1e-9);
    }

    #[test]
    fn geometric_drawdown_from_high_water_mark() {
        let r = series(&[0.1, -0.5, 0.2, 1.0]);
        let dd = drawdown(&r, true, false).unwrap();
        let v = dd.values();
        assert_eq!(v[0], 0.0);
        assert!((v[1] + 0.5).abs() < 1e-12);
        // 1.1·0.5·1.2 = 0.66 vs peak 1.1
        assert!((v[2] - (0.66 / 1.1 - 1.0)).abs() < 1e-12);
        // 1.32 is a new maximum
        assert_eq!(v[3], 0.0);
    }

    #[test]
    fn arithmetic_drawdown_uses_cumulative_sum() {
        let r = series(&[0.1, -0.3, 0.1, 0.4]);
        let v = drawdown(&r, false, false).unwrap().values().to_vec();
        assert_eq!(v[0], 0.0);
        assert!((v[1] + 0.3).abs() < 1e-12);
        assert!((v[2] + 0.2).abs() < 1e-12);
        assert_eq!(v[3], 0.0);
    }

    #[test]
    fn drawdown_is_never_positive() {
        let r: Vec<f64> = (0..200).map(|i| ((i as f64) * 0.7).sin() * 0.05).collect();
        for geometric in [true, false] {
            let dd = drawdown(&series(&r), geometric, false).unwrap();
            assert!(dd.values().iter().all(|&d| d <= 0.0));
        }
    }

    #[test]
    fn missing_rows_kept_or_dropped() {
        let r = series(&[0.1, f64::NAN, -0.1, f64::NAN]);
        let kept = drawdown(&r, true, false).unwrap();
        assert_eq!(kept.len(), 4);
        assert!(kept.values()[1].is_nan());

        let dropped = drawdown(&r, true, true).unwrap();
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped.index(), &[r.index()[0], r.index()[2]]);
        assert!((dropped.values()[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn geometric_rejects_total_loss_beyond_100pct() {
        assert!(drawdown(&series(&[0.1, -1.5]), true, false).is_err());
        assert!(drawdown(&series(&[0.1, -1.5]), false, false).is_ok());
    }

    #[test]
    fn report_counts_closed_and_open_trades() {
        let sig = TimeSeries::new(dates(7), vec![Flat, Long, Long, Flat, Short, Flat, Long]).unwrap();
        let rx = series(&[0.0, 0.0, 0.02, 0.01, 0.0, 0.01, 0.0]);
        let ry = series(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.03, 0.0]);
        let tr = trade_returns(&sig, &rx, &ry).unwrap();
        let cum = compound_returns(&tr).unwrap();
        let trades = extract_trades(&sig, &tr).unwrap();
        let report = compute_metrics(&tr, &cum, &trades, TRADING_DAYS_PER_YEAR).unwrap();

        assert_eq!(report.n_bars, 7);
        assert_eq!(report.n_trades, 2);
        assert_eq!(report.open_trades, 1);
        // long earned +0.03 log, short earned +0.02 log
        assert_eq!(report.win_rate, 1.0);
        assert!(report.profit_factor.is_infinite());
        assert!((report.total_return - ((0.05f64).exp() - 1.0)).abs() < 1e-12);
        assert!((report.exposure - 3.0 / 7.0).abs() < 1e-12);
        assert_eq!(report.max_drawdown, 0.0);
    }

    #[test]
    fn report_without_trades_is_neutral() {
        let sig: TimeSeries<Position> = TimeSeries::new(dates(3), vec![Flat; 3]).unwrap();
        let z = series(&[0.0, 0.0, 0.0]);
        let tr = trade_returns(&sig, &z, &z).unwrap();
        let cum = compound_returns(&tr).unwrap();
        let report = compute_metrics(&tr, &cum, &[], TRADING_DAYS_PER_YEAR).unwrap();
        assert_eq!(report.n_trades, 0);
        assert_eq!(report.sharpe, 0.0);
        assert_eq!(report.profit_factor, 0.0);
        assert_eq!(report.total_return, 0.0);
    }
}
