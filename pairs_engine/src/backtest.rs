/// backtest.rs - Pair backtest pipeline
///
/// ARCHITECTURE
/// ┌──────────────────────────────────────────────────────────┐
/// │  close prices x, y  (inner-joined on date)               │
/// │        │                                                 │
/// │   split_train_test ─► normalize (in-sample min/max)      │
/// │        │                                                 │
/// │   spread = x̃ − ỹ ─► zscore (in-sample mean/std)          │
/// │        │                                                 │
/// │   generate_signal (fold over z, previous position)       │
/// │        │                                                 │
/// │   trade_returns (signal[t−1] × leg log-returns[t])       │
/// │        │                                                 │
/// │   compound_returns / drawdown / extract_trades / report  │
/// └──────────────────────────────────────────────────────────┘
///
/// Each run owns its inputs and outputs; independent pairs run in parallel
/// through `run_many` without any shared state.
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PairsError, Result};
use crate::metrics::{compute_metrics, drawdown, PerfReport, TRADING_DAYS_PER_YEAR};
use crate::models::{normalize, spread, split_train_test, zscore, DEFAULT_TRAIN_PCT};
use crate::returns::{compound_returns, extract_trades, log_returns, trade_returns, Trade};
use crate::series::{inner_join, TimeSeries};
use crate::signal::{generate_signal, Position, Thresholds};

/// Backtest run parameters.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestConfig {
    pub thresholds:    Thresholds,
    /// In-sample share used for normalisation and z-score statistics
    pub train_pct:     f64,
    /// Bars per year (for annualisation in metrics)
    pub bars_per_year: f64,
    /// Log every trade (true) or only the summary (false)
    pub verbose:       bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            thresholds:    Thresholds::default(),
            train_pct:     DEFAULT_TRAIN_PCT,
            bars_per_year: TRADING_DAYS_PER_YEAR,
            verbose:       false,
        }
    }
}

/// Close prices of one candidate pair.
#[derive(Debug, Clone)]
pub struct PairInput {
    pub ticker_x: String,
    pub ticker_y: String,
    pub x:        TimeSeries<f64>,
    pub y:        TimeSeries<f64>,
}

impl PairInput {
    pub fn label(&self) -> String {
        format!("{} X {}", self.ticker_x, self.ticker_y)
    }
}

/// Every intermediate series of one run, on one shared index.
#[derive(Debug, Clone, Serialize)]
pub struct PairBacktest {
    pub ticker_x:      String,
    pub ticker_y:      String,
    /// First out-of-sample date, `None` when the whole run is in-sample
    pub split_date:    Option<NaiveDate>,
    pub x_normalized:  TimeSeries<f64>,
    pub y_normalized:  TimeSeries<f64>,
    pub spread:        TimeSeries<f64>,
    pub zscore:        TimeSeries<f64>,
    pub signal:        TimeSeries<Position>,
    pub x_returns:     TimeSeries<f64>,
    pub y_returns:     TimeSeries<f64>,
    pub trade_returns: TimeSeries<f64>,
    pub cumulative:    TimeSeries<f64>,
    pub drawdown:      TimeSeries<f64>,
    pub trades:        Vec<Trade>,
    pub report:        PerfReport,
}

/// Run the full chain for one pair.
pub fn run_pair_backtest(input: &PairInput, cfg: &BacktestConfig) -> Result<PairBacktest> {
    let (x, y) = inner_join(&input.x, &input.y);
    let (dropped_x, dropped_y) = (input.x.len() - x.len(), input.y.len() - y.len());
    if dropped_x + dropped_y > 0 {
        warn!(
            "{}: dates not shared by both legs were dropped ({} from {}, {} from {})",
            input.label(),
            dropped_x,
            input.ticker_x,
            dropped_y,
            input.ticker_y
        );
    }
    if x.len() < 2 {
        return Err(PairsError::EmptyInput { what: "shared price history (need >= 2 dates)" });
    }

    // ── Normalise with in-sample statistics only ──────────────────────────
    let (x_train, x_test) = split_train_test(&x, cfg.train_pct)?;
    let (y_train, y_test) = split_train_test(&y, cfg.train_pct)?;
    let (x_train_n, x_test_n) = normalize(&x_train, &x_test)?;
    let (y_train_n, y_test_n) = normalize(&y_train, &y_test)?;

    // ── Spread and z-score ────────────────────────────────────────────────
    let spread_train = spread(&x_train_n, &y_train_n)?;
    let spread_test = spread(&x_test_n, &y_test_n)?;
    let (z_train, z_test) = zscore(&spread_train, &spread_test)?;

    let x_normalized = x_train_n.concat(&x_test_n)?;
    let y_normalized = y_train_n.concat(&y_test_n)?;
    let spread_all = spread_train.concat(&spread_test)?;
    let z = z_train.concat(&z_test)?;
    debug!(train = z_train.len(), test = z_test.len(), "z-score ready");

    // ── Signal and attribution ────────────────────────────────────────────
    let signal = generate_signal(&z, &cfg.thresholds)?;
    let x_returns = log_returns(&x)?;
    let y_returns = log_returns(&y)?;
    let trade_r = trade_returns(&signal, &x_returns, &y_returns)?;
    let cumulative = compound_returns(&trade_r)?;

    let simple = trade_r.map(|r| r.exp() - 1.0);
    let dd = drawdown(&simple, true, false)?;
    let trades = extract_trades(&signal, &trade_r)?;
    let report = compute_metrics(&trade_r, &cumulative, &trades, cfg.bars_per_year)?;

    if cfg.verbose {
        for t in &trades {
            info!(
                "  [{}] {:>5} {} → {}  bars={:<4} ret={:+.4}%",
                input.label(),
                t.direction,
                t.entry_date,
                t.exit_date.map_or_else(|| "open".to_string(), |d| d.to_string()),
                t.bars_held,
                t.simple_return() * 100.0
            );
        }
    }
    info!(
        "{}: {} bars, {} trades, total return {:.2}%",
        input.label(),
        report.n_bars,
        report.n_trades,
        report.total_return * 100.0
    );

    Ok(PairBacktest {
        ticker_x: input.ticker_x.clone(),
        ticker_y: input.ticker_y.clone(),
        split_date: z_test.first_date(),
        x_normalized,
        y_normalized,
        spread: spread_all,
        zscore: z,
        signal,
        x_returns,
        y_returns,
        trade_returns: trade_r,
        cumulative,
        drawdown: dd,
        trades,
        report,
    })
}

/// Outcome of one pair in a batch.
#[derive(Debug)]
pub struct PairOutcome {
    pub label:  String,
    pub result: Result<PairBacktest>,
}

/// Backtest independent pairs in parallel.  Output order follows input order.
pub fn run_many(inputs: Vec<PairInput>, cfg: &BacktestConfig) -> Vec<PairOutcome> {
    info!("Running {} pair backtests", inputs.len());
    inputs
        .into_par_iter()
        .map(|input| {
            let result = run_pair_backtest(&input, cfg);
            if let Err(e) = &result {
                warn!("{}: {} ({})", input.label(), e, e.kind());
            }
            PairOutcome { label: input.label(), result }
        })
        .collect()
}

/// Print the trade log (first `top_n` round trips).
pub fn print_trade_log(trades: &[Trade], top_n: usize) {
    println!(
        "\n{:<6} {:<7} {:<12} {:<12} {:<6} {:<10}",
        "N", "DIR", "ENTRY", "EXIT", "BARS", "RET%"
    );
    println!("{}", "─".repeat(57));

    for (i, t) in trades.iter().enumerate().take(top_n) {
        let exit = t.exit_date.map_or_else(|| "open".to_string(), |d| d.to_string());
        println!(
            "{:<6} {:<7} {:<12} {:<12} {:<6} {:<+10.4}",
            i + 1,
            t.direction.to_string(),
            t.entry_date.to_string(),
            exit,
            t.bars_held,
            t.simple_return() * 100.0,
        );
    }
}
