/// main.rs - Pairs backtest command line
///
/// Fetches daily closes, runs the pairs pipeline and exports chart frames.
///
/// Usage:
///   cargo run --bin pairs_backtest -- run --x PETR4.SA --y ITSA4.SA
///   cargo run --bin pairs_backtest -- fetch --tickers PETR4.SA,ITSA4.SA,VALE3.SA
///   cargo run --bin pairs_backtest -- scan --tickers PETR4.SA,ITSA4.SA,VALE3.SA --top 5
///   cargo run --bin pairs_backtest -- batch --pairs PETR4.SA:ITSA4.SA,VALE3.SA:BBAS3.SA
///   cargo run --bin pairs_backtest -- --help
use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pairs_backtest::{ReportConfig, ReportGenerator};
use pairs_engine::backtest::{BacktestConfig, PairInput, print_trade_log, run_many, run_pair_backtest};
use pairs_engine::config::AppConfig;
use pairs_engine::data::{PriceSource, StoreSource, YahooDataClient};
use pairs_engine::models::{normalize, rank_pairs, split_train_test};
use pairs_engine::store::DataStore;
use pairs_engine::{Thresholds, TimeSeries};

#[derive(Parser)]
#[command(name = "pairs_backtest")]
#[command(about = "Pairs trading backtest - normalised spread, z-score band, lagged attribution")]
#[command(version)]
pub struct Cli {
    /// Extra .env file loaded before the process environment
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backtest one pair and export its report
    Run {
        /// First leg (defaults to PAIRS_TICKER_X)
        #[arg(short, long)]
        x: Option<String>,

        /// Second leg (defaults to PAIRS_TICKER_Y)
        #[arg(short, long)]
        y: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: Option<NaiveDate>,

        /// End date, exclusive (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        end: Option<NaiveDate>,

        /// Entry band in standard deviations
        #[arg(long)]
        open: Option<f64>,

        /// Exit band in standard deviations
        #[arg(long)]
        close: Option<f64>,

        /// In-sample share of the history
        #[arg(long)]
        train_pct: Option<f64>,

        /// Output directory for reports
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Read prices from stored datasets instead of Yahoo
        #[arg(long)]
        offline: bool,

        /// Store fetched prices in the data directory
        #[arg(long)]
        save: bool,

        /// Log every trade
        #[arg(short, long)]
        verbose: bool,
    },

    /// Download closes and store them as datasets
    Fetch {
        #[arg(short, long, value_delimiter = ',', required = true)]
        tickers: Vec<String>,

        #[arg(short, long)]
        start: Option<NaiveDate>,

        #[arg(short, long)]
        end: Option<NaiveDate>,
    },

    /// Rank candidate pairs by in-sample distance
    Scan {
        #[arg(short, long, value_delimiter = ',', required = true)]
        tickers: Vec<String>,

        #[arg(long, default_value = "10")]
        top: usize,

        #[arg(short, long)]
        start: Option<NaiveDate>,

        #[arg(short, long)]
        end: Option<NaiveDate>,

        #[arg(long)]
        offline: bool,
    },

    /// Backtest several pairs in parallel (X:Y,X:Y,...)
    Batch {
        #[arg(short, long, value_delimiter = ',', required = true)]
        pairs: Vec<String>,

        #[arg(short, long)]
        start: Option<NaiveDate>,

        #[arg(short, long)]
        end: Option<NaiveDate>,

        #[arg(long)]
        offline: bool,

        /// Export a report for every successful pair
        #[arg(long)]
        export: bool,
    },

    /// List stored datasets
    Datasets,
}

/// Price source chosen at the command line.
enum Source {
    Yahoo(YahooDataClient),
    Store(StoreSource),
}

impl PriceSource for Source {
    async fn get_close_price(
        &self,
        ticker: &str,
        start:  NaiveDate,
        end:    NaiveDate,
    ) -> pairs_engine::Result<TimeSeries<f64>> {
        match self {
            Source::Yahoo(s) => s.get_close_price(ticker, start, end).await,
            Source::Store(s) => s.get_close_price(ticker, start, end).await,
        }
    }
}

async fn load<S: PriceSource>(
    source: &S,
    ticker: &str,
    start:  NaiveDate,
    end:    NaiveDate,
) -> Result<TimeSeries<f64>> {
    source
        .get_close_price(ticker, start, end)
        .await
        .with_context(|| format!("loading {ticker} [{start}, {end})"))
}

/// Main application
pub struct PairsApp {
    cfg:   AppConfig,
    store: DataStore,
}

impl PairsApp {
    pub fn new(cfg: AppConfig) -> Self {
        let store = DataStore::new(cfg.data_dir.clone());
        Self { cfg, store }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run { x, y, start, end, open, close, train_pct, out, offline, save, verbose } => {
                let thresholds = Thresholds::new(
                    open.unwrap_or(self.cfg.open_threshold),
                    close.unwrap_or(self.cfg.close_threshold),
                )?;
                let bt_cfg = BacktestConfig {
                    thresholds,
                    train_pct: train_pct.unwrap_or(self.cfg.train_pct),
                    bars_per_year: self.cfg.bars_per_year,
                    verbose,
                };
                let x = x.unwrap_or_else(|| self.cfg.ticker_x.clone());
                let y = y.unwrap_or_else(|| self.cfg.ticker_y.clone());
                let out = out.unwrap_or_else(|| self.cfg.report_dir.clone());
                self.run_pair(&x, &y, start, end, bt_cfg, out, offline, save).await
            }
            Commands::Fetch { tickers, start, end } => self.fetch(&tickers, start, end).await,
            Commands::Scan { tickers, top, start, end, offline } => {
                self.scan(&tickers, top, start, end, offline).await
            }
            Commands::Batch { pairs, start, end, offline, export } => {
                self.batch(&pairs, start, end, offline, export).await
            }
            Commands::Datasets => self.datasets(),
        }
    }

    fn source(&self, offline: bool) -> Result<Source> {
        Ok(if offline {
            Source::Store(StoreSource::new(self.store.clone()))
        } else {
            Source::Yahoo(YahooDataClient::new(&self.cfg.yahoo_chart_url)?)
        })
    }

    /// CLI dates override the config; the open end defaults to today.
    fn range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(NaiveDate, NaiveDate)> {
        let start = start.unwrap_or(self.cfg.start_date);
        let end = end.or(self.cfg.end_date).unwrap_or_else(|| Utc::now().date_naive());
        if start >= end {
            bail!("start date {start} must be before end date {end}");
        }
        Ok((start, end))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pair(
        &self,
        x: &str,
        y: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        bt_cfg: BacktestConfig,
        out: PathBuf,
        offline: bool,
        save: bool,
    ) -> Result<()> {
        if x == y {
            bail!("both legs are {x}; pick two different tickers");
        }
        let (start, end) = self.range(start, end)?;
        info!("Pair: {} X {}", x, y);
        info!("Period: {} to {} (exclusive)", start, end);
        info!(
            "Band: open ±{:.2}σ, close ±{:.2}σ, train {:.0}%",
            bt_cfg.thresholds.open(),
            bt_cfg.thresholds.close(),
            bt_cfg.train_pct * 100.0
        );

        let source = self.source(offline)?;
        let (px, py) = tokio::try_join!(load(&source, x, start, end), load(&source, y, start, end))?;
        if save && !offline {
            self.store.export(x, &px)?;
            self.store.export(y, &py)?;
        }

        let input = PairInput { ticker_x: x.to_string(), ticker_y: y.to_string(), x: px, y: py };
        let bt = run_pair_backtest(&input, &bt_cfg)?;

        println!("\n{}", bt.report);
        print_trade_log(&bt.trades, 20);

        let generator = ReportGenerator::new(ReportConfig { output_dir: out, ..Default::default() });
        let written = generator.export(&bt, &bt_cfg)?;
        info!("{} report files written", written.len());
        Ok(())
    }

    async fn fetch(&self, tickers: &[String], start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
        let (start, end) = self.range(start, end)?;
        let client = YahooDataClient::new(&self.cfg.yahoo_chart_url)?;
        let mut failed = 0usize;

        for ticker in tickers {
            match load(&client, ticker, start, end).await {
                Ok(series) => {
                    println!("{}", save_series(&self.store, ticker, &series)?);
                }
                Err(e) => {
                    failed += 1;
                    warn!("{:#}", e);
                }
            }
        }
        if failed == tickers.len() {
            bail!("no ticker could be fetched");
        }
        Ok(())
    }

    async fn scan(
        &self,
        tickers: &[String],
        top: usize,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        offline: bool,
    ) -> Result<()> {
        let (start, end) = self.range(start, end)?;
        let source = self.source(offline)?;

        let mut legs = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            match load(&source, ticker, start, end).await {
                Ok(series) => legs.push((ticker.clone(), series)),
                Err(e) => warn!("skipping {}: {:#}", ticker, e),
            }
        }

        // In-sample normalised closes on the dates every leg shares
        let mut universe = Vec::with_capacity(legs.len());
        for (ticker, series) in align_universe(&legs)? {
            let (train, test) = split_train_test(&series, self.cfg.train_pct)?;
            match normalize(&train, &test) {
                Ok((train_n, _)) => universe.push((ticker, train_n)),
                Err(e) => warn!("skipping {}: {}", ticker, e),
            }
        }

        let ranked = rank_pairs(&universe, top)?;
        println!("\n{:<4} {:<12} {:<12} {:>10} {:>8}", "N", "X", "Y", "DISTANCE", "CORR");
        println!("{}", "─".repeat(50));
        for (i, c) in ranked.iter().enumerate() {
            println!("{:<4} {:<12} {:<12} {:>10.4} {:>8.3}", i + 1, c.x, c.y, c.distance, c.correlation);
        }
        Ok(())
    }

    async fn batch(
        &self,
        pairs: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        offline: bool,
        export: bool,
    ) -> Result<()> {
        let (start, end) = self.range(start, end)?;
        let source = self.source(offline)?;
        let bt_cfg = BacktestConfig {
            thresholds:    self.cfg.thresholds()?,
            train_pct:     self.cfg.train_pct,
            bars_per_year: self.cfg.bars_per_year,
            verbose:       false,
        };

        let mut inputs = Vec::with_capacity(pairs.len());
        for spec in pairs {
            let (x, y) = parse_pair(spec)?;
            let (px, py) = tokio::try_join!(load(&source, x, start, end), load(&source, y, start, end))?;
            inputs.push(PairInput { ticker_x: x.to_string(), ticker_y: y.to_string(), x: px, y: py });
        }

        let cfg = bt_cfg.clone();
        let outcomes = tokio::task::spawn_blocking(move || run_many(inputs, &cfg)).await?;

        println!(
            "\n{:<26} {:>7} {:>9} {:>8} {:>8} {:>8}",
            "PAIR", "TRADES", "RETURN%", "SHARPE", "MAXDD%", "WIN%"
        );
        println!("{}", "─".repeat(71));
        let generator = ReportGenerator::new(ReportConfig {
            output_dir: self.cfg.report_dir.clone(),
            ..Default::default()
        });
        for outcome in &outcomes {
            match &outcome.result {
                Ok(bt) => {
                    let r = &bt.report;
                    println!(
                        "{:<26} {:>7} {:>+9.2} {:>8.2} {:>8.2} {:>8.1}",
                        outcome.label,
                        r.n_trades,
                        r.total_return * 100.0,
                        r.sharpe,
                        r.max_drawdown * 100.0,
                        r.win_rate * 100.0
                    );
                    if export {
                        generator.export(bt, &bt_cfg)?;
                    }
                }
                Err(e) => println!("{:<26} {} ({})", outcome.label, e.kind(), e),
            }
        }
        Ok(())
    }

    fn datasets(&self) -> Result<()> {
        let names = self.store.list()?;
        if names.is_empty() {
            println!("No datasets in {}", self.store.dir().display());
        }
        for name in names {
            println!("{name}");
        }
        Ok(())
    }
}

/// Persist one fetched series and describe what happened to the dataset.
fn save_series(store: &DataStore, ticker: &str, series: &TimeSeries<f64>) -> Result<String> {
    let action = if store.exists(ticker) { "updated" } else { "created" };
    let total = store.export(ticker, series)?;
    Ok(format!("{:<12} {:>6} rows fetched, {:>6} stored ({action})", ticker, series.len(), total))
}

/// `X:Y` into its two legs.
fn parse_pair(spec: &str) -> Result<(&str, &str)> {
    let (x, y) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("pair {spec:?} must look like X:Y"))?;
    let (x, y) = (x.trim(), y.trim());
    if x.is_empty() || y.is_empty() || x == y {
        bail!("pair {spec:?} needs two different tickers");
    }
    Ok((x, y))
}

/// Restrict every series to the dates all of them share.
fn align_universe(legs: &[(String, TimeSeries<f64>)]) -> Result<Vec<(String, TimeSeries<f64>)>> {
    let mut common: Option<BTreeSet<NaiveDate>> = None;
    for (_, s) in legs {
        let dates: BTreeSet<NaiveDate> = s.index().iter().copied().collect();
        common = Some(match common {
            Some(c) => c.intersection(&dates).copied().collect(),
            None => dates,
        });
    }
    let common = common.unwrap_or_default();

    legs.iter()
        .map(|(ticker, s)| {
            let (index, values): (Vec<_>, Vec<_>) = s
                .iter()
                .filter(|(d, _)| common.contains(d))
                .map(|(d, v)| (d, *v))
                .unzip();
            Ok((ticker.clone(), TimeSeries::new(index, values)?))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenvy::from_filename(path).with_context(|| format!("loading {}", path.display()))?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cfg = AppConfig::from_env()?;
    let app = PairsApp::new(cfg);

    if let Err(e) = app.run(cli.command).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_on(days: &[u32], value: f64) -> TimeSeries<f64> {
        let index = days.iter().map(|d| NaiveDate::from_ymd_opt(2021, 1, *d).unwrap()).collect();
        TimeSeries::new(index, vec![value; days.len()]).unwrap()
    }

    #[test]
    fn save_series_reports_created_then_updated() {
        let dir = std::env::temp_dir().join(format!("pairs_cli_{}", uuid::Uuid::new_v4()));
        let store = DataStore::new(&dir);
        let first = series_on(&[4, 5], 10.0);
        let second = series_on(&[6], 11.0);

        let line = save_series(&store, "PETR4.SA", &first).unwrap();
        assert!(line.ends_with("(created)"), "{line}");
        let line = save_series(&store, "PETR4.SA", &second).unwrap();
        assert!(line.ends_with("(updated)"), "{line}");
        assert_eq!(store.import("PETR4.SA").unwrap().len(), 3);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn parse_pair_splits_on_colon() {
        assert_eq!(parse_pair("PETR4.SA:ITSA4.SA").unwrap(), ("PETR4.SA", "ITSA4.SA"));
        assert!(parse_pair("PETR4.SA").is_err());
        assert!(parse_pair("PETR4.SA:PETR4.SA").is_err());
    }

    #[test]
    fn align_universe_keeps_shared_dates() {
        let legs = vec![
            ("A".to_string(), series_on(&[4, 5, 6, 7], 1.0)),
            ("B".to_string(), series_on(&[5, 6, 7, 8], 2.0)),
            ("C".to_string(), series_on(&[4, 6, 7], 3.0)),
        ];
        let aligned = align_universe(&legs).unwrap();
        for (_, s) in &aligned {
            assert_eq!(s.len(), 2);
            assert_eq!(s.first_date(), NaiveDate::from_ymd_opt(2021, 1, 6));
        }
    }

    #[test]
    fn cli_parses_run_and_batch() {
        let cli = Cli::try_parse_from(["pairs_backtest", "run", "--x", "PETR4.SA", "--open", "1.5"]).unwrap();
        match cli.command {
            Commands::Run { x, open, .. } => {
                assert_eq!(x.as_deref(), Some("PETR4.SA"));
                assert_eq!(open, Some(1.5));
            }
            _ => panic!("expected run"),
        }

        let cli = Cli::try_parse_from(["pairs_backtest", "batch", "--pairs", "A:B,C:D"]).unwrap();
        match cli.command {
            Commands::Batch { pairs, .. } => assert_eq!(pairs, vec!["A:B", "C:D"]),
            _ => panic!("expected batch"),
        }
    }
}
