/// reporting.rs - Chart frames and JSON report for a pair backtest
///
/// Writes the series a chart layer needs, one CSV per figure:
///   - `<base>_zscore.csv`      date, zscore, signal        (spread figure)
///   - `<base>_normalized.csv`  date, <x>, <y>              (normalised prices)
///   - `<base>_returns.csv`     date, trade_return, cumulative_return, drawdown
///   - `<base>_trades.csv`      one row per round trip
/// plus `<base>.json` with run metadata, parameters, metrics and trades.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use pairs_engine::backtest::{BacktestConfig, PairBacktest};
use pairs_engine::metrics::PerfReport;
use pairs_engine::returns::Trade;

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub run_id:       Uuid,
    pub generated_at: DateTime<Utc>,
    pub ticker_x:     String,
    pub ticker_y:     String,
    pub start_date:   Option<NaiveDate>,
    pub end_date:     Option<NaiveDate>,
    pub split_date:   Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport<'a> {
    pub metadata:    ReportMetadata,
    pub parameters:  &'a BacktestConfig,
    pub performance: &'a PerfReport,
    pub trades:      &'a [Trade],
}

/// Report generator configuration
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Export chart frames to CSV
    pub export_csv:  bool,
    /// Export to JSON
    pub export_json: bool,
    /// Output directory
    pub output_dir:  PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            export_csv:  true,
            export_json: true,
            output_dir:  PathBuf::from("./reports"),
        }
    }
}

pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Export every requested artefact; returns the written paths.
    pub fn export(&self, bt: &PairBacktest, params: &BacktestConfig) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.config.output_dir)?;

        let metadata = ReportMetadata {
            run_id:       Uuid::new_v4(),
            generated_at: Utc::now(),
            ticker_x:     bt.ticker_x.clone(),
            ticker_y:     bt.ticker_y.clone(),
            start_date:   bt.zscore.first_date(),
            end_date:     bt.zscore.last_date(),
            split_date:   bt.split_date,
        };
        let base_name = format!(
            "{}_{}_{}",
            bt.ticker_x,
            bt.ticker_y,
            metadata.generated_at.format("%Y%m%d_%H%M%S")
        );
        let mut written = Vec::new();

        if self.config.export_csv {
            for (suffix, mut frame) in [
                ("zscore", zscore_frame(bt)?),
                ("normalized", normalized_frame(bt)?),
                ("returns", returns_frame(bt)?),
                ("trades", trades_frame(&bt.trades)?),
            ] {
                let path = self.config.output_dir.join(format!("{base_name}_{suffix}.csv"));
                write_csv(&path, &mut frame)?;
                written.push(path);
            }
        }

        if self.config.export_json {
            let report = BacktestReport {
                metadata,
                parameters:  params,
                performance: &bt.report,
                trades:      &bt.trades,
            };
            let path = self.config.output_dir.join(format!("{base_name}.json"));
            fs::write(&path, serde_json::to_string_pretty(&report)?)?;
            info!("JSON report exported to: {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

fn write_csv(path: &Path, frame: &mut DataFrame) -> Result<()> {
    let mut file = fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)?;
    info!("CSV exported to: {}", path.display());
    Ok(())
}

fn date_strings(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

/// Spread figure: z-score with the position overlaid.
pub fn zscore_frame(bt: &PairBacktest) -> Result<DataFrame> {
    let signal: Vec<i32> = bt.signal.values().iter().map(|p| i32::from(p.as_i8())).collect();
    Ok(df!(
        "date" => date_strings(bt.zscore.index()),
        "zscore" => bt.zscore.values().to_vec(),
        "signal" => signal,
    )?)
}

/// Normalised prices of both legs, one column per ticker.
pub fn normalized_frame(bt: &PairBacktest) -> Result<DataFrame> {
    if bt.ticker_x == bt.ticker_y {
        bail!("both legs are {}", bt.ticker_x);
    }
    Ok(df!(
        "date" => date_strings(bt.x_normalized.index()),
        bt.ticker_x.as_str() => bt.x_normalized.values().to_vec(),
        bt.ticker_y.as_str() => bt.y_normalized.values().to_vec(),
    )?)
}

/// Profit figure: per-step and cumulative return with drawdown.
pub fn returns_frame(bt: &PairBacktest) -> Result<DataFrame> {
    Ok(df!(
        "date" => date_strings(bt.cumulative.index()),
        "trade_return" => bt.trade_returns.values().to_vec(),
        "cumulative_return" => bt.cumulative.values().to_vec(),
        "drawdown" => bt.drawdown.values().to_vec(),
    )?)
}

pub fn trades_frame(trades: &[Trade]) -> Result<DataFrame> {
    Ok(df!(
        "direction" => trades.iter().map(|t| t.direction.to_string()).collect::<Vec<_>>(),
        "entry_date" => trades.iter().map(|t| t.entry_date.to_string()).collect::<Vec<_>>(),
        "exit_date" => trades.iter().map(|t| t.exit_date.map(|d| d.to_string())).collect::<Vec<_>>(),
        "bars_held" => trades.iter().map(|t| t.bars_held as u32).collect::<Vec<_>>(),
        "log_return" => trades.iter().map(|t| t.log_return).collect::<Vec<_>>(),
        "return" => trades.iter().map(Trade::simple_return).collect::<Vec<_>>(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairs_engine::backtest::{PairInput, run_pair_backtest};
    use pairs_engine::TimeSeries;

    fn backtest() -> PairBacktest {
        let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let dates: Vec<NaiveDate> = (0..60).map(|i| start + chrono::Duration::days(i)).collect();
        let x: Vec<f64> = (0..60).map(|t| 20.0 + (t as f64 / 4.0).sin()).collect();
        let y: Vec<f64> = (0..60).map(|t| 10.0 + 0.05 * t as f64).collect();
        let input = PairInput {
            ticker_x: "PETR4.SA".into(),
            ticker_y: "ITSA4.SA".into(),
            x: TimeSeries::new(dates.clone(), x).unwrap(),
            y: TimeSeries::new(dates, y).unwrap(),
        };
        run_pair_backtest(&input, &BacktestConfig::default()).unwrap()
    }

    #[test]
    fn frames_have_one_row_per_date() {
        let bt = backtest();
        assert_eq!(zscore_frame(&bt).unwrap().shape(), (60, 3));
        assert_eq!(returns_frame(&bt).unwrap().shape(), (60, 4));

        let norm = normalized_frame(&bt).unwrap();
        let names: Vec<String> = norm.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["date", "PETR4.SA", "ITSA4.SA"]);
    }

    #[test]
    fn export_writes_csv_and_json() {
        let dir = std::env::temp_dir().join(format!("pairs_reports_{}", Uuid::new_v4()));
        let generator = ReportGenerator::new(ReportConfig { output_dir: dir.clone(), ..Default::default() });
        let written = generator.export(&backtest(), &BacktestConfig::default()).unwrap();
        assert_eq!(written.len(), 5);
        assert!(written.iter().all(|p| p.is_file()));

        let json = fs::read_to_string(written.last().unwrap()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["metadata"]["ticker_x"], "PETR4.SA");
        assert_eq!(v["parameters"]["thresholds"]["open"], 2.0);

        fs::remove_dir_all(dir).ok();
    }
}
