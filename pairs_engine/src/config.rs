/// config.rs - Centralised configuration loaded from .env
///
/// All parameters consumed by the pairs pipeline are defined here.
/// Loading happens once at startup; every module borrows &AppConfig.
/// The end date is optional: the caller (CLI) decides the default once.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;

use crate::data::DEFAULT_YAHOO_URL;
use crate::metrics::TRADING_DAYS_PER_YEAR;
use crate::models::DEFAULT_TRAIN_PCT;
use crate::signal::Thresholds;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Pair ─────────────────────────────────────────────────────────
    /// First (independent) leg, e.g. PETR4.SA
    pub ticker_x: String,
    /// Second (dependent) leg, e.g. ITSA4.SA
    pub ticker_y: String,

    // ── Date range ───────────────────────────────────────────────────
    pub start_date: NaiveDate,
    /// `None` → resolved by the caller
    pub end_date:   Option<NaiveDate>,

    // ── Signal band ──────────────────────────────────────────────────
    /// Enter when z <= −open or z >= +open  (default: 2.0 σ)
    pub open_threshold:  f64,
    /// Exit when the spread crosses back through ±close  (default: 0 σ)
    pub close_threshold: f64,

    // ── Split / annualisation ────────────────────────────────────────
    /// In-sample share of each price series
    pub train_pct:     f64,
    pub bars_per_year: f64,

    // ── Storage / endpoints ──────────────────────────────────────────
    pub data_dir:        PathBuf,
    pub report_dir:      PathBuf,
    pub yahoo_chart_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        let start_date = parse_date(
            "PAIRS_START_DATE",
            &env::var("PAIRS_START_DATE").unwrap_or_else(|_| "2021-01-01".into()),
        )?;
        let end_date = match env::var("PAIRS_END_DATE") {
            Ok(v) if !v.trim().is_empty() => Some(parse_date("PAIRS_END_DATE", &v)?),
            _ => None,
        };

        let cfg = Self {
            ticker_x: env::var("PAIRS_TICKER_X").unwrap_or_else(|_| "PETR4.SA".into()),
            ticker_y: env::var("PAIRS_TICKER_Y").unwrap_or_else(|_| "ITSA4.SA".into()),

            start_date,
            end_date,

            open_threshold:  parse_env("OPEN_THRESHOLD", 2.0)?,
            close_threshold: parse_env("CLOSE_THRESHOLD", 0.0)?,

            train_pct:     parse_env("TRAIN_PCT", DEFAULT_TRAIN_PCT)?,
            bars_per_year: parse_env("BARS_PER_YEAR", TRADING_DAYS_PER_YEAR)?,

            data_dir:   PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".into())),
            report_dir: PathBuf::from(env::var("REPORT_DIR").unwrap_or_else(|_| "./reports".into())),
            yahoo_chart_url: env::var("YAHOO_CHART_URL").unwrap_or_else(|_| DEFAULT_YAHOO_URL.into()),
        };
        cfg.thresholds()?;
        Ok(cfg)
    }

    /// Validated signal band.
    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.open_threshold, self.close_threshold)
            .context("OPEN_THRESHOLD / CLOSE_THRESHOLD")
    }
}

fn parse_date(key: &str, v: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Config key {key}: {e} (expected YYYY-MM-DD)"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Config key {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_to_default() {
        let v: f64 = parse_env("PAIRS_TEST_SURELY_UNSET_KEY", 1.5).unwrap();
        assert_eq!(v, 1.5);
    }

    #[test]
    fn parse_date_reports_key() {
        let err = parse_date("PAIRS_START_DATE", "01/02/2021").unwrap_err();
        assert!(err.to_string().contains("PAIRS_START_DATE"));
        assert_eq!(
            parse_date("K", " 2021-01-01 ").unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
        );
    }
}
