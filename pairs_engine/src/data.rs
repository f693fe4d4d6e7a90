/// data.rs - Daily close price collaborators
///
/// `PriceSource` is the seam the pipeline fetches through.  Two sources ship:
///   - `YahooDataClient`: Yahoo Finance chart endpoint, adjusted daily close
///   - `StoreSource`:     datasets previously written by `DataStore`
///
/// The date range is `[start, end)`; callers decide the end date, there is
/// no implicit "today" in the library.
use std::future::Future;

use chrono::{DateTime, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;
use crate::store::DataStore;

pub const DEFAULT_YAHOO_URL: &str = "https://query1.finance.yahoo.com";

pub trait PriceSource {
    fn get_close_price(
        &self,
        ticker: &str,
        start:  NaiveDate,
        end:    NaiveDate,
    ) -> impl Future<Output = Result<TimeSeries<f64>>> + Send;
}

/// Accept exchange symbols such as `PETR4.SA`, `^BVSP`, `BRL=X`, `BRK-B`.
pub fn validate_ticker(ticker: &str) -> Result<()> {
    let ok = !ticker.is_empty()
        && ticker.len() <= 32
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '_'));
    if ok { Ok(()) } else { Err(PairsError::InvalidTicker(ticker.to_owned())) }
}

fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start >= end {
        return Err(PairsError::InvalidParameter {
            name:   "date range",
            reason: format!("start {start} must precede end {end}"),
        });
    }
    Ok(())
}

fn not_found(ticker: &str) -> PairsError {
    if ticker.contains('.') {
        PairsError::NotFound(format!("no prices for {ticker}"))
    } else {
        PairsError::NotFound(format!(
            "no prices for {ticker} (exchange suffix missing? e.g. PETR4 is PETR4.SA)"
        ))
    }
}

// ── Yahoo Finance ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error:  Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code:        String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp:  Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote:    Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooDataClient {
    client:   Client,
    base_url: String,
}

impl YahooDataClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) pairs_engine/0.1")
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        let p1 = start.and_hms_opt(0, 0, 0).map_or(0, |d| d.and_utc().timestamp());
        let p2 = end.and_hms_opt(0, 0, 0).map_or(0, |d| d.and_utc().timestamp());
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%2Csplit&includeAdjustedClose=true",
            self.base_url, ticker, p1, p2
        )
    }
}

impl PriceSource for YahooDataClient {
    async fn get_close_price(
        &self,
        ticker: &str,
        start:  NaiveDate,
        end:    NaiveDate,
    ) -> Result<TimeSeries<f64>> {
        validate_ticker(ticker)?;
        validate_range(start, end)?;

        let url = self.chart_url(ticker, start, end);
        info!("Fetching {} daily closes {} → {}", ticker, start, end);
        debug!(%url, "chart request");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(not_found(ticker));
        }
        if !status.is_success() {
            return Err(PairsError::UpstreamData(format!("{ticker}: HTTP {status}")));
        }
        let body = response.text().await?;
        let series = parse_chart(ticker, &body)?;
        // period2 is exclusive, Yahoo sometimes returns the bar at `end` anyway
        let (index, values): (Vec<_>, Vec<_>) = series
            .iter()
            .filter(|(d, _)| *d >= start && *d < end)
            .map(|(d, v)| (d, *v))
            .unzip();
        if index.is_empty() {
            return Err(not_found(ticker));
        }
        info!("Loaded {} bars for {}", index.len(), ticker);
        TimeSeries::new(index, values)
    }
}

/// Parse a chart payload into a daily close series.
///
/// Adjusted close is preferred over raw close.  Rows without a price are
/// dropped, as are repeated dates (intraday duplicates of the last bar).
pub fn parse_chart(ticker: &str, body: &str) -> Result<TimeSeries<f64>> {
    let payload: ChartResponse = serde_json::from_str(body)
        .map_err(|e| PairsError::UpstreamData(format!("{ticker}: bad chart payload: {e}")))?;

    if let Some(err) = payload.chart.error {
        if err.code.eq_ignore_ascii_case("not found") {
            return Err(not_found(ticker));
        }
        return Err(PairsError::UpstreamData(format!(
            "{ticker}: {} {}",
            err.code,
            err.description.unwrap_or_default()
        )));
    }

    let result = payload
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
        .ok_or_else(|| not_found(ticker))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let closes = match result.indicators.adjclose.and_then(|mut a| a.pop()) {
        Some(adj) => adj.adjclose,
        None => result
            .indicators
            .quote
            .into_iter()
            .next()
            .and_then(|q| q.close)
            .unwrap_or_default(),
    };
    if closes.len() != timestamps.len() {
        return Err(PairsError::UpstreamData(format!(
            "{ticker}: {} timestamps vs {} closes",
            timestamps.len(),
            closes.len()
        )));
    }

    let mut index: Vec<NaiveDate> = Vec::with_capacity(timestamps.len());
    let mut values = Vec::with_capacity(timestamps.len());
    let mut dropped = 0usize;

    for (ts, close) in timestamps.into_iter().zip(closes) {
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|d| d.date_naive()) else {
            dropped += 1;
            continue;
        };
        match close {
            Some(p) if p.is_finite() && index.last().map_or(true, |last| date > *last) => {
                index.push(date);
                values.push(p);
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("{}: dropped {} rows with missing price or repeated date", ticker, dropped);
    }
    if index.is_empty() {
        return Err(not_found(ticker));
    }
    TimeSeries::new(index, values)
}

// ── Stored datasets ───────────────────────────────────────────────────────

/// Serves prices from `DataStore` datasets named after the ticker.
pub struct StoreSource {
    store: DataStore,
}

impl StoreSource {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }
}

impl PriceSource for StoreSource {
    async fn get_close_price(
        &self,
        ticker: &str,
        start:  NaiveDate,
        end:    NaiveDate,
    ) -> Result<TimeSeries<f64>> {
        validate_ticker(ticker)?;
        validate_range(start, end)?;
        let full = self.store.import(ticker)?;
        let (index, values): (Vec<_>, Vec<_>) = full
            .iter()
            .filter(|(d, _)| *d >= start && *d < end)
            .map(|(d, v)| (d, *v))
            .unzip();
        if index.is_empty() {
            return Err(not_found(ticker));
        }
        TimeSeries::new(index, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"chart":{"result":[{"meta":{"symbol":"PETR4.SA"},
        "timestamp":[1609761600,1609848000,1609934400,1610020800],
        "indicators":{"quote":[{"close":[28.9,29.5,null,30.1]}],
        "adjclose":[{"adjclose":[20.1,20.5,null,21.0]}]}}],"error":null}}"#;

    #[test]
    fn parses_adjusted_close_and_drops_nulls() {
        let s = parse_chart("PETR4.SA", BODY).unwrap();
        assert_eq!(s.values(), &[20.1, 20.5, 21.0]);
        assert_eq!(s.first_date(), NaiveDate::from_ymd_opt(2021, 1, 4));
        assert_eq!(s.last_date(), NaiveDate::from_ymd_opt(2021, 1, 7));
    }

    #[test]
    fn falls_back_to_raw_close() {
        let body = r#"{"chart":{"result":[{"timestamp":[1609761600,1609848000],
            "indicators":{"quote":[{"close":[1.5,1.6]}]}}],"error":null}}"#;
        assert_eq!(parse_chart("X.SA", body).unwrap().values(), &[1.5, 1.6]);
    }

    #[test]
    fn chart_error_not_found_maps_to_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("PETR4", body).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("PETR4.SA"), "{err}");
    }

    #[test]
    fn malformed_payload_is_upstream_error() {
        assert_eq!(parse_chart("A", "<html>").unwrap_err().kind(), "UpstreamDataError");
    }

    #[test]
    fn ticker_validation() {
        for ok in ["PETR4.SA", "^BVSP", "BRL=X", "BRK-B"] {
            assert!(validate_ticker(ok).is_ok(), "{ok}");
        }
        for bad in ["", "PETR4 SA", "a/b"] {
            assert!(matches!(validate_ticker(bad), Err(PairsError::InvalidTicker(_))), "{bad}");
        }
    }

    #[test]
    fn chart_url_uses_exclusive_end() {
        let c = YahooDataClient::new("http://localhost/").unwrap();
        let url = c.chart_url(
            "ITSA4.SA",
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 2).unwrap(),
        );
        assert!(url.starts_with("http://localhost/v8/finance/chart/ITSA4.SA?period1=1609459200&period2=1609545600"));
    }

    #[tokio::test]
    async fn store_source_serves_half_open_range() {
        let dir = std::env::temp_dir().join(format!("pairs_source_{}", uuid::Uuid::new_v4()));
        let store = DataStore::new(&dir);
        store.export("VALE3.SA", &crate::series::series(&[60.0, 61.0, 62.0, 63.0])).unwrap();
        let source = StoreSource::new(store);

        let d = crate::series::dates(4);
        let s = source.get_close_price("VALE3.SA", d[1], d[3]).await.unwrap();
        assert_eq!(s.values(), &[61.0, 62.0]);

        let err = source.get_close_price("BBAS3.SA", d[0], d[3]).await.unwrap_err();
        assert!(err.is_not_found());

        std::fs::remove_dir_all(dir).ok();
    }
}
