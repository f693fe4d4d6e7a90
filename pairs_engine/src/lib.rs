/// pairs_engine - Pairs trading research engine
///
/// Normalises two close-price series, standardises their spread, turns the
/// z-score into a Long / Flat / Short position with a threshold state
/// machine, and attributes leg returns to the lagged position.
pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod models;
pub mod returns;
pub mod series;
pub mod signal;
pub mod store;

pub use error::{PairsError, Result};
pub use series::TimeSeries;
pub use signal::{Position, Thresholds};
