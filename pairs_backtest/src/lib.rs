/// lib.rs - Pairs backtest front end
///
/// Report export shared by the `pairs_backtest` binary and its tests.

pub mod reporting;

pub use reporting::{ReportConfig, ReportGenerator};
