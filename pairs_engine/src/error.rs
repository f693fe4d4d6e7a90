/// error.rs - Error taxonomy for the pairs engine
///
/// Every fallible operation in the library returns `Result<T>`; no function
/// encodes failure as a numeric value.  The variants carry the offending
/// index or parameter so a failed run can be reported precisely.
use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PairsError>;

#[derive(Debug, Error)]
pub enum PairsError {
    /// Threshold pair rejected by the signal engine.
    #[error("invalid thresholds: open={open}, close={close} (need 0 <= close <= open)")]
    InvalidThresholds { open: f64, close: f64 },

    #[error("empty input: {what}")]
    EmptyInput { what: &'static str },

    /// Two series that must share an index do not.
    #[error("index mismatch between {left} and {right}: {detail}")]
    IndexMismatch {
        left:   &'static str,
        right:  &'static str,
        detail: String,
    },

    /// NaN/inf value, or a degenerate (zero range / zero variance) scaling.
    #[error("undefined value in {what} at index {index}{}", date_suffix(.date))]
    UndefinedValue {
        what:  &'static str,
        index: usize,
        date:  Option<NaiveDate>,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid ticker {0:?}")]
    InvalidTicker(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Failure reported by a data collaborator, surfaced unchanged.
    #[error("upstream data error: {0}")]
    UpstreamData(String),

    #[error("storage error: {0}")]
    Storage(String),
}

fn date_suffix(date: &Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!(" ({d})"),
        None => String::new(),
    }
}

impl PairsError {
    pub fn undefined(what: &'static str, index: usize, date: Option<NaiveDate>) -> Self {
        PairsError::UndefinedValue { what, index, date }
    }

    /// Short machine-readable kind, used by the CLI summary table.
    pub fn kind(&self) -> &'static str {
        match self {
            PairsError::InvalidThresholds { .. } => "InvalidThresholds",
            PairsError::EmptyInput { .. } => "EmptyInput",
            PairsError::IndexMismatch { .. } => "IndexMismatch",
            PairsError::UndefinedValue { .. } => "UndefinedValue",
            PairsError::InvalidParameter { .. } => "InvalidParameter",
            PairsError::InvalidTicker(_) => "InvalidTicker",
            PairsError::NotFound(_) => "NotFound",
            PairsError::UpstreamData(_) => "UpstreamDataError",
            PairsError::Storage(_) => "Storage",
        }
    }

    /// Reading a dataset that does not exist is recoverable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PairsError::NotFound(_))
    }
}

impl From<polars::prelude::PolarsError> for PairsError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        PairsError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for PairsError {
    fn from(e: std::io::Error) -> Self {
        PairsError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for PairsError {
    fn from(e: reqwest::Error) -> Self {
        PairsError::UpstreamData(e.to_string())
    }
}
