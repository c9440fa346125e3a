use shared::SeriesError;
use thiserror::Error;

/// Errors raised by the indicator library.
///
/// These stay scoped to a single indicator: a bundle stores them next to the
/// successful outputs instead of failing as a whole.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Invalid parameter for {indicator}: {parameter} = {value}")]
    InvalidParameter {
        indicator: &'static str,
        parameter: &'static str,
        value: String,
    },

    #[error("{indicator} needs at least one candle")]
    EmptyInput { indicator: &'static str },

    #[error("Unknown indicator type: {0}")]
    UnknownIndicator(String),
}

impl IndicatorError {
    pub(crate) fn invalid(indicator: &'static str, parameter: &'static str, value: impl ToString) -> Self {
        IndicatorError::InvalidParameter {
            indicator,
            parameter,
            value: value.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("CSV parsing system error: {source}")]
    CsvSystemError {
        #[from]
        source: csv::Error,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("CSV data format error: {0}")]
    CsvDataFormatError(String),

    #[error("Market data store error: {0}")]
    MarketDataError(String),

    #[error("Indicator calculation error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Invalid candle series: {0}")]
    Series(#[from] SeriesError),

    /// The candle source could not supply a snapshot. Non-fatal to the
    /// coordinator, which keeps serving the last good bundle.
    #[error("Fetch failure: {0}")]
    FetchFailure(String),

    #[error("Recompute coordinator has shut down")]
    CoordinatorClosed,

    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the error only affects the current refresh cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::FetchFailure(_) | EngineError::IoError { .. } | EngineError::MarketDataError(_)
        )
    }
}
