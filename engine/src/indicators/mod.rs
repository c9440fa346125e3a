// Technical indicators module
//
// Every calculator is a pure function of the candle slice it is given: no
// shared state, no I/O, and the same input always yields bit-identical output.
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod spec;
pub mod support_resistance;
pub mod vwap;

pub use bollinger::{Bollinger, BollingerOutput};
pub use ema::Ema;
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use sma::Sma;
pub use spec::{BollingerParams, IndicatorDefaults, IndicatorSpec, MacdParams, Multiplier, Period};
pub use support_resistance::{SupportResistance, SupportResistanceLevels};
pub use vwap::Vwap;

use crate::error::IndicatorError;
use serde::Serialize;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

// Common trait for all indicators
pub trait IndicatorCalculator: Send + Sync {
    fn name(&self) -> &str;
    fn parameters(&self) -> Value; // Parameters used for this indicator instance
    fn calculate(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError>;
}

/// Result of one indicator computation, index-aligned with the input candles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum IndicatorOutput {
    Line { values: IndicatorSeries },
    Macd(MacdOutput),
    Bands(BollingerOutput),
    Levels(SupportResistanceLevels),
}

impl IndicatorOutput {
    pub fn as_line(&self) -> Option<&IndicatorSeries> {
        match self {
            IndicatorOutput::Line { values } => Some(values),
            _ => None,
        }
    }

    pub fn as_macd(&self) -> Option<&MacdOutput> {
        match self {
            IndicatorOutput::Macd(out) => Some(out),
            _ => None,
        }
    }

    pub fn as_bands(&self) -> Option<&BollingerOutput> {
        match self {
            IndicatorOutput::Bands(out) => Some(out),
            _ => None,
        }
    }

    pub fn as_levels(&self) -> Option<&SupportResistanceLevels> {
        match self {
            IndicatorOutput::Levels(out) => Some(out),
            _ => None,
        }
    }
}

impl From<IndicatorSeries> for IndicatorOutput {
    fn from(values: IndicatorSeries) -> Self {
        IndicatorOutput::Line { values }
    }
}

pub(crate) fn closes(data: &[Candle]) -> Vec<f64> {
    data.iter().map(|c| c.close).collect()
}

/// Arithmetic mean, summed left to right so the result is reproducible.
pub(crate) fn window_mean(window: &[f64]) -> f64 {
    window.iter().sum::<f64>() / window.len() as f64
}
