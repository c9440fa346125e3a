// Simple Moving Average (SMA) indicator implementation
use super::{closes, window_mean, IndicatorCalculator, IndicatorOutput, Period};
use crate::error::IndicatorError;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

pub struct Sma {
    name: String,
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        Ok(Self::with_period(Period::new("SMA", "period", period)?))
    }

    pub(crate) fn with_period(period: Period) -> Self {
        Self {
            name: format!("SMA({})", period),
            period: period.get(),
        }
    }

    pub fn series(&self, data: &[Candle]) -> IndicatorSeries {
        sma_values(&closes(data), self.period).into()
    }
}

/// Mean of each trailing `period`-long window; `None` until the first full window.
///
/// Every window is summed from scratch instead of sliding a running total, so
/// a value never carries rounding error from earlier windows.
pub(crate) fn sma_values(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                Some(window_mean(&values[i + 1 - period..=i]))
            }
        })
        .collect()
}

impl IndicatorCalculator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "period": self.period })
    }

    fn calculate(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError> {
        Ok(self.series(data).into())
    }
}
