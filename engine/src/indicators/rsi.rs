// Relative Strength Index (RSI) indicator implementation
use super::{closes, IndicatorCalculator, IndicatorOutput, Period};
use crate::error::IndicatorError;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

pub struct Rsi {
    name: String,
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        Ok(Self::with_period(Period::new("RSI", "period", period)?))
    }

    pub(crate) fn with_period(period: Period) -> Self {
        Self {
            name: format!("RSI({})", period),
            period: period.get(),
        }
    }

    pub fn series(&self, data: &[Candle]) -> IndicatorSeries {
        rsi_values(&closes(data), self.period).into()
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // No losses in the window: avoid division by zero
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

/// Wilder RSI over close-to-close changes. The first value sits at index
/// `period` (the candle that completes the first `period` changes).
fn rsi_values(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || values.len() <= period {
        return vec![None; values.len()];
    }

    let mut results = vec![None; period];

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change; // losses are positive values
        }
    }

    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    results.push(Some(rsi_from_averages(avg_gain, avg_loss)));

    let smoothing = (period - 1) as f64;
    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (current_gain, current_loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };

        avg_gain = (avg_gain * smoothing + current_gain) / period as f64;
        avg_loss = (avg_loss * smoothing + current_loss) / period as f64;
        results.push(Some(rsi_from_averages(avg_gain, avg_loss)));
    }
    results
}

impl IndicatorCalculator for Rsi {
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
