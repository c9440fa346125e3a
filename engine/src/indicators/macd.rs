// Moving Average Convergence Divergence (MACD) indicator implementation
use super::ema::ema_values;
use super::{closes, IndicatorCalculator, IndicatorOutput, MacdParams, Period};
use crate::error::IndicatorError;
use serde::Serialize;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

/// The three MACD lines, each index-aligned with the input candles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdOutput {
    pub macd: IndicatorSeries,
    pub signal: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

pub struct Macd {
    name: String,
    params: MacdParams,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self, IndicatorError> {
        Ok(Self::with_params(MacdParams {
            fast: Period::new("MACD", "fast", fast)?,
            slow: Period::new("MACD", "slow", slow)?,
            signal: Period::new("MACD", "signal", signal)?,
        }))
    }

    pub(crate) fn with_params(params: MacdParams) -> Self {
        Self {
            name: format!("MACD({},{},{})", params.fast, params.slow, params.signal),
            params,
        }
    }

    pub fn lines(&self, data: &[Candle]) -> MacdOutput {
        let values = closes(data);
        let fast = ema_values(&values, self.params.fast.get());
        let slow = ema_values(&values, self.params.slow.get());

        let macd: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) => Some(f - s),
                _ => None,
            })
            .collect();

        // The signal EMA runs over the defined MACD values only and is then
        // mapped back to the index each of those values came from. The
        // alignment follows the data rather than an offset formula.
        let (positions, defined): (Vec<usize>, Vec<f64>) = macd
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .unzip();
        let mut signal = vec![None; macd.len()];
        for (&index, value) in positions.iter().zip(ema_values(&defined, self.params.signal.get())) {
            signal[index] = value;
        }

        let histogram = macd
            .iter()
            .zip(&signal)
            .map(|(m, s)| match (m, s) {
                (Some(m), Some(s)) => Some(m - s),
                _ => None,
            })
            .collect();

        MacdOutput {
            macd: macd.into(),
            signal: signal.into(),
            histogram,
        }
    }
}

impl IndicatorCalculator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "fast": self.params.fast.get(),
            "slow": self.params.slow.get(),
            "signal": self.params.signal.get(),
        })
    }

    fn calculate(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError> {
        Ok(IndicatorOutput::Macd(self.lines(data)))
    }
}
