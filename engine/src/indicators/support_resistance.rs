// Support / resistance levels over a trailing lookback window
use super::{IndicatorCalculator, IndicatorOutput, Period};
use crate::error::IndicatorError;
use serde::Serialize;
use serde_json::Value;
use shared::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupportResistanceLevels {
    pub support: f64,
    pub resistance: f64,
    /// Number of candles the levels were taken from: `min(lookback, n)`.
    pub window: usize,
}

pub struct SupportResistance {
    name: String,
    lookback: usize,
}

impl SupportResistance {
    pub fn new(lookback: usize) -> Result<Self, IndicatorError> {
        Ok(Self::with_lookback(Period::new("SUPPORT_RESISTANCE", "lookback", lookback)?))
    }

    pub(crate) fn with_lookback(lookback: Period) -> Self {
        Self {
            name: format!("S/R({})", lookback),
            lookback: lookback.get(),
        }
    }

    /// Lowest low and highest high of the last `min(lookback, n)` candles.
    pub fn levels(&self, data: &[Candle]) -> Result<SupportResistanceLevels, IndicatorError> {
        if data.is_empty() {
            return Err(IndicatorError::EmptyInput { indicator: "SUPPORT_RESISTANCE" });
        }
        let window = &data[data.len().saturating_sub(self.lookback)..];
        let support = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let resistance = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        Ok(SupportResistanceLevels {
            support,
            resistance,
            window: window.len(),
        })
    }
}

impl IndicatorCalculator for SupportResistance {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "lookback": self.lookback })
    }

    fn calculate(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError> {
        self.levels(data).map(IndicatorOutput::Levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(low: f64, high: f64) -> Candle {
        Candle { timestamp: 0, open: low, high, low, close: high, volume: 1 }
    }

    #[test]
    fn test_levels_use_only_the_lookback_window() {
        let candles = vec![bar(1.0, 100.0), bar(50.0, 60.0), bar(48.0, 58.0), bar(52.0, 65.0)];
        let levels = SupportResistance::new(3).unwrap().levels(&candles).unwrap();
        assert_eq!(levels.support, 48.0);
        assert_eq!(levels.resistance, 65.0);
        assert_eq!(levels.window, 3);
    }

    #[test]
    fn test_levels_fall_back_to_whole_series() {
        let candles = vec![bar(10.0, 12.0), bar(9.0, 11.0)];
        let levels = SupportResistance::new(20).unwrap().levels(&candles).unwrap();
        assert_eq!((levels.support, levels.resistance, levels.window), (9.0, 12.0, 2));
    }

    #[test]
    fn test_single_candle_is_defined() {
        let levels = SupportResistance::new(5).unwrap().levels(&[bar(3.0, 4.0)]).unwrap();
        assert_eq!((levels.support, levels.resistance), (3.0, 4.0));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let err = SupportResistance::new(5).unwrap().calculate(&[]).unwrap_err();
        assert_eq!(err, IndicatorError::EmptyInput { indicator: "SUPPORT_RESISTANCE" });
    }

    #[test]
    fn test_zero_lookback_rejected() {
        assert!(SupportResistance::new(0).is_err());
    }
}
