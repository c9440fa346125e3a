// Exponential Moving Average (EMA) indicator implementation
use super::{closes, window_mean, IndicatorCalculator, IndicatorOutput, Period};
use crate::error::IndicatorError;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

pub struct Ema {
    name: String,
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        Ok(Self::with_period(Period::new("EMA", "period", period)?))
    }

    pub(crate) fn with_period(period: Period) -> Self {
        Self {
            name: format!("EMA({})", period),
            period: period.get(),
        }
    }

    pub fn series(&self, data: &[Candle]) -> IndicatorSeries {
        ema_values(&closes(data), self.period).into()
    }
}

/// EMA seeded with the SMA of the first `period` values.
///
/// The seed lands at index `period - 1`; earlier slots are `None`, and a
/// slice shorter than `period` yields all `None`.
pub(crate) fn ema_values(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut results = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return results;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut previous_ema = window_mean(&values[..period]);
    results[period - 1] = Some(previous_ema);

    for (slot, &value) in results.iter_mut().zip(values).skip(period) {
        let ema = (value - previous_ema) * multiplier + previous_ema;
        *slot = Some(ema);
        previous_ema = ema;
    }
    results
}

impl IndicatorCalculator for Ema {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::sma::Sma;
    use crate::indicators::test_support::{candle, candles_from_closes};

    #[test]
    fn test_ema_calculation() {
        let candles = candles_from_closes(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let results = Ema::new(3).unwrap().series(&candles);
        // SMA for first 3: (10+11+12)/3 = 11.0
        // EMA for 13: (13 - 11.0) * 0.5 + 11.0 = 12.0
        // EMA for 14: (14 - 12.0) * 0.5 + 12.0 = 13.0
        assert_eq!(results.values(), &[None, None, Some(11.0), Some(12.0), Some(13.0)]);
    }

    #[test]
    fn test_ema_shorter_than_period_is_all_none() {
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let results = Ema::new(5).unwrap().series(&candles);
        assert_eq!(results, IndicatorSeries::undefined(4));
    }

    #[test]
    fn test_ema_matches_sma_on_constant_series() {
        let candles = vec![candle(842.5); 30];
        let ema = Ema::new(10).unwrap().series(&candles);
        let sma = Sma::new(10).unwrap().series(&candles);
        for i in 9..30 {
            assert_eq!(ema.get(i), Some(842.5));
            assert_eq!(ema.get(i), sma.get(i));
        }
        assert_eq!(ema.first_defined_index(), Some(9));
    }

    #[test]
    fn test_ema_period_zero_rejected() {
        assert!(Ema::new(0).is_err());
    }
}
