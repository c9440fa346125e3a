// Bollinger Bands indicator implementation
//
// Middle band is the SMA of closes; upper and lower sit `multiplier` population
// standard deviations away, measured over the same trailing window.
use super::sma::sma_values;
use super::{closes, BollingerParams, IndicatorCalculator, IndicatorOutput, Multiplier, Period};
use crate::error::IndicatorError;
use serde::Serialize;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerOutput {
    pub upper: IndicatorSeries,
    pub middle: IndicatorSeries,
    pub lower: IndicatorSeries,
}

pub struct Bollinger {
    name: String,
    params: BollingerParams,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64) -> Result<Self, IndicatorError> {
        Ok(Self::with_params(BollingerParams {
            period: Period::new("BOLLINGER", "period", period)?,
            multiplier: Multiplier::new("BOLLINGER", multiplier)?,
        }))
    }

    pub(crate) fn with_params(params: BollingerParams) -> Self {
        Self {
            name: format!("BB({},{})", params.period, params.multiplier),
            params,
        }
    }

    pub fn bands(&self, data: &[Candle]) -> BollingerOutput {
        let values = closes(data);
        let period = self.params.period.get();
        let k = self.params.multiplier.get();
        let middle = sma_values(&values, period);

        let mut upper = Vec::with_capacity(values.len());
        let mut lower = Vec::with_capacity(values.len());
        for (i, mid) in middle.iter().enumerate() {
            match mid {
                Some(mean) => {
                    let window = &values[i + 1 - period..=i];
                    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
                    let std_dev = variance.sqrt();
                    upper.push(Some(mean + k * std_dev));
                    lower.push(Some(mean - k * std_dev));
                }
                None => {
                    upper.push(None);
                    lower.push(None);
                }
            }
        }

        BollingerOutput {
            upper: upper.into(),
            middle: middle.into(),
            lower: lower.into(),
        }
    }
}

impl IndicatorCalculator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "period": self.params.period.get(),
            "multiplier": self.params.multiplier.get(),
        })
    }

    fn calculate(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError> {
        Ok(IndicatorOutput::Bands(self.bands(data)))
    }
}
