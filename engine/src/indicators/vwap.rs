// Volume Weighted Average Price (VWAP) indicator implementation
use super::{IndicatorCalculator, IndicatorOutput};
use crate::error::IndicatorError;
use serde_json::Value;
use shared::models::{Candle, IndicatorSeries};

/// Session-long cumulative VWAP over typical price `(h + l + c) / 3`.
///
/// Every index is defined. While the cumulative volume is still zero the value
/// is `0.0`, which a consumer cannot tell apart from a genuine zero price.
#[derive(Default)]
pub struct Vwap;

impl Vwap {
    pub fn new() -> Self {
        Vwap
    }

    pub fn series(&self, data: &[Candle]) -> IndicatorSeries {
        let mut cumulative_tp_vol = 0.0;
        let mut cumulative_vol = 0.0;
        data.iter()
            .map(|candle| {
                let volume = candle.volume as f64;
                cumulative_tp_vol += candle.typical_price() * volume;
                cumulative_vol += volume;
                if cumulative_vol > 0.0 {
                    Some(cumulative_tp_vol / cumulative_vol)
                } else {
                    Some(0.0)
                }
            })
            .collect()
    }
}

impl IndicatorCalculator for Vwap {
    fn name(&self) -> &str {
        "VWAP"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({})
    }

    fn calculate(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError> {
        Ok(self.series(data).into())
    }
}
