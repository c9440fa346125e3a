// Indicator specifications: typed, validated indicator configurations
//
// An `IndicatorSpec` names one indicator together with validated parameters.
// Specs compare, order and hash structurally, so `SMA(20)` requested twice is
// one key in a result bundle.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::Candle;

use super::{
    Bollinger, Ema, IndicatorCalculator, IndicatorOutput, Macd, Rsi, Sma, SupportResistance, Vwap,
};
use crate::error::IndicatorError;

/// Period used when a moving-average request carries no `period` and no
/// moving-average periods are configured.
pub const DEFAULT_MA_PERIOD: usize = 20;

/// A window length of at least one candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Period(NonZeroUsize);

impl Period {
    pub fn new(indicator: &'static str, parameter: &'static str, value: usize) -> Result<Self, IndicatorError> {
        NonZeroUsize::new(value)
            .map(Period)
            .ok_or_else(|| IndicatorError::invalid(indicator, parameter, value))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Band width multiplier: finite and non-negative.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct Multiplier(f64);

impl Multiplier {
    pub fn new(indicator: &'static str, value: f64) -> Result<Self, IndicatorError> {
        if !value.is_finite() || value < 0.0 {
            return Err(IndicatorError::invalid(indicator, "multiplier", value));
        }
        // -0.0 and 0.0 must be the same key
        Ok(Multiplier(if value == 0.0 { 0.0 } else { value }))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for Multiplier {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Multiplier {}

impl Hash for Multiplier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Multiplier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Multiplier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MacdParams {
    pub fast: Period,
    pub slow: Period,
    pub signal: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BollingerParams {
    pub period: Period,
    pub multiplier: Multiplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorSpec {
    Sma { period: Period },
    Ema { period: Period },
    Rsi { period: Period },
    Macd(MacdParams),
    Bollinger(BollingerParams),
    Vwap,
    SupportResistance { lookback: Period },
}

impl IndicatorSpec {
    pub fn sma(period: usize) -> Result<Self, IndicatorError> {
        Ok(IndicatorSpec::Sma { period: Period::new("SMA", "period", period)? })
    }

    pub fn ema(period: usize) -> Result<Self, IndicatorError> {
        Ok(IndicatorSpec::Ema { period: Period::new("EMA", "period", period)? })
    }

    pub fn rsi(period: usize) -> Result<Self, IndicatorError> {
        Ok(IndicatorSpec::Rsi { period: Period::new("RSI", "period", period)? })
    }

    pub fn macd(fast: usize, slow: usize, signal: usize) -> Result<Self, IndicatorError> {
        Ok(IndicatorSpec::Macd(MacdParams {
            fast: Period::new("MACD", "fast", fast)?,
            slow: Period::new("MACD", "slow", slow)?,
            signal: Period::new("MACD", "signal", signal)?,
        }))
    }

    pub fn bollinger(period: usize, multiplier: f64) -> Result<Self, IndicatorError> {
        Ok(IndicatorSpec::Bollinger(BollingerParams {
            period: Period::new("BOLLINGER", "period", period)?,
            multiplier: Multiplier::new("BOLLINGER", multiplier)?,
        }))
    }

    pub fn vwap() -> Self {
        IndicatorSpec::Vwap
    }

    pub fn support_resistance(lookback: usize) -> Result<Self, IndicatorError> {
        Ok(IndicatorSpec::SupportResistance {
            lookback: Period::new("SUPPORT_RESISTANCE", "lookback", lookback)?,
        })
    }

    pub fn calculator(&self) -> Box<dyn IndicatorCalculator> {
        match *self {
            IndicatorSpec::Sma { period } => Box::new(Sma::with_period(period)),
            IndicatorSpec::Ema { period } => Box::new(Ema::with_period(period)),
            IndicatorSpec::Rsi { period } => Box::new(Rsi::with_period(period)),
            IndicatorSpec::Macd(params) => Box::new(Macd::with_params(params)),
            IndicatorSpec::Bollinger(params) => Box::new(Bollinger::with_params(params)),
            IndicatorSpec::Vwap => Box::new(Vwap::new()),
            IndicatorSpec::SupportResistance { lookback } => Box::new(SupportResistance::with_lookback(lookback)),
        }
    }

    /// Display name, e.g. `SMA(20)` or `MACD(12,26,9)`.
    pub fn label(&self) -> String {
        self.calculator().name().to_string()
    }

    pub fn compute(&self, data: &[Candle]) -> Result<IndicatorOutput, IndicatorError> {
        self.calculator().calculate(data)
    }

    /// Parses the loosely-typed `{kind, parameters}` request shape used by
    /// settings files and UI toggles. Missing parameters take their defaults;
    /// present but unusable ones are rejected.
    pub fn from_request(kind: &str, params: &Value, defaults: &IndicatorDefaults) -> Result<Self, IndicatorError> {
        match kind.trim().to_lowercase().as_str() {
            "sma" => Self::sma(usize_param(params, "SMA", "period", defaults.moving_average_period())?),
            "ema" => Self::ema(usize_param(params, "EMA", "period", defaults.moving_average_period())?),
            "rsi" => Self::rsi(usize_param(params, "RSI", "period", defaults.rsi_period)?),
            "macd" => Self::macd(
                usize_param(params, "MACD", "fast", defaults.macd_fast)?,
                usize_param(params, "MACD", "slow", defaults.macd_slow)?,
                usize_param(params, "MACD", "signal", defaults.macd_signal)?,
            ),
            "bollinger" | "bb" => Self::bollinger(
                usize_param(params, "BOLLINGER", "period", defaults.bollinger_period)?,
                f64_param(params, "BOLLINGER", "multiplier", defaults.bollinger_multiplier)?,
            ),
            "vwap" => Ok(Self::vwap()),
            "support_resistance" | "sr" => Self::support_resistance(usize_param(
                params,
                "SUPPORT_RESISTANCE",
                "lookback",
                defaults.support_resistance_lookback,
            )?),
            _ => Err(IndicatorError::UnknownIndicator(kind.to_string())),
        }
    }

    /// Every supported kind with its default parameters, in display order.
    pub fn default_set(defaults: &IndicatorDefaults) -> Result<Vec<Self>, IndicatorError> {
        let mut specs = Vec::new();
        for &period in &defaults.moving_average_periods {
            specs.push(Self::sma(period)?);
        }
        for &period in &defaults.moving_average_periods {
            specs.push(Self::ema(period)?);
        }
        specs.push(Self::rsi(defaults.rsi_period)?);
        specs.push(Self::macd(defaults.macd_fast, defaults.macd_slow, defaults.macd_signal)?);
        specs.push(Self::bollinger(defaults.bollinger_period, defaults.bollinger_multiplier)?);
        specs.push(Self::vwap());
        specs.push(Self::support_resistance(defaults.support_resistance_lookback)?);
        Ok(specs)
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn usize_param(params: &Value, indicator: &'static str, name: &'static str, default: usize) -> Result<usize, IndicatorError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| IndicatorError::invalid(indicator, name, v)),
    }
}

fn f64_param(params: &Value, indicator: &'static str, name: &'static str, default: f64) -> Result<f64, IndicatorError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| IndicatorError::invalid(indicator, name, v)),
    }
}

/// Default parameters offered to the UI. These match the values the quote
/// screens have always used, so changing them changes what users see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorDefaults {
    pub moving_average_periods: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_multiplier: f64,
    pub support_resistance_lookback: usize,
}

impl Default for IndicatorDefaults {
    fn default() -> Self {
        IndicatorDefaults {
            moving_average_periods: vec![5, 10, 20],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_multiplier: 2.0,
            support_resistance_lookback: 20,
        }
    }
}

impl IndicatorDefaults {
    /// Period for a moving average requested without one: the longest
    /// configured period.
    pub fn moving_average_period(&self) -> usize {
        self.moving_average_periods
            .iter()
            .copied()
            .max()
            .unwrap_or(DEFAULT_MA_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_specs_compare_structurally() {
        assert_eq!(IndicatorSpec::sma(20).unwrap(), IndicatorSpec::sma(20).unwrap());
        assert_ne!(IndicatorSpec::sma(20).unwrap(), IndicatorSpec::ema(20).unwrap());
        assert_eq!(
            IndicatorSpec::bollinger(20, 2.0).unwrap(),
            IndicatorSpec::bollinger(20, 2.0).unwrap()
        );
        assert_eq!(
            IndicatorSpec::bollinger(20, -0.0).unwrap(),
            IndicatorSpec::bollinger(20, 0.0).unwrap()
        );

        let set: HashSet<_> = [
            IndicatorSpec::rsi(14).unwrap(),
            IndicatorSpec::rsi(14).unwrap(),
            IndicatorSpec::rsi(7).unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_labels() {
        assert_eq!(IndicatorSpec::sma(20).unwrap().label(), "SMA(20)");
        assert_eq!(IndicatorSpec::macd(12, 26, 9).unwrap().label(), "MACD(12,26,9)");
        assert_eq!(IndicatorSpec::bollinger(20, 2.5).unwrap().label(), "BB(20,2.5)");
        assert_eq!(IndicatorSpec::vwap().to_string(), "VWAP");
    }

    #[test]
    fn test_from_request_applies_defaults() {
        let defaults = IndicatorDefaults::default();
        assert_eq!(
            IndicatorSpec::from_request("MACD", &json!({}), &defaults).unwrap(),
            IndicatorSpec::macd(12, 26, 9).unwrap()
        );
        assert_eq!(
            IndicatorSpec::from_request("sma", &json!({ "period": 5 }), &defaults).unwrap(),
            IndicatorSpec::sma(5).unwrap()
        );
        assert_eq!(
            IndicatorSpec::from_request("bb", &Value::Null, &defaults).unwrap(),
            IndicatorSpec::bollinger(20, 2.0).unwrap()
        );
        assert_eq!(
            IndicatorSpec::from_request("rsi", &json!({}), &defaults).unwrap(),
            IndicatorSpec::rsi(14).unwrap()
        );
    }

    #[test]
    fn test_from_request_uses_configured_ma_periods() {
        let defaults = IndicatorDefaults { moving_average_periods: vec![9, 50, 21], ..IndicatorDefaults::default() };
        assert_eq!(
            IndicatorSpec::from_request("sma", &json!({}), &defaults).unwrap(),
            IndicatorSpec::sma(50).unwrap()
        );
        assert_eq!(
            IndicatorSpec::from_request("ema", &Value::Null, &defaults).unwrap(),
            IndicatorSpec::ema(50).unwrap()
        );

        let unset = IndicatorDefaults { moving_average_periods: Vec::new(), ..IndicatorDefaults::default() };
        assert_eq!(unset.moving_average_period(), DEFAULT_MA_PERIOD);
    }

    #[test]
    fn test_from_request_rejects_bad_values() {
        let defaults = IndicatorDefaults::default();
        assert!(matches!(
            IndicatorSpec::from_request("ema", &json!({ "period": -3 }), &defaults),
            Err(IndicatorError::InvalidParameter { indicator: "EMA", parameter: "period", .. })
        ));
        assert!(matches!(
            IndicatorSpec::from_request("sma", &json!({ "period": 0 }), &defaults),
            Err(IndicatorError::InvalidParameter { .. })
        ));
        assert_eq!(
            IndicatorSpec::from_request("ichimoku", &json!({}), &defaults),
            Err(IndicatorError::UnknownIndicator("ichimoku".to_string()))
        );
    }

    #[test]
    fn test_default_set_matches_ui_contract() {
        let specs = IndicatorSpec::default_set(&IndicatorDefaults::default()).unwrap();
        let labels: Vec<String> = specs.iter().map(IndicatorSpec::label).collect();
        assert_eq!(
            labels,
            vec![
                "SMA(5)", "SMA(10)", "SMA(20)", "EMA(5)", "EMA(10)", "EMA(20)", "RSI(14)",
                "MACD(12,26,9)", "BB(20,2)", "VWAP", "S/R(20)",
            ]
        );
    }

    #[test]
    fn test_spec_serializes_with_kind_tag() {
        let json = serde_json::to_value(IndicatorSpec::macd(12, 26, 9).unwrap()).unwrap();
        assert_eq!(json, json!({ "kind": "MACD", "fast": 12, "slow": 26, "signal": 9 }));
    }
}
