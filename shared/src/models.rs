use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Candle at {timestamp} has a non-finite price")]
    NonFinitePrice { timestamp: i64 },

    #[error("Candle at {timestamp} violates low <= open, close <= high")]
    InconsistentRange { timestamp: i64 },

    #[error("Timestamps must strictly increase: index {index} has {timestamp}, previous was {previous}")]
    NonIncreasingTimestamp { index: usize, previous: i64, timestamp: i64 },
}

/// One OHLCV sample for a fixed time bucket.
///
/// `timestamp` is milliseconds since the Unix epoch. Prices are finite and
/// satisfy `low <= open, close <= high`; `Candle::new` enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Result<Self, SeriesError> {
        let candle = Candle { timestamp, open, high, low, close, volume };
        candle.validate()?;
        Ok(candle)
    }

    pub fn validate(&self) -> Result<(), SeriesError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(SeriesError::NonFinitePrice { timestamp: self.timestamp });
        }
        let within = |p: f64| self.low <= p && p <= self.high;
        if !within(self.open) || !within(self.close) {
            return Err(SeriesError::InconsistentRange { timestamp: self.timestamp });
        }
        Ok(())
    }

    /// `(high + low + close) / 3`
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Ordered candles with strictly increasing timestamps.
///
/// A series is a snapshot: a refresh produces a new `CandleSeries` rather than
/// mutating an existing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Candle>", into = "Vec<Candle>")]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for candle in &candles {
            candle.validate()?;
        }
        for (index, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(SeriesError::NonIncreasingTimestamp {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    timestamp: pair[1].timestamp,
                });
            }
        }
        Ok(Self { candles })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

impl TryFrom<Vec<Candle>> for CandleSeries {
    type Error = SeriesError;

    fn try_from(candles: Vec<Candle>) -> Result<Self, Self::Error> {
        CandleSeries::new(candles)
    }
}

impl From<CandleSeries> for Vec<Candle> {
    fn from(series: CandleSeries) -> Self {
        series.candles
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeFrame {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Day1,
    Week1,
}

impl TimeFrame {
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            TimeFrame::Minute1 => MINUTE,
            TimeFrame::Minute5 => 5 * MINUTE,
            TimeFrame::Minute15 => 15 * MINUTE,
            TimeFrame::Minute30 => 30 * MINUTE,
            TimeFrame::Hour1 => 60 * MINUTE,
            TimeFrame::Day1 => 24 * 60 * MINUTE,
            TimeFrame::Week1 => 7 * 24 * 60 * MINUTE,
        }
    }

    /// Intraday views are refreshed on a timer; daily and weekly views only on demand.
    pub fn is_intraday(&self) -> bool {
        self.duration_ms() < TimeFrame::Day1.duration_ms()
    }
}

/// Output of one indicator line: one optional value per input candle.
///
/// `None` at index `i` means there was not enough history to define a value
/// there. Renderers draw it as a gap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSeries(Vec<Option<f64>>);

impl IndicatorSeries {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }

    /// A series of `len` undefined values.
    pub fn undefined(len: usize) -> Self {
        Self(vec![None; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied().flatten()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.0.iter().copied()
    }

    pub fn first_defined_index(&self) -> Option<usize> {
        self.0.iter().position(Option::is_some)
    }

    pub fn last_value(&self) -> Option<f64> {
        self.0.last().copied().flatten()
    }
}

impl From<Vec<Option<f64>>> for IndicatorSeries {
    fn from(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }
}

impl FromIterator<Option<f64>> for IndicatorSeries {
    fn from_iter<I: IntoIterator<Item = Option<f64>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(timestamp: i64, close: f64) -> Candle {
        Candle { timestamp, open: close, high: close, low: close, close, volume: 10 }
    }

    #[test]
    fn test_candle_rejects_close_above_high() {
        let err = Candle::new(0, 10.0, 11.0, 9.0, 12.0, 5).unwrap_err();
        assert_eq!(err, SeriesError::InconsistentRange { timestamp: 0 });
    }

    #[test]
    fn test_candle_rejects_nan() {
        assert!(matches!(
            Candle::new(0, f64::NAN, 11.0, 9.0, 10.0, 5),
            Err(SeriesError::NonFinitePrice { .. })
        ));
    }

    #[test]
    fn test_typical_price_is_hlc_mean() {
        let c = Candle::new(0, 10.0, 12.0, 9.0, 12.0, 1).unwrap();
        assert_eq!(c.typical_price(), 11.0);
    }

    #[test]
    fn test_series_requires_increasing_timestamps() {
        let err = CandleSeries::new(vec![candle(1, 1.0), candle(2, 1.0), candle(2, 1.0)]).unwrap_err();
        assert_eq!(err, SeriesError::NonIncreasingTimestamp { index: 2, previous: 2, timestamp: 2 });
    }

    #[test]
    fn test_series_deserialization_is_validated() {
        let json = r#"[
            {"timestamp": 2, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1},
            {"timestamp": 1, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1}
        ]"#;
        assert!(serde_json::from_str::<CandleSeries>(json).is_err());
    }

    #[test]
    fn test_indicator_series_serializes_gaps_as_null() {
        let series = IndicatorSeries::new(vec![None, Some(1.5)]);
        assert_eq!(serde_json::to_string(&series).unwrap(), "[null,1.5]");
        assert_eq!(series.first_defined_index(), Some(1));
        assert_eq!(series.last_value(), Some(1.5));
    }

    #[test]
    fn test_intraday_timeframes() {
        assert!(TimeFrame::Minute5.is_intraday());
        assert!(!TimeFrame::Day1.is_intraday());
    }
}
