// Data models shared between the indicator engine and its consumers
// (chart renderers, quote screens).
pub mod models;
pub mod utils;

pub use models::{Candle, CandleSeries, IndicatorSeries, SeriesError, TimeFrame};
