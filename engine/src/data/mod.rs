// Candle supply for the recompute coordinator
pub mod csv_parser;
pub mod market_data;
pub mod source;

pub use market_data::MarketDataStore;
pub use source::{CandleSource, ChartRequest, CsvCandleSource};
