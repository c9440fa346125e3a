// In-memory candle cache per symbol and timeframe
use std::collections::HashMap;

use async_trait::async_trait;
use shared::models::{Candle, CandleSeries, TimeFrame};
use tokio::sync::RwLock;

use super::source::{CandleSource, ChartRequest};
use crate::error::EngineError;

pub struct MarketDataStore {
    data: HashMap<String, HashMap<TimeFrame, Vec<Candle>>>,
}

impl MarketDataStore {
    pub fn new() -> Self {
        MarketDataStore { data: HashMap::new() }
    }

    /// Merges candles into the store, keyed by timestamp.
    ///
    /// A candle whose timestamp is already stored replaces the stored one as a
    /// whole. This is how a still-forming last candle is revised between polls.
    pub fn upsert_candles(&mut self, symbol: &str, timeframe: TimeFrame, new_candles: Vec<Candle>) -> Result<usize, EngineError> {
        for candle in &new_candles {
            candle.validate()?;
        }
        let stored = self
            .data
            .entry(symbol.to_string())
            .or_default()
            .entry(timeframe)
            .or_default();

        let count = new_candles.len();
        for candle in new_candles {
            match stored.binary_search_by_key(&candle.timestamp, |c| c.timestamp) {
                Ok(pos) => stored[pos] = candle,
                Err(pos) => stored.insert(pos, candle),
            }
        }
        Ok(count)
    }

    /// Candles for `symbol`/`timeframe` within `[from, to]` (inclusive, epoch millis).
    pub fn get_series(&self, symbol: &str, timeframe: TimeFrame, from: Option<i64>, to: Option<i64>) -> Option<CandleSeries> {
        let candles = self.data.get(symbol)?.get(&timeframe)?;
        let selected: Vec<Candle> = candles
            .iter()
            .filter(|c| from.map_or(true, |start| c.timestamp >= start))
            .filter(|c| to.map_or(true, |end| c.timestamp <= end))
            .copied()
            .collect();
        // Stored candles are validated, unique and sorted on insert
        CandleSeries::new(selected).ok()
    }

    pub fn clear(&mut self, symbol: &str) {
        self.data.remove(symbol);
    }
}

impl Default for MarketDataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleSource for RwLock<MarketDataStore> {
    async fn fetch(&self, request: &ChartRequest) -> Result<CandleSeries, EngineError> {
        let store = self.read().await;
        store
            .get_series(&request.symbol, request.timeframe, None, None)
            .ok_or_else(|| {
                EngineError::MarketDataError(format!(
                    "Market data not found for symbol '{}' and timeframe {:?}",
                    request.symbol, request.timeframe
                ))
            })
    }
}
