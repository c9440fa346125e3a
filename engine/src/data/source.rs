// Candle sources: whatever hands the coordinator a fresh snapshot.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{CandleSeries, TimeFrame};

use super::csv_parser::CandleCsvParser;
use crate::error::EngineError;

/// The chart view a snapshot is fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartRequest {
    pub symbol: String,
    pub timeframe: TimeFrame,
}

impl ChartRequest {
    pub fn new(symbol: impl Into<String>, timeframe: TimeFrame) -> Self {
        ChartRequest { symbol: symbol.into(), timeframe }
    }
}

/// Supplies candle snapshots. Implementations decide where candles come from
/// (remote quote API, fallback provider, local cache) and in which order.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch(&self, request: &ChartRequest) -> Result<CandleSeries, EngineError>;
}

/// Reads candles from CSV on every fetch.
///
/// `path` is either a single file serving every request, or a directory
/// holding one `<SYMBOL>.csv` per symbol (spaces become underscores).
pub struct CsvCandleSource {
    path: PathBuf,
}

impl CsvCandleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvCandleSource { path: path.into() }
    }

    fn resolve(&self, request: &ChartRequest) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{}.csv", request.symbol.replace(' ', "_")))
        } else {
            self.path.clone()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CandleSource for CsvCandleSource {
    async fn fetch(&self, request: &ChartRequest) -> Result<CandleSeries, EngineError> {
        let path = self.resolve(request);
        tracing::debug!(symbol = %request.symbol, path = %path.display(), "Reading candles from CSV");
        tokio::task::spawn_blocking(move || CandleCsvParser::load_series_from_csv(&path))
            .await
            .map_err(|e| EngineError::FetchFailure(format!("CSV reader task failed: {}", e)))?
    }
}
