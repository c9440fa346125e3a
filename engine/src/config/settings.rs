// Engine settings, loaded from a JSON file or left at their defaults
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use shared::models::TimeFrame;

use crate::error::{EngineError, IndicatorError};
use crate::indicators::{IndicatorDefaults, IndicatorSpec};

/// Environment variable naming the settings file.
pub const CONFIG_ENV_VAR: &str = "ENGINE_CONFIG";

/// One entry of the `active` list, e.g. `{"kind": "sma", "parameters": {"period": 10}}`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IndicatorRequest {
    pub kind: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    pub symbol: String,
    pub timeframe: TimeFrame,
    /// Poll interval for intraday views.
    pub refresh_interval_ms: u64,
    /// Consecutive fetch failures after which the feed is flagged stale.
    pub stale_after_failures: u32,
    /// OHLCV file served by the CSV candle source.
    pub csv_path: Option<PathBuf>,
    pub indicators: IndicatorDefaults,
    /// Indicators shown on start-up; empty means the default set.
    pub active: Vec<IndicatorRequest>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            symbol: "NIFTY 50".to_string(),
            timeframe: TimeFrame::Minute1,
            refresh_interval_ms: 1_000,
            stale_after_failures: 2,
            csv_path: None,
            indicators: IndicatorDefaults::default(),
            active: Vec::new(),
        }
    }
}

impl EngineSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let settings: EngineSettings = serde_json::from_str(&raw)
            .map_err(|e| EngineError::ConfigError(format!("Invalid settings file '{}': {}", path.display(), e)))?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), symbol = %settings.symbol, "Loaded engine settings");
        Ok(settings)
    }

    /// Loads the file named by `ENGINE_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self, EngineError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => {
                tracing::info!("{} not set, using default engine settings", CONFIG_ENV_VAR);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.refresh_interval_ms == 0 {
            return Err(EngineError::ConfigError("refresh_interval_ms must be greater than 0".to_string()));
        }
        if self.stale_after_failures == 0 {
            return Err(EngineError::ConfigError("stale_after_failures must be greater than 0".to_string()));
        }
        IndicatorSpec::default_set(&self.indicators)
            .map_err(|e| EngineError::ConfigError(format!("Invalid indicator defaults: {}", e)))?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Resolves the `active` list. Each request is parsed on its own, so a bad
    /// entry is reported without dropping the others.
    pub fn active_specs(&self) -> (Vec<IndicatorSpec>, Vec<IndicatorError>) {
        if self.active.is_empty() {
            return match IndicatorSpec::default_set(&self.indicators) {
                Ok(specs) => (specs, Vec::new()),
                Err(e) => (Vec::new(), vec![e]),
            };
        }
        let mut specs = Vec::new();
        let mut errors = Vec::new();
        for request in &self.active {
            match IndicatorSpec::from_request(&request.kind, &request.parameters, &self.indicators) {
                Ok(spec) => specs.push(spec),
                Err(e) => errors.push(e),
            }
        }
        (specs, errors)
    }
}
