// Engine library root

pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod services;

pub use config::EngineSettings;
pub use data::{CandleSource, ChartRequest};
pub use error::{EngineError, IndicatorError};
pub use indicators::{IndicatorCalculator, IndicatorOutput, IndicatorSpec};
pub use services::{FeedStatus, LiveRefresh, RecomputeCoordinator, ResultBundle};
