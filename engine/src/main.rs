// Engine main entry point: keeps one chart view refreshed and logs each bundle
use std::sync::Arc;

use anyhow::Context;
use engine::config::EngineSettings;
use engine::data::{CandleSource, ChartRequest, CsvCandleSource, MarketDataStore};
use engine::indicators::IndicatorOutput;
use engine::services::{LiveRefresh, RecomputeCoordinator, ResultBundle};
use shared::utils::millis_to_ist;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting indicator engine...");
    let settings = EngineSettings::from_env().context("Failed to load engine settings")?;

    let (specs, rejected) = settings.active_specs();
    for e in &rejected {
        warn!("Ignoring indicator request: {}", e);
    }
    info!("{} indicators active", specs.len());

    let source: Arc<dyn CandleSource> = match &settings.csv_path {
        Some(path) => {
            info!("Serving candles from '{}'", path.display());
            Arc::new(CsvCandleSource::new(path))
        }
        None => {
            warn!("No csv_path configured, serving an empty in-memory store");
            Arc::new(RwLock::new(MarketDataStore::new()))
        }
    };

    let coordinator = Arc::new(RecomputeCoordinator::new(settings.stale_after_failures, specs));
    let mut bundles = coordinator.subscribe();
    let mut refresh = LiveRefresh::start(
        Arc::clone(&coordinator),
        source,
        ChartRequest::new(settings.symbol.clone(), settings.timeframe),
        settings.refresh_interval(),
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = bundles.changed() => {
                if changed.is_err() {
                    break;
                }
                let bundle = Arc::clone(&bundles.borrow_and_update());
                log_bundle(&bundle)?;
            }
            signal = &mut shutdown => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    refresh.stop();
    coordinator.shutdown();
    Ok(())
}

fn log_bundle(bundle: &ResultBundle) -> anyhow::Result<()> {
    let last_candle = bundle
        .last_timestamp()
        .and_then(millis_to_ist)
        .map_or_else(|| "-".to_string(), |t| t.format("%d-%b-%Y %H:%M IST").to_string());
    info!(
        sequence = bundle.sequence(),
        candles = bundle.candle_count(),
        indicators = bundle.len(),
        last_candle = %last_candle,
        "Result bundle published"
    );
    for (spec, result) in bundle.entries() {
        match result {
            Ok(output) => info!("  {} -> {}", spec.label(), latest(output)),
            Err(e) => warn!("  {} -> {}", spec.label(), e),
        }
    }
    debug!("{}", serde_json::to_string(bundle).context("Failed to serialize result bundle")?);
    Ok(())
}

fn latest(output: &IndicatorOutput) -> String {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
    match output {
        IndicatorOutput::Line { values } => fmt(values.last_value()),
        IndicatorOutput::Macd(m) => format!(
            "macd {} signal {} hist {}",
            fmt(m.macd.last_value()),
            fmt(m.signal.last_value()),
            fmt(m.histogram.last_value())
        ),
        IndicatorOutput::Bands(b) => format!(
            "upper {} middle {} lower {}",
            fmt(b.upper.last_value()),
            fmt(b.middle.last_value()),
            fmt(b.lower.last_value())
        ),
        IndicatorOutput::Levels(l) => format!("support {:.2} resistance {:.2}", l.support, l.resistance),
    }
}
