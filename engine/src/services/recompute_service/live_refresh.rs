// Polling loop that feeds the coordinator for the chart currently on screen
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::RecomputeCoordinator;
use crate::data::source::{CandleSource, ChartRequest};
use crate::error::EngineError;

/// Keeps one chart view refreshed.
///
/// Fetches once on start. Intraday timeframes are then polled every
/// `period`; other timeframes only refresh on [`LiveRefresh::refresh`].
/// At most one fetch is in flight; triggers arriving meanwhile collapse
/// into a single follow-up cycle.
pub struct LiveRefresh {
    coordinator: Arc<RecomputeCoordinator>,
    source: Arc<dyn CandleSource>,
    period: Duration,
    request: ChartRequest,
    trigger: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl LiveRefresh {
    pub fn start(
        coordinator: Arc<RecomputeCoordinator>,
        source: Arc<dyn CandleSource>,
        request: ChartRequest,
        period: Duration,
    ) -> Self {
        let mut refresh = LiveRefresh {
            coordinator,
            source,
            period,
            request,
            trigger: Arc::new(Notify::new()),
            task: None,
        };
        refresh.spawn();
        refresh
    }

    fn spawn(&mut self) {
        tracing::info!(
            symbol = %self.request.symbol,
            timeframe = ?self.request.timeframe,
            periodic = self.request.timeframe.is_intraday(),
            "Starting live refresh"
        );
        self.trigger = Arc::new(Notify::new());
        // The task only ever acts for the view generation it was started in.
        let epoch = self.coordinator.current_epoch();
        self.task = Some(tokio::spawn(run(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.source),
            self.request.clone(),
            epoch,
            self.period,
            Arc::clone(&self.trigger),
        )));
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn request(&self) -> &ChartRequest {
        &self.request
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Requests an immediate cycle.
    pub fn refresh(&self) {
        self.trigger.notify_one();
    }

    /// Moves to another symbol or timeframe. The in-flight fetch is dropped
    /// and nothing computed for the old view is published afterwards.
    pub fn switch_view(&mut self, request: ChartRequest) {
        self.abort();
        self.coordinator.clear();
        self.request = request;
        self.spawn();
    }

    /// Stops polling, e.g. when the chart view is closed, and cancels any
    /// fetch or computation still running for it. The last bundle stays
    /// available from the coordinator.
    pub fn stop(&mut self) {
        if self.task.is_some() {
            self.abort();
            self.coordinator.cancel_pending();
            tracing::info!(symbol = %self.request.symbol, "Live refresh stopped");
        }
    }
}

impl Drop for LiveRefresh {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    coordinator: Arc<RecomputeCoordinator>,
    source: Arc<dyn CandleSource>,
    request: ChartRequest,
    epoch: u64,
    period: Duration,
    trigger: Arc<Notify>,
) {
    let periodic = request.timeframe.is_intraday();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        match run_cycle(&coordinator, source.as_ref(), &request, epoch).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(symbol = %request.symbol, epoch, "View cancelled, live refresh ended");
                break;
            }
            Err(e) => {
                tracing::info!(symbol = %request.symbol, "Live refresh ended: {}", e);
                break;
            }
        }
        if periodic {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = trigger.notified() => {}
            }
        } else {
            trigger.notified().await;
        }
    }
}

/// One fetch-and-submit cycle for the view generation `epoch`. Returns
/// `Ok(false)` once that generation has been cancelled.
async fn run_cycle(
    coordinator: &RecomputeCoordinator,
    source: &dyn CandleSource,
    request: &ChartRequest,
    epoch: u64,
) -> Result<bool, EngineError> {
    if coordinator.is_closed() {
        return Err(EngineError::CoordinatorClosed);
    }
    if coordinator.current_epoch() != epoch {
        return Ok(false);
    }
    let ticket = coordinator.begin_cycle_in(epoch);
    match source.fetch(request).await {
        Ok(series) => {
            tracing::debug!(symbol = %request.symbol, candles = series.len(), sequence = ticket.sequence(), "Fetched snapshot");
            coordinator.submit(ticket, series)?;
        }
        Err(e) => {
            if !e.is_transient() {
                tracing::error!(symbol = %request.symbol, "Candle source failed: {}", e);
            }
            coordinator.record_fetch_failure(ticket, &e);
        }
    }
    Ok(true)
}
