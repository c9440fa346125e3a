// engine/src/services/recompute_service/mod.rs
// Recompute coordinator: turns candle snapshots into published result bundles.
//
// Submissions land in a single watch slot, so a burst of snapshots collapses
// to the newest one. A background worker computes the active indicators off
// the async threads and publishes the bundle only if nothing newer arrived
// and the cycle was not cancelled in the meantime.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use shared::models::CandleSeries;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use crate::error::EngineError;
use crate::indicators::IndicatorSpec;

pub mod bundle;
pub mod live_refresh;
pub mod status;

pub use bundle::{IndicatorResult, ResultBundle};
pub use live_refresh::LiveRefresh;
pub use status::{CyclePhase, FeedStatus};

/// Identifies one refresh cycle. Taken before the fetch starts so that a slow
/// fetch can be recognised as outdated once its snapshot arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTicket {
    sequence: u64,
    epoch: u64,
}

impl CycleTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Clone)]
struct Submission {
    ticket: CycleTicket,
    series: Arc<CandleSeries>,
}

struct Shared {
    active: RwLock<Arc<BTreeSet<IndicatorSpec>>>,
    next_sequence: AtomicU64,
    epoch: AtomicU64,
    closed: AtomicBool,
    stale_after_failures: u32,
    snapshots: watch::Sender<Option<Submission>>,
    bundles: watch::Sender<Arc<ResultBundle>>,
    status: watch::Sender<FeedStatus>,
}

impl Shared {
    fn is_current(&self, ticket: CycleTicket) -> bool {
        self.epoch.load(Ordering::Acquire) == ticket.epoch
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.status.send_if_modified(|status| {
            if status.phase == phase {
                return false;
            }
            status.phase = phase;
            true
        });
    }

    /// Publishes `bundle` unless its cycle was cancelled or a newer bundle is
    /// already out. The epoch check runs under the bundle channel's lock,
    /// which `cancel_pending` takes as well.
    fn publish(&self, ticket: CycleTicket, bundle: ResultBundle) -> bool {
        let published = self.bundles.send_if_modified(|current| {
            if !self.is_current(ticket) || current.sequence() >= ticket.sequence {
                return false;
            }
            *current = Arc::new(bundle);
            true
        });
        if published {
            self.status.send_modify(|status| status.record_publish(ticket.sequence));
        }
        published
    }
}

/// Owns the active indicator set and the latest published [`ResultBundle`].
///
/// Readers (`current_bundle`, `subscribe`, `status`) never wait on a
/// computation. Must be created inside a Tokio runtime.
pub struct RecomputeCoordinator {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl RecomputeCoordinator {
    pub fn new(stale_after_failures: u32, active: impl IntoIterator<Item = IndicatorSpec>) -> Self {
        let (snapshots, snapshot_rx) = watch::channel(None);
        let (bundles, _) = watch::channel(Arc::new(ResultBundle::empty()));
        let (status, _) = watch::channel(FeedStatus::default());
        let shared = Arc::new(Shared {
            active: RwLock::new(Arc::new(active.into_iter().collect())),
            next_sequence: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            stale_after_failures: stale_after_failures.max(1),
            snapshots,
            bundles,
            status,
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), snapshot_rx));
        RecomputeCoordinator { shared, worker }
    }

    fn next_ticket(&self) -> CycleTicket {
        CycleTicket {
            sequence: self.shared.next_sequence.fetch_add(1, Ordering::AcqRel),
            epoch: self.shared.epoch.load(Ordering::Acquire),
        }
    }

    /// Starts a refresh cycle; call before fetching candles.
    pub fn begin_cycle(&self) -> CycleTicket {
        self.begin_cycle_in(self.current_epoch())
    }

    /// Generation of the current view. Bumped by `cancel_pending` and `clear`.
    pub fn current_epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }

    /// Starts a refresh cycle on behalf of the view generation `epoch`. If
    /// that generation has been cancelled the ticket is stale from the start
    /// and everything submitted with it is discarded.
    pub fn begin_cycle_in(&self, epoch: u64) -> CycleTicket {
        let ticket = CycleTicket {
            sequence: self.shared.next_sequence.fetch_add(1, Ordering::AcqRel),
            epoch,
        };
        if self.shared.is_current(ticket) {
            self.shared.set_phase(CyclePhase::Fetching);
        }
        ticket
    }

    /// Hands over the snapshot fetched for `ticket`.
    ///
    /// Returns `Ok(false)` when the snapshot was discarded: its cycle was
    /// cancelled, or a snapshot from a later cycle has already been submitted.
    pub fn submit(&self, ticket: CycleTicket, series: CandleSeries) -> Result<bool, EngineError> {
        self.submit_shared(ticket, Arc::new(series))
    }

    fn submit_shared(&self, ticket: CycleTicket, series: Arc<CandleSeries>) -> Result<bool, EngineError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(EngineError::CoordinatorClosed);
        }
        if !self.shared.is_current(ticket) {
            tracing::debug!(sequence = ticket.sequence, "Discarding snapshot from a cancelled cycle");
            return Ok(false);
        }
        let accepted = self.shared.snapshots.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|s| s.ticket.sequence >= ticket.sequence) {
                return false;
            }
            *slot = Some(Submission { ticket, series });
            true
        });
        if !accepted {
            tracing::debug!(sequence = ticket.sequence, "Discarding snapshot older than the latest submission");
        }
        Ok(accepted)
    }

    /// Submits a snapshot as its own cycle. Does not wait for the computation.
    pub fn on_snapshot(&self, series: CandleSeries) -> Result<bool, EngineError> {
        let ticket = self.next_ticket();
        self.submit(ticket, series)
    }

    /// Recomputes the most recent snapshot, e.g. after the active set changed
    /// on a view that has no periodic refresh.
    pub fn recompute_latest(&self) -> Result<bool, EngineError> {
        let latest = self.shared.snapshots.borrow().as_ref().map(|s| Arc::clone(&s.series));
        match latest {
            Some(series) => self.submit_shared(self.next_ticket(), series),
            None => Ok(false),
        }
    }

    /// Records that the fetch for `ticket` failed. The current bundle stays
    /// published; the feed turns stale after enough consecutive failures.
    pub fn record_fetch_failure(&self, ticket: CycleTicket, error: &EngineError) -> bool {
        if !self.shared.is_current(ticket) {
            return false;
        }
        let mut recorded = false;
        self.shared.status.send_if_modified(|status| {
            if status.last_published.is_some_and(|published| published >= ticket.sequence) {
                return false;
            }
            status.record_failure(error.to_string(), self.shared.stale_after_failures);
            recorded = true;
            true
        });
        if recorded {
            let status = self.shared.status.borrow().clone();
            if status.stale {
                tracing::warn!(
                    failures = status.consecutive_failures,
                    "Feed is stale, still serving bundle {}: {}",
                    self.shared.bundles.borrow().sequence(),
                    error
                );
            } else {
                tracing::warn!(sequence = ticket.sequence, "Snapshot fetch failed: {}", error);
            }
        }
        recorded
    }

    /// Invalidates every cycle started so far. Their snapshots, results and
    /// failures are dropped when they show up.
    pub fn cancel_pending(&self) {
        self.shared.bundles.send_if_modified(|_| {
            self.shared.epoch.fetch_add(1, Ordering::AcqRel);
            false
        });
        self.shared.set_phase(CyclePhase::Idle);
        tracing::debug!("Cancelled pending refresh cycles");
    }

    /// Cancels pending cycles and replaces the bundle with an empty one, for
    /// when the chart switches to another symbol or timeframe.
    pub fn clear(&self) {
        self.cancel_pending();
        // Forget the old view's snapshot without waking the worker.
        self.shared.snapshots.send_if_modified(|slot| {
            *slot = None;
            false
        });
        let ticket = self.next_ticket();
        self.shared.publish(ticket, ResultBundle::empty_at(ticket.sequence));
    }

    pub fn set_active_indicators(&self, specs: impl IntoIterator<Item = IndicatorSpec>) {
        let specs: BTreeSet<IndicatorSpec> = specs.into_iter().collect();
        tracing::info!("Active indicators set to {} entries", specs.len());
        *self.shared.active.write() = Arc::new(specs);
    }

    /// Adds `spec` to the active set. Takes effect from the next cycle.
    pub fn activate(&self, spec: IndicatorSpec) -> bool {
        let added = Arc::make_mut(&mut *self.shared.active.write()).insert(spec);
        if added {
            tracing::info!(indicator = %spec, "Indicator activated");
        }
        added
    }

    /// Removes `spec` from the active set. A computation already running
    /// still includes it.
    pub fn deactivate(&self, spec: &IndicatorSpec) -> bool {
        let removed = Arc::make_mut(&mut *self.shared.active.write()).remove(spec);
        if removed {
            tracing::info!(indicator = %spec, "Indicator deactivated");
        }
        removed
    }

    pub fn active_indicators(&self) -> Vec<IndicatorSpec> {
        self.shared.active.read().iter().copied().collect()
    }

    pub fn current_bundle(&self) -> Arc<ResultBundle> {
        Arc::clone(&self.shared.bundles.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ResultBundle>> {
        self.shared.bundles.subscribe()
    }

    /// Bundle updates as a stream, starting with the current bundle.
    pub fn subscribe_stream(&self) -> WatchStream<Arc<ResultBundle>> {
        WatchStream::new(self.subscribe())
    }

    pub fn status(&self) -> FeedStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FeedStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops the worker. The last bundle stays readable.
    pub fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.cancel_pending();
            self.worker.abort();
            tracing::info!("Recompute coordinator shut down");
        }
    }
}

impl Drop for RecomputeCoordinator {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(shared: Arc<Shared>, mut snapshots: watch::Receiver<Option<Submission>>) {
    while snapshots.changed().await.is_ok() {
        let Some(Submission { ticket, series }) = snapshots.borrow_and_update().clone() else {
            continue;
        };
        if !shared.is_current(ticket) {
            tracing::debug!(sequence = ticket.sequence, "Skipping snapshot from a cancelled cycle");
            continue;
        }

        // The active set is fixed for the whole computation.
        let specs = Arc::clone(&shared.active.read());
        shared.set_phase(CyclePhase::Computing);
        let started = Instant::now();
        let computed =
            tokio::task::spawn_blocking(move || ResultBundle::compute(ticket.sequence, &series, specs.iter())).await;
        let bundle = match computed {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::error!("Indicator computation for cycle {} failed: {}", ticket.sequence, e);
                shared.set_phase(CyclePhase::Idle);
                continue;
            }
        };

        if matches!(snapshots.has_changed(), Ok(true)) {
            tracing::debug!(sequence = ticket.sequence, "Result superseded by a newer snapshot");
            continue;
        }
        if shared.publish(ticket, bundle) {
            tracing::debug!(
                sequence = ticket.sequence,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Published result bundle"
            );
        } else {
            tracing::debug!(sequence = ticket.sequence, "Result from a cancelled cycle dropped");
            shared.set_phase(CyclePhase::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorOutput;
    use shared::models::Candle;
    use std::time::Duration;
    use tokio::time::timeout;

    fn series(closes: &[f64]) -> CandleSeries {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle { timestamp: i as i64 * 60_000, open: c, high: c + 1.0, low: c - 1.0, close: c, volume: 100 })
            .collect();
        CandleSeries::new(candles).unwrap()
    }

    fn ramp(n: usize) -> CandleSeries {
        series(&(0..n).map(|i| 100.0 + i as f64).collect::<Vec<_>>())
    }

    fn sma3() -> IndicatorSpec {
        IndicatorSpec::sma(3).unwrap()
    }

    async fn wait_for_sequence(rx: &mut watch::Receiver<Arc<ResultBundle>>, sequence: u64) -> Arc<ResultBundle> {
        let bundle = timeout(Duration::from_secs(5), rx.wait_for(|b| b.sequence() >= sequence))
            .await
            .expect("bundle not published in time")
            .expect("bundle channel closed");
        Arc::clone(&bundle)
    }

    async fn assert_no_publication(rx: &mut watch::Receiver<Arc<ResultBundle>>) {
        assert!(timeout(Duration::from_millis(100), rx.changed()).await.is_err());
    }

    #[tokio::test]
    async fn test_starts_with_empty_bundle() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let bundle = coordinator.current_bundle();
        assert_eq!(bundle.sequence(), 0);
        assert!(bundle.is_empty());
        assert_eq!(coordinator.status(), FeedStatus::default());
    }

    #[tokio::test]
    async fn test_snapshot_publishes_bundle_for_active_set() {
        let coordinator = RecomputeCoordinator::new(2, [sma3(), IndicatorSpec::vwap()]);
        let mut rx = coordinator.subscribe();
        assert!(coordinator.on_snapshot(series(&[10.0, 11.0, 12.0, 11.0, 13.0])).unwrap());

        let bundle = wait_for_sequence(&mut rx, 1).await;
        assert_eq!(bundle.len(), 2);
        let sma = bundle.output(&sma3()).and_then(IndicatorOutput::as_line).unwrap();
        assert_eq!(sma.values(), &[None, None, Some(11.0), Some(34.0 / 3.0), Some(12.0)]);
        assert_eq!(coordinator.status().last_published, Some(1));
        assert_eq!(coordinator.status().phase, CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_back_to_back_snapshots_publish_only_the_latest() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut rx = coordinator.subscribe();
        coordinator.on_snapshot(ramp(10)).unwrap();
        coordinator.on_snapshot(ramp(12)).unwrap();

        let bundle = wait_for_sequence(&mut rx, 1).await;
        assert_eq!(bundle.sequence(), 2);
        assert_eq!(bundle.candle_count(), 12);
        assert_no_publication(&mut rx).await;
    }

    #[tokio::test]
    async fn test_out_of_order_snapshot_is_discarded() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut rx = coordinator.subscribe();
        let older = coordinator.begin_cycle();
        let newer = coordinator.begin_cycle();

        assert!(coordinator.submit(newer, ramp(8)).unwrap());
        assert!(!coordinator.submit(older, ramp(5)).unwrap());

        let bundle = wait_for_sequence(&mut rx, newer.sequence()).await;
        assert_eq!(bundle.candle_count(), 8);
        assert_no_publication(&mut rx).await;
    }

    #[tokio::test]
    async fn test_cancelled_cycle_never_publishes() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut rx = coordinator.subscribe();

        let accepted = coordinator.begin_cycle();
        assert!(coordinator.submit(accepted, ramp(6)).unwrap());
        let late = coordinator.begin_cycle();
        coordinator.cancel_pending();

        assert!(!coordinator.submit(late, ramp(7)).unwrap());
        assert!(!coordinator.record_fetch_failure(late, &EngineError::FetchFailure("timeout".into())));
        assert_no_publication(&mut rx).await;
        assert_eq!(coordinator.current_bundle().sequence(), 0);
    }

    #[tokio::test]
    async fn test_ticket_for_cancelled_generation_is_stale() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut rx = coordinator.subscribe();
        let old_view = coordinator.current_epoch();
        coordinator.clear();
        let cleared = coordinator.current_bundle().sequence();
        assert_ne!(coordinator.current_epoch(), old_view);

        let ticket = coordinator.begin_cycle_in(old_view);
        assert_eq!(coordinator.status().phase, CyclePhase::Idle);
        assert!(!coordinator.submit(ticket, ramp(9)).unwrap());
        assert!(!coordinator.record_fetch_failure(ticket, &EngineError::FetchFailure("late".into())));
        assert_no_publication(&mut rx).await;
        assert_eq!(coordinator.current_bundle().sequence(), cleared);

        let fresh = coordinator.begin_cycle_in(coordinator.current_epoch());
        assert!(coordinator.submit(fresh, ramp(4)).unwrap());
        assert_eq!(wait_for_sequence(&mut rx, fresh.sequence()).await.candle_count(), 4);
    }

    #[tokio::test]
    async fn test_identical_snapshots_give_identical_results() {
        let coordinator = RecomputeCoordinator::new(2, [sma3(), IndicatorSpec::rsi(3).unwrap()]);
        let mut rx = coordinator.subscribe();
        coordinator.on_snapshot(ramp(20)).unwrap();
        let first = wait_for_sequence(&mut rx, 1).await;
        coordinator.on_snapshot(ramp(20)).unwrap();
        let second = wait_for_sequence(&mut rx, 2).await;

        assert_eq!(second.sequence(), 2);
        assert!(first.same_results(&second));
    }

    #[tokio::test]
    async fn test_deactivation_applies_from_the_next_cycle() {
        let macd = IndicatorSpec::macd(12, 26, 9).unwrap();
        let coordinator = RecomputeCoordinator::new(2, [sma3(), macd]);
        let mut rx = coordinator.subscribe();
        let mut status = coordinator.subscribe_status();

        coordinator.on_snapshot(ramp(60)).unwrap();
        // Once the worker reports Computing the active set has been captured.
        timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.phase == CyclePhase::Computing || s.last_published == Some(1)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(coordinator.deactivate(&macd));

        let in_flight = wait_for_sequence(&mut rx, 1).await;
        assert!(in_flight.contains(&macd));

        coordinator.on_snapshot(ramp(61)).unwrap();
        let next = wait_for_sequence(&mut rx, 2).await;
        assert!(!next.contains(&macd));
        assert!(next.contains(&sma3()));
    }

    #[tokio::test]
    async fn test_fetch_failures_keep_bundle_and_mark_stale() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut rx = coordinator.subscribe();
        coordinator.on_snapshot(ramp(5)).unwrap();
        let good = wait_for_sequence(&mut rx, 1).await;

        let failure = EngineError::FetchFailure("quote API timeout".into());
        let first = coordinator.begin_cycle();
        assert!(coordinator.record_fetch_failure(first, &failure));
        let status = coordinator.status();
        assert_eq!(status.consecutive_failures, 1);
        assert!(!status.stale);
        assert_eq!(status.phase, CyclePhase::Idle);

        let second = coordinator.begin_cycle();
        assert!(coordinator.record_fetch_failure(second, &failure));
        let status = coordinator.status();
        assert!(status.stale);
        assert_eq!(status.last_error.as_deref(), Some("Fetch failure: quote API timeout"));
        assert!(Arc::ptr_eq(&good, &coordinator.current_bundle()));

        let third = coordinator.begin_cycle();
        coordinator.submit(third, ramp(6)).unwrap();
        wait_for_sequence(&mut rx, third.sequence()).await;
        let status = coordinator.status();
        assert!(!status.stale);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_activation_and_recompute_latest() {
        let coordinator = RecomputeCoordinator::new(2, []);
        let mut rx = coordinator.subscribe();
        coordinator.on_snapshot(ramp(30)).unwrap();
        assert!(wait_for_sequence(&mut rx, 1).await.is_empty());

        let ema = IndicatorSpec::ema(5).unwrap();
        assert!(coordinator.activate(ema));
        assert!(!coordinator.activate(ema));
        assert_eq!(coordinator.active_indicators(), vec![ema]);

        assert!(coordinator.recompute_latest().unwrap());
        let bundle = wait_for_sequence(&mut rx, 2).await;
        assert_eq!(bundle.candle_count(), 30);
        assert!(bundle.output(&ema).is_some());
    }

    #[tokio::test]
    async fn test_clear_publishes_empty_bundle() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut rx = coordinator.subscribe();
        coordinator.on_snapshot(ramp(5)).unwrap();
        wait_for_sequence(&mut rx, 1).await;

        coordinator.clear();
        let bundle = coordinator.current_bundle();
        assert!(bundle.is_empty());
        assert_eq!(bundle.candle_count(), 0);
        assert!(bundle.sequence() > 1);
        assert!(!coordinator.recompute_latest().unwrap());
    }

    #[tokio::test]
    async fn test_stream_yields_current_then_updates() {
        use tokio_stream::StreamExt;

        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        let mut stream = coordinator.subscribe_stream();
        assert_eq!(stream.next().await.unwrap().sequence(), 0);
        coordinator.on_snapshot(ramp(4)).unwrap();
        let next = timeout(Duration::from_secs(5), stream.next()).await.unwrap().unwrap();
        assert_eq!(next.sequence(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let coordinator = RecomputeCoordinator::new(2, [sma3()]);
        coordinator.shutdown();
        assert!(coordinator.is_closed());
        assert!(matches!(coordinator.on_snapshot(ramp(3)), Err(EngineError::CoordinatorClosed)));
        assert_eq!(coordinator.current_bundle().sequence(), 0);
    }
}
