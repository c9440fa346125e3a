use serde::Serialize;

/// What the coordinator is doing right now. Advisory only; readers never wait on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Computing,
}

/// Feed health as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    pub phase: CyclePhase,
    pub consecutive_failures: u32,
    /// Set once `consecutive_failures` reaches the configured threshold.
    /// Cleared by the next published bundle.
    pub stale: bool,
    pub last_error: Option<String>,
    pub last_published: Option<u64>,
}

impl Default for FeedStatus {
    fn default() -> Self {
        FeedStatus {
            phase: CyclePhase::Idle,
            consecutive_failures: 0,
            stale: false,
            last_error: None,
            last_published: None,
        }
    }
}

impl FeedStatus {
    pub(crate) fn record_failure(&mut self, error: String, stale_after: u32) {
        self.phase = CyclePhase::Idle;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.stale = self.consecutive_failures >= stale_after;
        self.last_error = Some(error);
    }

    pub(crate) fn record_publish(&mut self, sequence: u64) {
        self.phase = CyclePhase::Idle;
        self.consecutive_failures = 0;
        self.stale = false;
        self.last_error = None;
        self.last_published = Some(sequence);
    }
}
