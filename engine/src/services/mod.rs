// engine/src/services/mod.rs
pub mod recompute_service;

pub use recompute_service::{
    CycleTicket, CyclePhase, FeedStatus, LiveRefresh, RecomputeCoordinator, ResultBundle,
};
