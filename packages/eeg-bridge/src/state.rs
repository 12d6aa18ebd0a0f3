use crate::hub::HubHandle;
use crate::pipeline::PipelineStats;
use crate::relay::RelayMonitor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub stats: Arc<PipelineStats>,
    pub relay: RelayMonitor,
    pub ping_interval: Duration,
    pub cancel: CancellationToken,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        hub: HubHandle,
        stats: Arc<PipelineStats>,
        relay: RelayMonitor,
        ping_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub,
            stats,
            relay,
            ping_interval,
            cancel,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
