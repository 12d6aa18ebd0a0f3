// Producer-side sample pipeline
//
// Runs on the acquisition thread: every sample goes through the sliding
// window buffer, completed windows through the analyzer, and snapshots are
// handed to the relay. Nothing here awaits or blocks on the broadcast side.

use crate::error::BridgeResult;
use crate::relay::RelaySender;
use eeg_bands::{
    AnalysisConfig, AnalysisError, MetricsSnapshot, SlidingWindowBuffer, SpectralAnalyzer,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Running counters shared with the health endpoint
#[derive(Debug, Default)]
pub struct PipelineStats {
    samples_received: AtomicU64,
    samples_rejected: AtomicU64,
    windows_computed: AtomicU64,
    compute_errors: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatsSnapshot {
    pub samples_received: u64,
    pub samples_rejected: u64,
    pub windows_computed: u64,
    pub compute_errors: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            windows_computed: self.windows_computed.load(Ordering::Relaxed),
            compute_errors: self.compute_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct SamplePipeline {
    buffer: SlidingWindowBuffer,
    analyzer: SpectralAnalyzer,
    relay: RelaySender<MetricsSnapshot>,
    stats: Arc<PipelineStats>,
}

impl SamplePipeline {
    pub fn new(
        config: AnalysisConfig,
        relay: RelaySender<MetricsSnapshot>,
        stats: Arc<PipelineStats>,
    ) -> BridgeResult<Self> {
        let buffer = config.window_buffer()?;
        let analyzer = SpectralAnalyzer::new(config)?;
        Ok(Self {
            buffer,
            analyzer,
            relay,
            stats,
        })
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Feed one sample from the acquisition source
    ///
    /// A sample whose channel count differs from the established count is
    /// rejected and counted; the buffer is left as it was.
    pub fn on_sample(&mut self, sample: &[f64]) -> Result<(), AnalysisError> {
        self.stats.samples_received.fetch_add(1, Ordering::Relaxed);

        let window = match self.buffer.ingest(sample.to_vec()) {
            Ok(Some(window)) => window,
            Ok(None) => return Ok(()),
            Err(e) => {
                let rejected = self.stats.samples_rejected.fetch_add(1, Ordering::Relaxed) + 1;
                // A misconfigured device would otherwise log at the sample rate
                if rejected == 1 || rejected % 1000 == 0 {
                    warn!("Rejected sample ({} so far): {}", rejected, e);
                }
                return Err(e);
            }
        };

        match self.analyzer.compute(&window) {
            Ok(snapshot) => {
                self.stats.windows_computed.fetch_add(1, Ordering::Relaxed);
                if self.relay.handoff(snapshot).is_some() && !self.relay.is_closed() {
                    warn!("Relay full, dropped oldest pending snapshot");
                }
                Ok(())
            }
            Err(e) => {
                self.stats.compute_errors.fetch_add(1, Ordering::Relaxed);
                error!("Band power computation failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay;

    fn small_config() -> AnalysisConfig {
        AnalysisConfig {
            sample_rate: 250.0,
            window_size: 250,
            channels: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hands_off_one_snapshot_per_step() {
        let (tx, mut rx) = relay::channel(16);
        let stats = Arc::new(PipelineStats::default());
        let mut pipeline = SamplePipeline::new(small_config(), tx, stats.clone()).unwrap();

        for t in 0..500 {
            let x = (t as f64 * 0.3).sin();
            pipeline.on_sample(&[x, -x]).unwrap();
        }
        drop(pipeline);

        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }

        // 250, 375, 500
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].num_channels(), 2);
        let counts = stats.snapshot();
        assert_eq!(counts.samples_received, 500);
        assert_eq!(counts.windows_computed, 3);
        assert_eq!(counts.samples_rejected, 0);
    }

    #[test]
    fn test_mismatched_sample_is_counted_and_skipped() {
        let (tx, _rx) = relay::channel(4);
        let stats = Arc::new(PipelineStats::default());
        let mut pipeline = SamplePipeline::new(small_config(), tx, stats.clone()).unwrap();

        pipeline.on_sample(&[0.0, 0.0]).unwrap();
        let err = pipeline.on_sample(&[0.0, 0.0, 0.0]).unwrap_err();

        assert_eq!(
            err,
            AnalysisError::ChannelMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(stats.snapshot().samples_rejected, 1);
        assert_eq!(stats.snapshot().samples_received, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (tx, _rx) = relay::channel(4);
        let config = AnalysisConfig {
            window_size: 1,
            ..Default::default()
        };
        assert!(SamplePipeline::new(config, tx, Arc::default()).is_err());
    }
}
