// Synthetic source
//
// Emits a deterministic sum of sines per channel (a theta, an alpha and a
// beta component with channel-dependent weights) at the configured rate.
// Useful for demos and for running the bridge without hardware.

use super::AcquisitionSource;
use crate::error::{BridgeError, BridgeResult};
use std::f64::consts::PI;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// (frequency Hz, base amplitude)
const COMPONENTS: [(f64, f64); 3] = [(6.0, 20.0), (10.0, 30.0), (20.0, 8.0)];

pub struct SyntheticSource {
    channels: usize,
    sample_rate: f64,
    paced: bool,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(channels: usize, sample_rate: f64) -> BridgeResult<Self> {
        if channels == 0 {
            return Err(BridgeError::SourceUnavailable(
                "synthetic source needs at least one channel".to_string(),
            ));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(BridgeError::SourceUnavailable(format!(
                "synthetic source needs a positive sample rate, got {}",
                sample_rate
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
            paced: true,
            limit: None,
        })
    }

    /// Generate as fast as the consumer accepts samples
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Stop after `samples` samples
    pub fn with_limit(mut self, samples: u64) -> Self {
        self.limit = Some(samples);
        self
    }

    /// Reading for `channel` at sample index `t`
    pub fn value(&self, channel: usize, t: u64) -> f64 {
        let time = t as f64 / self.sample_rate;
        let weight = 1.0 + channel as f64 * 0.1;
        COMPONENTS
            .iter()
            .enumerate()
            .map(|(k, &(freq, amplitude))| {
                let phase = (channel + k) as f64 * PI / 7.0;
                let scale = if k == 1 { weight } else { 1.0 / weight };
                amplitude * scale * (2.0 * PI * freq * time + phase).sin()
            })
            .sum()
    }
}

impl AcquisitionSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "synthetic {} channels @ {} Hz",
            self.channels, self.sample_rate
        )
    }

    fn run(
        self: Box<Self>,
        on_sample: &mut dyn FnMut(&[f64]),
        cancel: &CancellationToken,
    ) -> BridgeResult<()> {
        let tick = Duration::from_secs_f64(1.0 / self.sample_rate);
        let started = Instant::now();
        let mut sample = vec![0.0; self.channels];
        let mut t: u64 = 0;

        while !cancel.is_cancelled() {
            if self.limit.is_some_and(|limit| t >= limit) {
                break;
            }

            for (channel, value) in sample.iter_mut().enumerate() {
                *value = self.value(channel, t);
            }
            on_sample(&sample);
            t += 1;

            if self.paced {
                // Sleep to the absolute deadline so timing errors do not accumulate
                let deadline = started + tick.mul_f64(t as f64);
                if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }
        }

        Ok(())
    }
}
