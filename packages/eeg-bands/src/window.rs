//! Sliding window over an incoming sample stream
//!
//! Samples are appended one at a time. Once `W` samples are buffered the most
//! recent `W` are copied out as a [`Window`] and the buffer is cut back to its
//! newest `W / 2` samples, so consecutive windows overlap by half.

use crate::error::{AnalysisError, Result};
use std::collections::VecDeque;

/// One reading per channel, taken at a single instant
pub type Sample = Vec<f64>;

/// Fixed-length block of samples, stored channel-major: `channels[c][t]`
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    channels: Vec<Vec<f64>>,
}

impl Window {
    /// Build a window from per-channel series, which must share one length
    pub fn from_channels(channels: Vec<Vec<f64>>) -> Result<Self> {
        let len = channels
            .first()
            .map(Vec::len)
            .ok_or_else(|| AnalysisError::MalformedWindow("window has no channels".to_string()))?;

        if len == 0 {
            return Err(AnalysisError::MalformedWindow(
                "window has no samples".to_string(),
            ));
        }

        if let Some((idx, ch)) = channels.iter().enumerate().find(|(_, ch)| ch.len() != len) {
            return Err(AnalysisError::MalformedWindow(format!(
                "channel {} has {} samples, expected {}",
                idx + 1,
                ch.len(),
                len
            )));
        }

        Ok(Self { channels })
    }

    /// Build a window from time-ordered samples (`samples[t][c]`)
    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        let n_channels = samples.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = samples.iter().find(|s| s.len() != n_channels) {
            return Err(AnalysisError::ChannelMismatch {
                expected: n_channels,
                actual: bad.len(),
            });
        }
        Self::from_channels(transpose(samples.iter(), n_channels, samples.len()))
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel(&self, idx: usize) -> Option<&[f64]> {
        self.channels.get(idx).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }
}

fn transpose<'a>(
    samples: impl Iterator<Item = &'a Sample>,
    n_channels: usize,
    n_samples: usize,
) -> Vec<Vec<f64>> {
    let mut channels = vec![Vec::with_capacity(n_samples); n_channels];
    for sample in samples {
        for (ch, &value) in channels.iter_mut().zip(sample.iter()) {
            ch.push(value);
        }
    }
    channels
}

/// Accumulates samples and emits a full window every `W - W/2` samples
#[derive(Debug, Clone)]
pub struct SlidingWindowBuffer {
    samples: VecDeque<Sample>,
    window_size: usize,
    retain: usize,
    channel_count: Option<usize>,
}

impl SlidingWindowBuffer {
    /// Create a buffer whose channel count is fixed by the first sample
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "window size must be at least 2 samples, got {}",
                window_size
            )));
        }

        Ok(Self {
            samples: VecDeque::with_capacity(window_size),
            window_size,
            retain: window_size / 2,
            channel_count: None,
        })
    }

    /// Create a buffer that only accepts samples with `channels` readings
    pub fn with_channels(window_size: usize, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(AnalysisError::InvalidConfig(
                "channel count must be positive".to_string(),
            ));
        }
        let mut buffer = Self::new(window_size)?;
        buffer.channel_count = Some(channels);
        Ok(buffer)
    }

    /// Append one sample; returns a window when the trigger length is reached
    ///
    /// A sample whose channel count differs from the established count is
    /// rejected and leaves the buffer untouched.
    pub fn ingest(&mut self, sample: Sample) -> Result<Option<Window>> {
        match self.channel_count {
            Some(expected) if expected != sample.len() => {
                return Err(AnalysisError::ChannelMismatch {
                    expected,
                    actual: sample.len(),
                });
            }
            None if sample.is_empty() => {
                return Err(AnalysisError::ChannelMismatch {
                    expected: 1,
                    actual: 0,
                });
            }
            None => self.channel_count = Some(sample.len()),
            _ => {}
        }

        self.samples.push_back(sample);

        if self.samples.len() < self.window_size {
            return Ok(None);
        }

        // Extract before truncating: the window always sees all W samples.
        let skip = self.samples.len() - self.window_size;
        let n_channels = self.channel_count.unwrap_or(0);
        let window = Window {
            channels: transpose(self.samples.iter().skip(skip), n_channels, self.window_size),
        };

        let excess = self.samples.len() - self.retain;
        self.samples.drain(..excess);

        Ok(Some(window))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples kept after each trigger
    pub fn retained_len(&self) -> usize {
        self.retain
    }

    /// New samples needed between consecutive windows once primed
    pub fn step(&self) -> usize {
        self.window_size - self.retain
    }

    pub fn channel_count(&self) -> Option<usize> {
        self.channel_count
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
