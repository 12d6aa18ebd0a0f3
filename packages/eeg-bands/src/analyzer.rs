//! Per-channel band power computation
//!
//! For each channel of a [`Window`] the Welch PSD is estimated and integrated
//! (trapezoidal rule) over the bins of every configured band. The
//! cross-channel mean per band is reported alongside.

use crate::bands::{BandDefinition, BandEdges};
use crate::error::{AnalysisError, Result};
use crate::snapshot::{BandPowers, MetricsSnapshot};
use crate::welch::WelchEstimator;
use crate::window::{SlidingWindowBuffer, Window};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters shared by the window buffer and the analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sampling rate in Hz
    pub sample_rate: f64,

    /// Samples per analysis window (W)
    pub window_size: usize,

    /// Ordered band table
    pub bands: Vec<BandDefinition>,

    /// Boundary convention for band membership
    #[serde(default)]
    pub band_edges: BandEdges,

    /// Expected channel count (None = taken from the first sample)
    #[serde(default)]
    pub channels: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250.0,
            window_size: 250,
            bands: BandDefinition::defaults(),
            band_edges: BandEdges::default(),
            channels: None,
        }
    }
}

impl AnalysisConfig {
    /// Window size derived from a duration: `round(sample_rate * seconds)`
    pub fn window_size_for(sample_rate: f64, window_seconds: f64) -> Result<usize> {
        let size = (sample_rate * window_seconds).round();
        if !size.is_finite() || size < 2.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "{} s at {} Hz gives fewer than 2 samples per window",
                window_seconds, sample_rate
            )));
        }
        Ok(size as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.window_size < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "window size must be at least 2 samples, got {}",
                self.window_size
            )));
        }
        if self.bands.is_empty() {
            return Err(AnalysisError::InvalidBand("no bands configured".to_string()));
        }
        let nyquist = self.sample_rate / 2.0;
        if let Some(band) = self.bands.iter().find(|b| b.lo > nyquist) {
            return Err(AnalysisError::InvalidBand(format!(
                "{} starts above the Nyquist frequency ({} Hz)",
                band.name, nyquist
            )));
        }
        if self.channels == Some(0) {
            return Err(AnalysisError::InvalidConfig(
                "channel count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Sliding buffer matching this configuration
    pub fn window_buffer(&self) -> Result<SlidingWindowBuffer> {
        match self.channels {
            Some(channels) => SlidingWindowBuffer::with_channels(self.window_size, channels),
            None => SlidingWindowBuffer::new(self.window_size),
        }
    }
}

/// Computes [`MetricsSnapshot`]s from fixed-size windows
#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    config: AnalysisConfig,
    welch: WelchEstimator,
    frequencies: Vec<f64>,
    // PSD bin indices covered by each band, in band order
    band_bins: Vec<Vec<usize>>,
}

impl SpectralAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        let welch = WelchEstimator::for_signal_len(config.sample_rate, config.window_size)?;
        let frequencies = welch.frequencies();

        let band_bins: Vec<Vec<usize>> = config
            .bands
            .iter()
            .map(|band| {
                frequencies
                    .iter()
                    .enumerate()
                    .filter(|(_, &f)| band.contains(f, config.band_edges))
                    .map(|(k, _)| k)
                    .collect()
            })
            .collect();

        for (band, bins) in config.bands.iter().zip(&band_bins) {
            if bins.len() < 2 {
                log::warn!(
                    "Band {} [{}, {}] Hz covers {} PSD bin(s) at {:.3} Hz resolution; its power will be 0",
                    band.name,
                    band.lo,
                    band.hi,
                    bins.len(),
                    welch.resolution()
                );
            }
        }

        log::debug!(
            "Spectral analyzer ready: {} Hz, window {} samples, segment {} samples, {} bands ({})",
            config.sample_rate,
            config.window_size,
            welch.segment_len(),
            config.bands.len(),
            config.band_edges
        );

        Ok(Self {
            config,
            welch,
            frequencies,
            band_bins,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn bands(&self) -> &[BandDefinition] {
        &self.config.bands
    }

    /// Frequencies (Hz) of the PSD bins integrated for `band`
    pub fn band_frequencies(&self, band: &str) -> Option<Vec<f64>> {
        let idx = self.config.bands.iter().position(|b| b.name == band)?;
        Some(self.band_bins[idx].iter().map(|&k| self.frequencies[k]).collect())
    }

    pub fn compute(&self, window: &Window) -> Result<MetricsSnapshot> {
        if window.num_samples() != self.config.window_size {
            return Err(AnalysisError::MalformedWindow(format!(
                "expected {} samples per channel, got {}",
                self.config.window_size,
                window.num_samples()
            )));
        }
        if let Some(expected) = self.config.channels {
            if window.num_channels() != expected {
                return Err(AnalysisError::ChannelMismatch {
                    expected,
                    actual: window.num_channels(),
                });
            }
        }

        let per_channel: Vec<Vec<f64>> = window
            .channels()
            .par_iter()
            .map(|signal| self.channel_band_powers(signal))
            .collect::<Result<_>>()?;

        let n_channels = per_channel.len() as f64;
        let average = BandPowers::new(
            self.config
                .bands
                .iter()
                .enumerate()
                .map(|(b, band)| {
                    let sum: f64 = per_channel.iter().map(|powers| powers[b]).sum();
                    (band.name.clone(), sum / n_channels)
                })
                .collect(),
        );

        let channels = per_channel
            .into_iter()
            .enumerate()
            .map(|(c, powers)| {
                let entries = self
                    .config
                    .bands
                    .iter()
                    .zip(powers)
                    .map(|(band, power)| (band.name.clone(), power))
                    .collect();
                (MetricsSnapshot::channel_id(c), BandPowers::new(entries))
            })
            .collect();

        Ok(MetricsSnapshot::new(channels, average))
    }

    fn channel_band_powers(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let psd = self.welch.estimate(signal)?;
        Ok(self
            .band_bins
            .iter()
            .map(|bins| trapezoid(&psd.frequencies, &psd.density, bins))
            .collect())
    }
}

/// Trapezoidal integral of `y(x)` over the given contiguous bin indices
fn trapezoid(x: &[f64], y: &[f64], bins: &[usize]) -> f64 {
    bins.windows(2)
        .map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            (x[b] - x[a]) * (y[a] + y[b]) / 2.0
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_window(freq: f64, channels: usize, n: usize, fs: f64) -> Window {
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect();
        Window::from_channels(vec![signal; channels]).unwrap()
    }

    #[test]
    fn test_trapezoid() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 2.0, 2.0, 0.0];
        assert_eq!(trapezoid(&x, &y, &[0, 1, 2, 3]), 4.0);
        assert_eq!(trapezoid(&x, &y, &[1, 2]), 2.0);
        assert_eq!(trapezoid(&x, &y, &[2]), 0.0);
        assert_eq!(trapezoid(&x, &y, &[]), 0.0);
    }

    #[test]
    fn test_alpha_sine_lands_in_alpha() {
        let analyzer = SpectralAnalyzer::new(AnalysisConfig::default()).unwrap();
        let snapshot = analyzer.compute(&sine_window(10.0, 2, 250, 250.0)).unwrap();

        let ch1 = snapshot.channel("ch1").unwrap();
        let alpha = ch1.get("alpha").unwrap();
        for band in ["delta", "theta", "beta"] {
            assert!(alpha > 100.0 * ch1.get(band).unwrap(), "alpha vs {}", band);
        }
    }

    #[test]
    fn test_average_is_channel_mean() {
        let analyzer = SpectralAnalyzer::new(AnalysisConfig::default()).unwrap();
        let loud: Vec<f64> = (0..250).map(|i| 3.0 * (i as f64 * 0.3).sin()).collect();
        let quiet: Vec<f64> = (0..250).map(|i| (i as f64 * 0.3).sin()).collect();
        let window = Window::from_channels(vec![loud, quiet]).unwrap();

        let snapshot = analyzer.compute(&window).unwrap();
        for band in analyzer.bands() {
            let a = snapshot.channel("ch1").unwrap().get(&band.name).unwrap();
            let b = snapshot.channel("ch2").unwrap().get(&band.name).unwrap();
            let avg = snapshot.average().get(&band.name).unwrap();
            assert!((avg - (a + b) / 2.0).abs() <= 1e-12 * avg.abs().max(1.0));
        }
    }

    #[test]
    fn test_inclusive_edges_share_boundary_bin() {
        let analyzer = SpectralAnalyzer::new(AnalysisConfig::default()).unwrap();
        assert_eq!(
            analyzer.band_frequencies("delta").unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(
            analyzer.band_frequencies("theta").unwrap(),
            vec![4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_half_open_edges_split_boundary_bin() {
        let analyzer = SpectralAnalyzer::new(AnalysisConfig {
            band_edges: BandEdges::HalfOpen,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(analyzer.band_frequencies("delta").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(
            analyzer.band_frequencies("theta").unwrap(),
            vec![4.0, 5.0, 6.0, 7.0]
        );
    }

    #[test]
    fn test_boundary_tone_power_by_edge_convention() {
        let window = sine_window(4.0, 1, 250, 250.0);

        let inclusive = SpectralAnalyzer::new(AnalysisConfig::default())
            .unwrap()
            .compute(&window)
            .unwrap();
        let half_open = SpectralAnalyzer::new(AnalysisConfig {
            band_edges: BandEdges::HalfOpen,
            ..Default::default()
        })
        .unwrap()
        .compute(&window)
        .unwrap();

        let delta_inc = inclusive.average().get("delta").unwrap();
        let delta_half = half_open.average().get("delta").unwrap();
        let theta_inc = inclusive.average().get("theta").unwrap();
        let theta_half = half_open.average().get("theta").unwrap();

        // The 4 Hz peak feeds delta only when the upper edge is inclusive.
        assert!(delta_inc > 2.0 * delta_half);
        assert!((theta_inc - theta_half).abs() <= 1e-9 * theta_inc);
    }

    #[test]
    fn test_narrow_band_integrates_to_zero() {
        let config = AnalysisConfig {
            bands: vec![BandDefinition::new("narrow", 10.2, 10.8).unwrap()],
            ..Default::default()
        };
        let analyzer = SpectralAnalyzer::new(config).unwrap();
        let snapshot = analyzer.compute(&sine_window(10.5, 1, 250, 250.0)).unwrap();
        assert_eq!(snapshot.average().get("narrow"), Some(0.0));
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let analyzer = SpectralAnalyzer::new(AnalysisConfig {
            channels: Some(2),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            analyzer.compute(&sine_window(10.0, 2, 200, 250.0)),
            Err(AnalysisError::MalformedWindow(_))
        ));
        assert!(matches!(
            analyzer.compute(&sine_window(10.0, 3, 250, 250.0)),
            Err(AnalysisError::ChannelMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalysisConfig {
            sample_rate: 0.0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(AnalysisConfig {
            bands: vec![BandDefinition::new("ultra", 200.0, 300.0).unwrap()],
            ..Default::default()
        }
        .validate()
        .is_err());
        assert_eq!(AnalysisConfig::window_size_for(250.0, 1.0).unwrap(), 250);
        assert_eq!(AnalysisConfig::window_size_for(256.0, 0.5).unwrap(), 128);
        assert!(AnalysisConfig::window_size_for(250.0, 0.001).is_err());
    }
}
