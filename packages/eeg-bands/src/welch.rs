//! Welch power spectral density estimate
//!
//! Averages modified periodograms of half-overlapping, Hann-windowed,
//! mean-removed segments. Defaults match the usual scientific-Python
//! behaviour: segments of 256 samples (or the whole signal when shorter),
//! 50% overlap, one-sided density scaling in units²/Hz.

use crate::error::{AnalysisError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// One-sided power spectral density
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    /// Bin centre frequencies in Hz, `k * fs / nperseg`
    pub frequencies: Vec<f64>,
    /// Density per bin, units²/Hz
    pub density: Vec<f64>,
}

/// Reusable Welch estimator for a fixed segment length and sample rate
///
/// The FFT plan and the taper are computed once at construction.
#[derive(Clone)]
pub struct WelchEstimator {
    sample_rate: f64,
    nperseg: usize,
    noverlap: usize,
    taper: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for WelchEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WelchEstimator")
            .field("sample_rate", &self.sample_rate)
            .field("nperseg", &self.nperseg)
            .field("noverlap", &self.noverlap)
            .finish()
    }
}

impl WelchEstimator {
    pub const DEFAULT_SEGMENT: usize = 256;

    /// Estimator for signals of `signal_len` samples using default segmenting
    pub fn for_signal_len(sample_rate: f64, signal_len: usize) -> Result<Self> {
        let nperseg = Self::DEFAULT_SEGMENT.min(signal_len);
        Self::new(sample_rate, nperseg, nperseg / 2)
    }

    pub fn new(sample_rate: f64, nperseg: usize, noverlap: usize) -> Result<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if nperseg < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "segment length must be at least 2, got {}",
                nperseg
            )));
        }
        if noverlap >= nperseg {
            return Err(AnalysisError::InvalidConfig(format!(
                "overlap ({}) must be smaller than segment length ({})",
                noverlap, nperseg
            )));
        }

        // Periodic Hann taper
        let taper: Vec<f64> = (0..nperseg)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / nperseg as f64).cos())
            .collect();
        let power: f64 = taper.iter().map(|w| w * w).sum();
        let scale = 1.0 / (sample_rate * power);

        let fft = FftPlanner::<f64>::new().plan_fft_forward(nperseg);

        Ok(Self {
            sample_rate,
            nperseg,
            noverlap,
            taper,
            scale,
            fft,
        })
    }

    pub fn segment_len(&self) -> usize {
        self.nperseg
    }

    pub fn overlap(&self) -> usize {
        self.noverlap
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frequency resolution in Hz
    pub fn resolution(&self) -> f64 {
        self.sample_rate / self.nperseg as f64
    }

    pub fn frequencies(&self) -> Vec<f64> {
        let resolution = self.resolution();
        (0..=self.nperseg / 2)
            .map(|k| k as f64 * resolution)
            .collect()
    }

    /// Number of segments averaged for a signal of `len` samples
    pub fn segment_count(&self, len: usize) -> usize {
        if len < self.nperseg {
            return 0;
        }
        (len - self.noverlap) / (self.nperseg - self.noverlap)
    }

    pub fn estimate(&self, signal: &[f64]) -> Result<Psd> {
        let segments = self.segment_count(signal.len());
        if segments == 0 {
            return Err(AnalysisError::MalformedWindow(format!(
                "signal of {} samples is shorter than one segment ({})",
                signal.len(),
                self.nperseg
            )));
        }

        let n_bins = self.nperseg / 2 + 1;
        let step = self.nperseg - self.noverlap;
        let mut density = vec![0.0; n_bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.nperseg];

        for seg in 0..segments {
            let start = seg * step;
            let segment = &signal[start..start + self.nperseg];
            let mean = segment.iter().sum::<f64>() / self.nperseg as f64;

            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.taper) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }

            self.fft.process(&mut buffer);

            for (acc, bin) in density.iter_mut().zip(&buffer[..n_bins]) {
                *acc += bin.norm_sqr();
            }
        }

        // One-sided: fold negative frequencies into every bin except DC and,
        // for even lengths, Nyquist.
        let fold_end = if self.nperseg % 2 == 0 {
            n_bins - 1
        } else {
            n_bins
        };
        let norm = self.scale / segments as f64;
        for (k, value) in density.iter_mut().enumerate() {
            *value *= norm;
            if k > 0 && k < fold_end {
                *value *= 2.0;
            }
        }

        Ok(Psd {
            frequencies: self.frequencies(),
            density,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_default_segmenting() {
        let short = WelchEstimator::for_signal_len(250.0, 250).unwrap();
        assert_eq!(short.segment_len(), 250);
        assert_eq!(short.overlap(), 125);
        assert_eq!(short.segment_count(250), 1);
        assert_eq!(short.resolution(), 1.0);

        let long = WelchEstimator::for_signal_len(500.0, 1000).unwrap();
        assert_eq!(long.segment_len(), 256);
        assert_eq!(long.segment_count(1000), 6);
    }

    #[test]
    fn test_frequency_axis() {
        let welch = WelchEstimator::for_signal_len(250.0, 250).unwrap();
        let freqs = welch.frequencies();
        assert_eq!(freqs.len(), 126);
        assert_eq!(freqs[0], 0.0);
        assert_eq!(freqs[125], 125.0);
    }

    #[test]
    fn test_peak_at_sine_frequency() {
        let fs = 250.0;
        let signal = sine(10.0, 1.0, fs, 250);
        let psd = WelchEstimator::for_signal_len(fs, signal.len())
            .unwrap()
            .estimate(&signal)
            .unwrap();

        let (peak_idx, _) = psd
            .density
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(psd.frequencies[peak_idx], 10.0);
    }

    #[test]
    fn test_parseval_for_sine() {
        // Integrated density of a unit sine is close to its variance (0.5).
        let fs = 256.0;
        let signal = sine(16.0, 1.0, fs, 1024);
        let welch = WelchEstimator::for_signal_len(fs, signal.len()).unwrap();
        let psd = welch.estimate(&signal).unwrap();

        let total: f64 = psd.density.iter().sum::<f64>() * welch.resolution();
        assert!((total - 0.5).abs() < 0.01, "total power {}", total);
    }

    #[test]
    fn test_constant_signal_has_no_power() {
        let welch = WelchEstimator::for_signal_len(250.0, 250).unwrap();
        let psd = welch.estimate(&vec![3.5; 250]).unwrap();
        assert!(psd.density.iter().all(|&p| p.abs() < 1e-20));
    }

    #[test]
    fn test_rejects_short_signal_and_bad_params() {
        let welch = WelchEstimator::new(250.0, 64, 32).unwrap();
        assert!(welch.estimate(&[0.0; 10]).is_err());
        assert!(WelchEstimator::new(0.0, 64, 32).is_err());
        assert!(WelchEstimator::new(250.0, 1, 0).is_err());
        assert!(WelchEstimator::new(250.0, 64, 64).is_err());
    }
}
