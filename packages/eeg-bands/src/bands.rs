//! Frequency band definitions
//!
//! A band is a named interval `[lo, hi]` in Hz. Which PSD bins fall inside it
//! depends on the [`BandEdges`] convention in effect.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Convention for deciding whether a bin at frequency `f` lies in `[lo, hi]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandEdges {
    /// `lo <= f <= hi`. A bin sitting on a shared boundary (4, 8, 12 Hz with
    /// the default table) is integrated by both neighbouring bands.
    #[default]
    Inclusive,

    /// `lo <= f < hi`. Every bin belongs to at most one adjacent band.
    HalfOpen,
}

impl FromStr for BandEdges {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inclusive" => Ok(Self::Inclusive),
            "half-open" | "half_open" | "halfopen" => Ok(Self::HalfOpen),
            other => Err(AnalysisError::InvalidConfig(format!(
                "unknown band edge convention '{}' (expected 'inclusive' or 'half-open')",
                other
            ))),
        }
    }
}

impl fmt::Display for BandEdges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inclusive => write!(f, "inclusive"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A named frequency band in Hz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDefinition {
    pub name: String,
    pub lo: f64,
    pub hi: f64,
}

impl BandDefinition {
    pub fn new(name: impl Into<String>, lo: f64, hi: f64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AnalysisError::InvalidBand("band name is empty".to_string()));
        }
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo >= hi {
            return Err(AnalysisError::InvalidBand(format!(
                "{}: expected 0 <= lo < hi, got [{}, {}]",
                name, lo, hi
            )));
        }
        Ok(Self { name, lo, hi })
    }

    /// The classic EEG bands: delta, theta, alpha, beta
    pub fn defaults() -> Vec<BandDefinition> {
        vec![
            Self::known("delta", 1.0, 4.0),
            Self::known("theta", 4.0, 8.0),
            Self::known("alpha", 8.0, 12.0),
            Self::known("beta", 12.0, 30.0),
        ]
    }

    fn known(name: &str, lo: f64, hi: f64) -> Self {
        Self {
            name: name.to_string(),
            lo,
            hi,
        }
    }

    /// Whether a bin at `freq` Hz contributes to this band
    #[inline]
    pub fn contains(&self, freq: f64, edges: BandEdges) -> bool {
        match edges {
            BandEdges::Inclusive => freq >= self.lo && freq <= self.hi,
            BandEdges::HalfOpen => freq >= self.lo && freq < self.hi,
        }
    }

    /// Parse a comma separated list such as `delta:1-4,theta:4-8`
    ///
    /// Order is preserved; duplicate names are rejected.
    pub fn parse_list(list: &str) -> Result<Vec<BandDefinition>> {
        let mut bands: Vec<BandDefinition> = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let band: BandDefinition = part.parse()?;
            if bands.iter().any(|b| b.name == band.name) {
                return Err(AnalysisError::InvalidBand(format!(
                    "duplicate band name '{}'",
                    band.name
                )));
            }
            bands.push(band);
        }
        if bands.is_empty() {
            return Err(AnalysisError::InvalidBand("no bands given".to_string()));
        }
        Ok(bands)
    }
}

impl FromStr for BandDefinition {
    type Err = AnalysisError;

    /// `name:lo-hi`, e.g. `alpha:8-12` or `gamma:30.5-45`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AnalysisError::InvalidBand(format!("expected 'name:lo-hi', got '{}'", s));

        let (name, range) = s.split_once(':').ok_or_else(invalid)?;
        let (lo, hi) = range.split_once('-').ok_or_else(invalid)?;
        let lo: f64 = lo.trim().parse().map_err(|_| invalid())?;
        let hi: f64 = hi.trim().parse().map_err(|_| invalid())?;

        Self::new(name.trim(), lo, hi)
    }
}
