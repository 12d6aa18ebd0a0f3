pub mod analyzer;
pub mod bands;
pub mod error;
pub mod snapshot;
pub mod welch;
pub mod window;

pub use analyzer::{AnalysisConfig, SpectralAnalyzer};
pub use bands::{BandDefinition, BandEdges};
pub use error::{AnalysisError, Result};
pub use snapshot::{BandPowers, MetricsSnapshot};
pub use welch::{Psd, WelchEstimator};
pub use window::{Sample, SlidingWindowBuffer, Window};
