use crate::config::ConfigError;
use eeg_bands::AnalysisError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Acquisition source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write metrics log {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a payload could not be handed to a subscriber
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Peer connection closed")]
    Closed,

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Send failed: {0}")]
    Send(String),
}
