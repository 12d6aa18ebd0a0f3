use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Serial-attached EEG board
    Serial,
    /// Newline-delimited frames over TCP
    Tcp,
    /// Generated test signal
    Synthetic,
}

/// EEG Bridge - real-time band power streaming over WebSocket
#[derive(Parser, Debug, Clone)]
#[command(name = "eeg-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Acquisition source
    #[arg(long, value_enum, env = "EEG_BRIDGE_SOURCE", default_value = "serial")]
    pub source: SourceKind,

    /// Serial port of the board
    #[arg(long, env = "EEG_BRIDGE_SERIAL_PORT", default_value = "/dev/ttyUSB0")]
    pub serial_port: String,

    #[arg(long, env = "EEG_BRIDGE_BAUD_RATE", default_value_t = 115_200)]
    pub baud_rate: u32,

    /// Address of a TCP frame source
    #[arg(long, env = "EEG_BRIDGE_TCP_ADDR", default_value = "127.0.0.1:5555")]
    pub tcp_addr: String,

    /// Number of EEG channels per sample
    #[arg(long, env = "EEG_BRIDGE_CHANNELS", default_value_t = 8)]
    pub channels: usize,

    /// Host to bind the WebSocket server to
    #[arg(long, env = "EEG_BRIDGE_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "EEG_BRIDGE_WS_PORT", default_value_t = 8765)]
    pub ws_port: u16,

    /// Append every computed snapshot to this file as JSON lines
    #[arg(long, env = "EEG_BRIDGE_OUTPUT_FILE")]
    pub output_file: Option<PathBuf>,

    /// Samples per second delivered by the source
    #[arg(long, env = "EEG_BRIDGE_SAMPLE_RATE", default_value_t = 250.0)]
    pub sample_rate: f64,

    /// Analysis window length in seconds
    #[arg(long, env = "EEG_BRIDGE_WINDOW_SECONDS", default_value_t = 1.0)]
    pub window_seconds: f64,

    /// Frequency bands as name:lo-hi, comma separated
    #[arg(
        long,
        env = "EEG_BRIDGE_BANDS",
        default_value = "delta:1-4,theta:4-8,alpha:8-12,beta:12-30"
    )]
    pub bands: String,

    /// Band edge convention: inclusive or half-open
    #[arg(long, env = "EEG_BRIDGE_BAND_EDGES", default_value = "inclusive")]
    pub band_edges: String,

    /// Snapshots held for slow broadcasting before the oldest is dropped
    #[arg(long, env = "EEG_BRIDGE_RELAY_CAPACITY", default_value_t = 16)]
    pub relay_capacity: usize,

    /// Per-subscriber send timeout in milliseconds
    #[arg(long, env = "EEG_BRIDGE_SEND_TIMEOUT_MS", default_value_t = 2000)]
    pub send_timeout_ms: u64,

    /// Keepalive ping interval for WebSocket clients, in seconds
    #[arg(long, env = "EEG_BRIDGE_PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,
}
