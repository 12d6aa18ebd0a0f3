use crate::acquisition::SourceConfig;
use crate::cli::{Cli, SourceKind};
use crate::hub::HubConfig;
use eeg_bands::{AnalysisConfig, AnalysisError, BandDefinition, BandEdges};
use std::path::PathBuf;
use std::time::Duration;

/// Bridge configuration resolved from CLI flags and `EEG_BRIDGE_*` variables
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Where samples come from
    pub source: SourceConfig,
    /// Window length, bands and rate for the spectral analysis
    pub analysis: AnalysisConfig,
    /// Host to bind (localhost, 0.0.0.0, ...)
    pub host: String,
    /// WebSocket / HTTP port
    pub ws_port: u16,
    /// Optional JSON-lines metrics log
    pub output_file: Option<PathBuf>,
    /// Pending snapshots kept between the producer and the hub
    pub relay_capacity: usize,
    /// Per-subscriber send timeout
    pub send_timeout: Duration,
    /// WebSocket keepalive ping interval
    pub ping_interval: Duration,
}

impl BridgeConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.channels == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channels",
                reason: "must be at least 1".to_string(),
            });
        }
        if cli.relay_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay-capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if cli.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "send-timeout-ms",
                reason: "must be positive".to_string(),
            });
        }
        if cli.ping_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ping-interval-secs",
                reason: "must be positive".to_string(),
            });
        }

        let band_edges: BandEdges = cli.band_edges.parse()?;
        let analysis = AnalysisConfig {
            sample_rate: cli.sample_rate,
            window_size: AnalysisConfig::window_size_for(cli.sample_rate, cli.window_seconds)?,
            bands: BandDefinition::parse_list(&cli.bands)?,
            band_edges,
            channels: Some(cli.channels),
        };
        analysis.validate()?;

        let source = match cli.source {
            SourceKind::Serial => SourceConfig::Serial {
                port: cli.serial_port.clone(),
                baud_rate: cli.baud_rate,
            },
            SourceKind::Tcp => SourceConfig::Tcp {
                addr: cli.tcp_addr.clone(),
            },
            SourceKind::Synthetic => SourceConfig::Synthetic {
                channels: cli.channels,
                sample_rate: cli.sample_rate,
            },
        };

        Ok(Self {
            source,
            analysis,
            host: cli.host.clone(),
            ws_port: cli.ws_port,
            output_file: cli.output_file.clone(),
            relay_capacity: cli.relay_capacity,
            send_timeout: Duration::from_millis(cli.send_timeout_ms),
            ping_interval: Duration::from_secs(cli.ping_interval_secs),
        })
    }

    /// Get the full bind address (host:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            send_timeout: self.send_timeout,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for --{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid analysis settings: {0}")]
    Analysis(#[from] AnalysisError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Result<BridgeConfig, ConfigError> {
        let mut argv = vec!["eeg-bridge"];
        argv.extend_from_slice(args);
        BridgeConfig::from_cli(&Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_window_follows_rate_and_seconds() {
        let config = parse(&[
            "--source",
            "synthetic",
            "--sample-rate",
            "500",
            "--window-seconds",
            "2",
            "--channels",
            "4",
        ])
        .unwrap();

        assert_eq!(config.analysis.window_size, 1000);
        assert_eq!(config.analysis.channels, Some(4));
        assert_eq!(
            config.source,
            SourceConfig::Synthetic {
                channels: 4,
                sample_rate: 500.0
            }
        );
    }

    #[test]
    fn test_custom_bands_and_edges() {
        let config = parse(&[
            "--bands",
            "low:1-10,high:10-40",
            "--band-edges",
            "half-open",
        ])
        .unwrap();

        let names: Vec<&str> = config.analysis.bands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["low", "high"]);
        assert_eq!(config.analysis.band_edges, BandEdges::HalfOpen);
    }

    #[test]
    fn test_bind_address_and_timeouts() {
        let config = parse(&[
            "--host",
            "0.0.0.0",
            "--ws-port",
            "9001",
            "--send-timeout-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:9001");
        assert_eq!(config.hub_config().send_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse(&["--channels", "0"]).is_err());
        assert!(parse(&["--relay-capacity", "0"]).is_err());
        assert!(parse(&["--bands", "alpha:12-8"]).is_err());
        assert!(parse(&["--band-edges", "sideways"]).is_err());
        assert!(parse(&["--window-seconds", "0"]).is_err());
        // 60 Hz band starts above Nyquist for 100 Hz sampling
        assert!(parse(&["--sample-rate", "100", "--bands", "gamma:60-80"]).is_err());
    }
}
