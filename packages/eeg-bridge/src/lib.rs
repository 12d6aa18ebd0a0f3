pub mod acquisition;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod pipeline;
pub mod relay;
pub mod server;
pub mod sink;
pub mod state;
pub mod websocket;

pub use acquisition::{create_source, spawn_acquisition, AcquisitionSource, SourceConfig};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult, SinkError, TransportError};
pub use hub::{BroadcastHub, HubConfig, HubHandle, SubscriberId, SubscriberTransport};
pub use pipeline::{PipelineStats, SamplePipeline};
pub use relay::{RelayMetrics, RelayReceiver, RelaySender};
pub use sink::MetricsSink;
pub use state::AppState;
