// Acquisition sources
//
// A source delivers one sample per tick to a callback on a dedicated thread.
// New sources are added by:
// 1. Implementing the AcquisitionSource trait
// 2. Adding a variant to SourceConfig
// 3. Registering it in `create_source`
//
// Current implementations:
// - Serial: newline-delimited frames from a serial EEG board
// - TCP: newline-delimited frames from a network peer
// - Synthetic: generated multi-sine signal paced at the sample rate

mod frame;
mod serial;
mod synthetic;
mod tcp;

use crate::error::BridgeResult;
use crate::pipeline::SamplePipeline;
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use frame::{parse_frame, read_frames};
pub use serial::SerialSource;
pub use synthetic::SyntheticSource;
pub use tcp::TcpSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Serial port, e.g. /dev/ttyUSB0 on Linux or COM3 on Windows
    Serial { port: String, baud_rate: u32 },

    /// TCP peer writing one frame per line
    Tcp { addr: String },

    Synthetic { channels: usize, sample_rate: f64 },
}

/// A blocking producer of samples
///
/// Construction should verify that the device is reachable so failures
/// surface at startup. `run` is called once on the acquisition thread and
/// returns when the stream ends or `cancel` fires.
pub trait AcquisitionSource: Send {
    fn describe(&self) -> String;

    fn run(
        self: Box<Self>,
        on_sample: &mut dyn FnMut(&[f64]),
        cancel: &CancellationToken,
    ) -> BridgeResult<()>;
}

/// Build and open the source described by `config`
pub fn create_source(config: &SourceConfig) -> BridgeResult<Box<dyn AcquisitionSource>> {
    let source: Box<dyn AcquisitionSource> = match config {
        SourceConfig::Serial { port, baud_rate } => {
            Box::new(SerialSource::open(port, *baud_rate)?)
        }
        SourceConfig::Tcp { addr } => Box::new(TcpSource::connect(addr)?),
        SourceConfig::Synthetic {
            channels,
            sample_rate,
        } => Box::new(SyntheticSource::new(*channels, *sample_rate)?),
    };

    info!("Acquisition source ready: {}", source.describe());
    Ok(source)
}

/// Run `source` into `pipeline` on a dedicated `acquisition` thread
///
/// When the source stops for any reason the pipeline (and with it the relay
/// sender) is dropped and `cancel` is fired so the rest of the process winds
/// down too.
pub fn spawn_acquisition(
    source: Box<dyn AcquisitionSource>,
    mut pipeline: SamplePipeline,
    cancel: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || {
            let name = source.describe();
            info!("Acquisition started: {}", name);

            let result = source.run(
                &mut |sample: &[f64]| {
                    // Rejections and compute errors are counted and logged
                    // by the pipeline; the stream keeps going.
                    let _ = pipeline.on_sample(sample);
                },
                &cancel,
            );

            match result {
                Ok(()) if cancel.is_cancelled() => info!("Acquisition stopped: {}", name),
                Ok(()) => info!("Acquisition stream ended: {}", name),
                Err(e) => error!("Acquisition failed: {}", e),
            }

            drop(pipeline);
            cancel.cancel();
        })
}
