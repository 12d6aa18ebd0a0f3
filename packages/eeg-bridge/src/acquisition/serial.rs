// Serial port source
//
// Reads newline-delimited frames from a board on a serial port such as
// /dev/ttyUSB0. The port is opened when the source is built so a missing
// device is reported before the server starts.

use super::frame::read_frames;
use super::AcquisitionSource;
use crate::error::{BridgeError, BridgeResult};
use std::io::BufReader;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const READ_TIMEOUT: Duration = Duration::from_millis(250);

pub struct SerialSource {
    port_name: String,
    baud_rate: u32,
    port: Box<dyn tokio_serial::SerialPort>,
}

impl SerialSource {
    pub fn open(port_name: &str, baud_rate: u32) -> BridgeResult<Self> {
        info!("Opening serial port: {} at {} baud", port_name, baud_rate);

        let port = tokio_serial::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                BridgeError::SourceUnavailable(format!(
                    "cannot open serial port {}: {} (use --source synthetic to run without a board)",
                    port_name, e
                ))
            })?;

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port,
        })
    }
}

impl AcquisitionSource for SerialSource {
    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.port_name, self.baud_rate)
    }

    fn run(
        self: Box<Self>,
        on_sample: &mut dyn FnMut(&[f64]),
        cancel: &CancellationToken,
    ) -> BridgeResult<()> {
        let mut reader = BufReader::new(self.port);

        if read_frames(&mut reader, on_sample, cancel)? {
            return Ok(());
        }

        warn!("Serial port {} closed unexpectedly", self.port_name);
        Err(BridgeError::Acquisition(format!(
            "serial port {} closed",
            self.port_name
        )))
    }
}
