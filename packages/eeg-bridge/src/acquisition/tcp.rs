// TCP source
//
// Connects to a peer (for example a vendor bridge or a recorded-session
// replayer) that writes newline-delimited frames.

use super::frame::read_frames;
use super::AcquisitionSource;
use crate::error::{BridgeError, BridgeResult};
use std::io::BufReader;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(250);

pub struct TcpSource {
    peer: SocketAddr,
    stream: TcpStream,
}

impl TcpSource {
    pub fn connect(addr: &str) -> BridgeResult<Self> {
        let unavailable =
            |reason: String| BridgeError::SourceUnavailable(format!("tcp {}: {}", addr, reason));

        let peer = addr
            .to_socket_addrs()
            .map_err(|e| unavailable(e.to_string()))?
            .next()
            .ok_or_else(|| unavailable("address did not resolve".to_string()))?;

        info!("Connecting to TCP source at {}", peer);
        let stream = TcpStream::connect_timeout(&peer, CONNECT_TIMEOUT)
            .map_err(|e| unavailable(e.to_string()))?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| unavailable(e.to_string()))?;

        Ok(Self { peer, stream })
    }
}

impl AcquisitionSource for TcpSource {
    fn describe(&self) -> String {
        format!("tcp {}", self.peer)
    }

    fn run(
        self: Box<Self>,
        on_sample: &mut dyn FnMut(&[f64]),
        cancel: &CancellationToken,
    ) -> BridgeResult<()> {
        let peer = self.peer;
        let mut reader = BufReader::new(self.stream);

        if !read_frames(&mut reader, on_sample, cancel)? {
            info!("TCP source {} closed the connection", peer);
        }
        Ok(())
    }
}
