use crate::error::TransportError;
use crate::hub::SubscriberTransport;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Frames queued per connection before sends start to wait
const OUTBOUND_CAPACITY: usize = 32;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Hub-side handle to one WebSocket connection
pub struct WsSubscriber {
    peer: SocketAddr,
    outbound: mpsc::Sender<Message>,
    closed: CancellationToken,
}

#[async_trait]
impl SubscriberTransport for WsSubscriber {
    async fn send(&self, payload: Arc<str>) -> Result<(), TransportError> {
        self.outbound
            .send(Message::Text(payload.as_ref().into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Queue a close frame behind pending snapshots and end the connection
    ///
    /// Never waits on the queue: a peer that stopped reading still gets
    /// disconnected.
    async fn close(&self) {
        let _ = self.outbound.try_send(Message::Close(None));
        self.closed.cancel();
    }

    fn describe(&self) -> String {
        self.peer.to_string()
    }
}

/// Handle WebSocket upgrade
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let closed = CancellationToken::new();

    let writer = tokio::spawn(write_loop(sender, outbound_rx, state.ping_interval));

    let Some(id) = state.hub.subscribe(Box::new(WsSubscriber {
        peer,
        outbound: outbound.clone(),
        closed: closed.clone(),
    })) else {
        warn!("Rejecting WebSocket client {}: broadcast hub has stopped", peer);
        writer.abort();
        return;
    };

    info!("New WebSocket connection from {} (subscriber {})", peer, id);

    // On shutdown keep the connection until the hub has flushed the last
    // snapshots and closed it, or the drain period runs out.
    let drain = tokio::time::sleep(SHUTDOWN_DRAIN);
    tokio::pin!(drain);
    let mut draining = false;

    loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            _ = closed.cancelled() => {
                debug!("Hub closed subscriber {} ({})", id, peer);
                break;
            }
            _ = state.cancel.cancelled(), if !draining => {
                draining = true;
                drain.as_mut().reset(tokio::time::Instant::now() + SHUTDOWN_DRAIN);
                continue;
            }
            _ = &mut drain, if draining => break,
        };

        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!("WebSocket error from {}: {}", peer, e);
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => {
                // Clients have nothing to say; anything they send is ignored
                debug!("Ignoring {} bytes of text from {}", text.as_str().len(), peer);
            }
            Message::Close(_) => {
                info!("WebSocket connection closed by client {}", peer);
                break;
            }
            _ => {}
        }
    }

    // The writer flushes what is queued and ends once every sender is gone;
    // a stuck writer is aborted after the grace period.
    state.hub.unsubscribe(id);
    drop(outbound);
    let abort = writer.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
        abort.abort();
    }

    info!("WebSocket connection terminated: {}", peer);
}

/// Forward queued frames to the socket and keep the connection alive
async fn write_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    ping_interval: Duration,
) {
    let mut keepalive = tokio::time::interval(ping_interval);
    // The first tick completes immediately
    keepalive.tick().await;

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                let closing = matches!(msg, Message::Close(_));
                if sender.send(msg).await.is_err() || closing {
                    break;
                }
            }
            _ = keepalive.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
}
