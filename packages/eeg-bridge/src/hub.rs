// Broadcast hub
//
// A single task owns the subscriber set. Connection handlers talk to it via
// `HubHandle` commands; computed snapshots arrive through the relay. Each
// dispatch serializes the payload once, appends it to the metrics sink and
// sends it to every subscriber concurrently. Subscribers whose send fails or
// times out are removed.

use crate::error::TransportError;
use crate::relay::RelayReceiver;
use crate::sink::MetricsSink;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub type SubscriberId = u64;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivery endpoint for one subscriber
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    /// Hand one text payload to the peer
    async fn send(&self, payload: Arc<str>) -> Result<(), TransportError>;

    /// Ask the peer connection to close
    async fn close(&self) {}

    fn describe(&self) -> String {
        "subscriber".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound on a single send before the subscriber is dropped
    pub send_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

pub enum HubCommand {
    Subscribe {
        id: SubscriberId,
        transport: Box<dyn SubscriberTransport>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub removed: Vec<SubscriberId>,
    pub recorded: bool,
}

/// Cloneable front door to a running hub
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
    subscriber_count: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Register a transport; `None` when the hub has stopped
    pub fn subscribe(&self, transport: Box<dyn SubscriberTransport>) -> Option<SubscriberId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.commands
            .send(HubCommand::Subscribe { id, transport })
            .ok()
            .map(|_| id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.commands.send(HubCommand::Unsubscribe { id });
    }

    /// Live subscriber count as last published by the hub
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

pub struct BroadcastHub {
    subscribers: HashMap<SubscriberId, Box<dyn SubscriberTransport>>,
    sink: Arc<MetricsSink>,
    config: HubConfig,
    next_id: Arc<AtomicU64>,
    subscriber_count: Arc<AtomicUsize>,
    commands_tx: mpsc::UnboundedSender<HubCommand>,
    commands_rx: mpsc::UnboundedReceiver<HubCommand>,
}

impl BroadcastHub {
    pub fn new(sink: Arc<MetricsSink>, config: HubConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            subscribers: HashMap::new(),
            sink,
            config,
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_count: Arc::new(AtomicUsize::new(0)),
            commands_tx,
            commands_rx,
        }
    }

    pub fn handle(&self) -> HubHandle {
        HubHandle {
            commands: self.commands_tx.clone(),
            next_id: self.next_id.clone(),
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn subscribe(&mut self, transport: Box<dyn SubscriberTransport>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.insert(id, transport);
        id
    }

    /// Remove a subscriber; absent ids are ignored
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.detach(id).is_some()
    }

    fn detach(&mut self, id: SubscriberId) -> Option<Box<dyn SubscriberTransport>> {
        let transport = self.subscribers.remove(&id)?;
        self.publish_count();
        info!(
            "Subscriber {} ({}) removed, {} remaining",
            id,
            transport.describe(),
            self.subscribers.len()
        );
        Some(transport)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    fn insert(&mut self, id: SubscriberId, transport: Box<dyn SubscriberTransport>) {
        info!(
            "Subscriber {} ({}) added, {} connected",
            id,
            transport.describe(),
            self.subscribers.len() + 1
        );
        self.subscribers.insert(id, transport);
        self.publish_count();
    }

    fn publish_count(&self) {
        self.subscriber_count
            .store(self.subscribers.len(), Ordering::Relaxed);
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Subscribe { id, transport } => self.insert(id, transport),
            HubCommand::Unsubscribe { id } => {
                self.unsubscribe(id);
            }
        }
    }

    /// Serialize `payload` once, record it, and fan it out
    ///
    /// Returns once every send attempt and the log append have finished.
    pub async fn dispatch<T: Serialize + ?Sized>(&mut self, payload: &T) -> DispatchReport {
        if self.subscribers.is_empty() && !self.sink.is_enabled() {
            return DispatchReport::default();
        }

        let text: Arc<str> = match serde_json::to_string(payload) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize payload: {}", e);
                return DispatchReport::default();
            }
        };

        let (recorded, failures) = tokio::join!(self.record(text.clone()), self.fan_out(text));

        let delivered = self.subscribers.len() - failures.len();
        let mut removed = Vec::with_capacity(failures.len());
        let mut evicted = Vec::with_capacity(failures.len());
        for (id, err) in failures {
            warn!("Dropping subscriber {}: {}", id, err);
            if let Some(transport) = self.detach(id) {
                removed.push(id);
                evicted.push(transport);
            }
        }

        // The peer connection outlives our handle unless told to close
        self.close_each(evicted.iter()).await;

        DispatchReport {
            delivered,
            removed,
            recorded,
        }
    }

    async fn record(&self, line: Arc<str>) -> bool {
        if !self.sink.is_enabled() {
            return false;
        }

        let sink = self.sink.clone();
        match tokio::task::spawn_blocking(move || sink.record(&line)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("{}", e);
                false
            }
            Err(e) => {
                error!("Metrics log task failed: {}", e);
                false
            }
        }
    }

    async fn fan_out(&self, text: Arc<str>) -> Vec<(SubscriberId, TransportError)> {
        let send_timeout = self.config.send_timeout;

        let sends = self.subscribers.iter().map(|(&id, transport)| {
            let text = text.clone();
            async move {
                let result = match tokio::time::timeout(send_timeout, transport.send(text)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(send_timeout)),
                };
                (id, result)
            }
        });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| (id, e)))
            .collect()
    }

    async fn close_each<'a, I>(&self, transports: I)
    where
        I: Iterator<Item = &'a Box<dyn SubscriberTransport>>,
    {
        let send_timeout = self.config.send_timeout;
        let closes = transports.map(|transport| async move {
            let _ = tokio::time::timeout(send_timeout, transport.close()).await;
        });
        join_all(closes).await;
    }

    async fn close_all(&mut self) {
        self.close_each(self.subscribers.values()).await;
        self.subscribers.clear();
        self.publish_count();
    }

    /// Drive the hub until the relay closes, then close every subscriber
    pub async fn run<T>(mut self, mut relay: RelayReceiver<T>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        info!("Broadcast hub started");
        let mut dispatched: u64 = 0;

        loop {
            tokio::select! {
                biased;

                Some(command) = self.commands_rx.recv() => self.apply(command),

                item = relay.recv() => match item {
                    Some(payload) => {
                        let report = self.dispatch(&payload).await;
                        dispatched += 1;
                        debug!(
                            "Dispatch {}: delivered to {}, removed {}",
                            dispatched,
                            report.delivered,
                            report.removed.len()
                        );
                    }
                    None => break,
                },
            }
        }

        // Connections opened during shutdown still get a close
        while let Ok(command) = self.commands_rx.try_recv() {
            self.apply(command);
        }

        let remaining = self.subscribers.len();
        self.close_all().await;
        info!(
            "Broadcast hub stopped after {} dispatches, closed {} subscribers",
            dispatched, remaining
        );
    }
}
