//! The hub: a single task that owns the connection registry.
//!
//! Registration, unregistration and broadcast fan-out are events on one
//! inbox and are processed strictly one at a time, so the registry is never
//! touched concurrently. Each registry entry holds the sending half of that
//! connection's outbound queue; removing the entry drops the sender, which
//! closes the queue. Because only the hub task removes entries, a queue is
//! closed at most once no matter how many times removal is requested.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatrelay_core::ConnectionId;
use metrics::{counter, gauge};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::metrics::{HUB_BROADCASTS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_EVICTIONS_TOTAL};

/// A serialized wire message shared by every outbound queue it is pushed to.
pub type Frame = Arc<String>;

/// The hub task is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hub is not running")]
pub struct HubStopped;

/// Why a connection was dropped during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Outbound queue at capacity.
    QueueFull,
    /// Outbound pump already gone.
    QueueClosed,
}

impl EvictReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::QueueClosed => "queue_closed",
        }
    }
}

/// Connection registry. Owned by the hub task; not shared.
#[derive(Default)]
pub(crate) struct Registry {
    connections: HashMap<ConnectionId, mpsc::Sender<Frame>>,
}

impl Registry {
    pub(crate) fn insert(&mut self, id: ConnectionId, outbound: mpsc::Sender<Frame>) {
        if self.connections.insert(id.clone(), outbound).is_some() {
            warn!(conn_id = %id, "connection registered twice, replacing queue");
        }
    }

    /// Remove `id`, closing its queue. Returns whether it was present.
    pub(crate) fn remove(&mut self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub(crate) fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    /// Push `frame` to every queue without waiting, then evict every
    /// connection that could not take it.
    pub(crate) fn fan_out(&mut self, frame: &Frame) -> Vec<(ConnectionId, EvictReason)> {
        let mut failed = Vec::new();
        for (id, outbound) in &self.connections {
            match outbound.try_send(Arc::clone(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => failed.push((id.clone(), EvictReason::QueueFull)),
                Err(TrySendError::Closed(_)) => failed.push((id.clone(), EvictReason::QueueClosed)),
            }
        }
        for (id, _) in &failed {
            let _ = self.connections.remove(id);
        }
        failed
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.connections.len();
        self.connections.clear();
        n
    }
}

enum HubEvent {
    Register {
        id: ConnectionId,
        outbound: mpsc::Sender<Frame>,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        id: ConnectionId,
        ack: oneshot::Sender<bool>,
    },
    Broadcast(Frame),
    Contains {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the hub task. Cheap to clone; every clone talks to the same
/// registry.
#[derive(Clone)]
pub struct Hub {
    events: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
    active: Arc<AtomicUsize>,
    outbound_capacity: usize,
}

impl Hub {
    /// Spawn the hub task.
    pub fn start(config: HubConfig) -> (Self, JoinHandle<()>) {
        let (events, inbox) = mpsc::channel(config.event_queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(run(inbox, cancel.clone(), Arc::clone(&active)));
        info!(
            outbound_capacity = config.outbound_queue_capacity,
            "hub started"
        );

        let hub = Self {
            events,
            cancel,
            active,
            outbound_capacity: config.outbound_queue_capacity.max(1),
        };
        (hub, task)
    }

    /// Stop the hub task. Every registered connection's queue is closed and
    /// later calls become no-ops.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Register a connection and return the receiving half of its outbound
    /// queue. Broadcasts issued after this returns reach the connection.
    pub async fn register(&self, id: ConnectionId) -> Result<mpsc::Receiver<Frame>, HubStopped> {
        let (outbound, rx) = mpsc::channel(self.outbound_capacity);
        let (ack, done) = oneshot::channel();
        self.events
            .send(HubEvent::Register { id, outbound, ack })
            .await
            .map_err(|_| HubStopped)?;
        done.await.map_err(|_| HubStopped)?;
        Ok(rx)
    }

    /// Remove a connection, closing its outbound queue. Returns `false` if
    /// it was not registered (already removed, evicted, or hub stopped).
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let (ack, done) = oneshot::channel();
        let event = HubEvent::Unregister {
            id: id.clone(),
            ack,
        };
        if self.events.send(event).await.is_err() {
            return false;
        }
        done.await.unwrap_or(false)
    }

    /// Queue `frame` for every registered connection. Delivery is
    /// asynchronous; this only waits for room in the hub's inbox.
    pub async fn broadcast(&self, frame: Frame) {
        if self.events.send(HubEvent::Broadcast(frame)).await.is_err() {
            debug!("broadcast after hub stopped, dropped");
        }
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: &ConnectionId) -> bool {
        let (reply, answer) = oneshot::channel();
        let event = HubEvent::Contains {
            id: id.clone(),
            reply,
        };
        if self.events.send(event).await.is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Registered connection count as of the last processed event.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

#[allow(clippy::cast_precision_loss)]
fn publish_count(active: &AtomicUsize, registry: &Registry) {
    let n = registry.len();
    active.store(n, Ordering::Relaxed);
    gauge!(WS_CONNECTIONS_ACTIVE).set(n as f64);
}

async fn run(mut inbox: mpsc::Receiver<HubEvent>, cancel: CancellationToken, active: Arc<AtomicUsize>) {
    let mut registry = Registry::default();

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = inbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            HubEvent::Register { id, outbound, ack } => {
                registry.insert(id.clone(), outbound);
                publish_count(&active, &registry);
                debug!(conn_id = %id, connections = registry.len(), "registered");
                let _ = ack.send(());
            }
            HubEvent::Unregister { id, ack } => {
                let removed = registry.remove(&id);
                if removed {
                    publish_count(&active, &registry);
                    debug!(conn_id = %id, connections = registry.len(), "unregistered");
                }
                let _ = ack.send(removed);
            }
            HubEvent::Broadcast(frame) => {
                counter!(HUB_BROADCASTS_TOTAL).increment(1);
                let evicted = registry.fan_out(&frame);
                for (id, reason) in &evicted {
                    warn!(conn_id = %id, reason = reason.as_str(), "evicting connection");
                    counter!(WS_EVICTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
                }
                if !evicted.is_empty() {
                    publish_count(&active, &registry);
                }
                debug!(bytes = frame.len(), recipients = registry.len(), "broadcast");
            }
            HubEvent::Contains { id, reply } => {
                let _ = reply.send(registry.contains(&id));
            }
        }
    }

    // Dropping the inbox makes every later call observe a stopped hub.
    drop(inbox);
    let closed = registry.clear();
    publish_count(&active, &registry);
    info!(closed, "hub stopped");
}
