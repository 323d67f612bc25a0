//! Per-connection pump pair.
//!
//! Each peer gets two tasks. The read pump owns the inbound half: it decodes
//! frames, hands valid ones to the hub and the orchestrator, and enforces the
//! pong deadline. The write pump owns the outbound half: it drains the
//! connection's queue onto the socket and sends keepalive pings. Neither
//! pump touches the other's half; they coordinate through a shared
//! [`CancellationToken`] so that whichever exits first takes the other down.
//!
//! Only the read pump unregisters from the hub, so each connection runs
//! exactly one exit path.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use bytes::Bytes;
use chatrelay_core::{ConnectionId, decode};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::KeepaliveConfig;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_MALFORMED_FRAMES_TOTAL};
use crate::orchestrator::Orchestrator;
use crate::websocket::hub::{Frame, Hub};

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// No pong arrived within the read deadline.
    PongTimeout,
    /// Peer sent a frame above the size limit.
    Oversized,
    /// Transport read error.
    ReadFailed(String),
    /// Hub closed the outbound queue (unregistered or evicted).
    QueueClosed,
    /// Transport write error.
    WriteFailed(String),
    /// A write did not complete within the write deadline.
    WriteTimeout,
    /// The sibling pump stopped first.
    Cancelled,
}

impl ExitReason {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::PongTimeout => "pong_timeout",
            Self::Oversized => "oversized",
            Self::ReadFailed(_) => "read_failed",
            Self::QueueClosed => "queue_closed",
            Self::WriteFailed(_) => "write_failed",
            Self::WriteTimeout => "write_timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(e) | Self::WriteFailed(e) => write!(f, "{}: {e}", self.label()),
            other => f.write_str(other.label()),
        }
    }
}

/// Everything the read pump needs besides the stream itself.
#[derive(Clone)]
pub struct Inbound {
    /// This connection.
    pub id: ConnectionId,
    /// Broadcast target and registry.
    pub hub: Hub,
    /// Reply generator.
    pub orchestrator: Arc<Orchestrator>,
    /// Deadlines and size limit.
    pub keepalive: KeepaliveConfig,
    /// Shared with the write pump.
    pub closed: CancellationToken,
}

/// Shared dependencies for every accepted connection.
#[derive(Clone)]
pub struct ConnectionDeps {
    /// The hub.
    pub hub: Hub,
    /// The AI responder.
    pub orchestrator: Arc<Orchestrator>,
    /// Keepalive settings.
    pub keepalive: KeepaliveConfig,
}

/// Run one accepted WebSocket until either side goes away.
pub async fn serve(socket: WebSocket, peer: SocketAddr, deps: ConnectionDeps) {
    let id = ConnectionId::new();
    let span = info_span!("ws_connection", conn_id = %id, %peer);
    run(socket, id, deps).instrument(span).await;
}

async fn run(socket: WebSocket, id: ConnectionId, deps: ConnectionDeps) {
    let outbound = match deps.hub.register(id.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "rejecting connection");
            return;
        }
    };
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(connections = deps.hub.connection_count(), "client connected");

    let (sink, stream) = socket.split();
    let closed = CancellationToken::new();

    let writer = tokio::spawn(
        write_pump(sink, outbound, deps.keepalive.clone(), closed.clone()).in_current_span(),
    );

    let inbound = Inbound {
        id,
        hub: deps.hub,
        orchestrator: deps.orchestrator,
        keepalive: deps.keepalive,
        closed,
    };
    let read_exit = read_pump(stream, inbound).await;
    let write_exit = writer.await.unwrap_or(ExitReason::Cancelled);

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => read_exit.label()).increment(1);
    info!(read = %read_exit, write = %write_exit, "client disconnected");
}

/// Read frames until the peer goes away, the deadline passes, or the
/// write pump stops.
///
/// The deadline starts at `pong_wait` and is renewed only by pongs. On exit
/// the connection is unregistered and the write pump is told to stop.
pub async fn read_pump<S, E>(mut stream: S, ctx: Inbound) -> ExitReason
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    let mut deadline = Instant::now() + ctx.keepalive.pong_wait;

    let reason = loop {
        let next = tokio::select! {
            biased;
            () = ctx.closed.cancelled() => break ExitReason::Cancelled,
            next = timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => break ExitReason::PongTimeout,
            Ok(None) => break ExitReason::PeerClosed,
            Ok(Some(Err(e))) => break ExitReason::ReadFailed(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => {
                if text.as_str().len() > ctx.keepalive.max_message_size {
                    break ExitReason::Oversized;
                }
                handle_frame(&ctx, text.as_str().to_owned()).await;
            }
            WsMessage::Binary(data) => {
                if data.len() > ctx.keepalive.max_message_size {
                    break ExitReason::Oversized;
                }
                match String::from_utf8(data.to_vec()) {
                    Ok(text) => handle_frame(&ctx, text).await,
                    Err(_) => skip_frame(&ctx.id, "malformed", "binary frame is not UTF-8"),
                }
            }
            WsMessage::Pong(_) => {
                deadline = Instant::now() + ctx.keepalive.pong_wait;
            }
            WsMessage::Ping(_) => {}
            WsMessage::Close(_) => break ExitReason::PeerClosed,
        }
    };

    let _ = ctx.hub.unregister(&ctx.id).await;
    ctx.closed.cancel();
    debug!(reason = %reason, "read pump stopped");
    reason
}

async fn handle_frame(ctx: &Inbound, raw: String) {
    match decode(raw.as_bytes()) {
        Ok(message) => {
            ctx.hub.broadcast(Arc::new(raw)).await;
            let _ = ctx.orchestrator.dispatch(message.into_content());
        }
        Err(e) => skip_frame(&ctx.id, e.kind(), &e.to_string()),
    }
}

fn skip_frame(id: &ConnectionId, kind: &'static str, detail: &str) {
    warn!(conn_id = %id, kind, error = detail, "skipping undecodable frame");
    counter!(WS_MALFORMED_FRAMES_TOTAL, "kind" => kind).increment(1);
}

/// Drain `outbound` onto `sink` and ping every `ping_period`.
///
/// Every write is bounded by `write_wait`. When the hub closes the queue a
/// close frame is sent before exiting.
pub async fn write_pump<K>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Frame>,
    keepalive: KeepaliveConfig,
    closed: CancellationToken,
) -> ExitReason
where
    K: Sink<WsMessage> + Unpin,
    K::Error: fmt::Display,
{
    let mut ticker = interval_at(Instant::now() + keepalive.ping_period, keepalive.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;
            () = closed.cancelled() => break ExitReason::Cancelled,
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = send_within(&mut sink, WsMessage::Close(None), &keepalive).await;
                    break ExitReason::QueueClosed;
                };
                if let Err(reason) =
                    send_within(&mut sink, WsMessage::Text(frame.as_str().into()), &keepalive).await
                {
                    break reason;
                }
            }
            _ = ticker.tick() => {
                if let Err(reason) =
                    send_within(&mut sink, WsMessage::Ping(Bytes::new()), &keepalive).await
                {
                    break reason;
                }
            }
        }
    };

    closed.cancel();
    let _ = timeout(keepalive.write_wait, sink.close()).await;
    debug!(reason = %reason, "write pump stopped");
    reason
}

async fn send_within<K>(sink: &mut K, message: WsMessage, keepalive: &KeepaliveConfig) -> Result<(), ExitReason>
where
    K: Sink<WsMessage> + Unpin,
    K::Error: fmt::Display,
{
    match timeout(keepalive.write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ExitReason::WriteFailed(e.to_string())),
        Err(_) => Err(ExitReason::WriteTimeout),
    }
}
