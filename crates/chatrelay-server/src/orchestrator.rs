//! AI responder: turns each inbound chat message into exactly one reply
//! broadcast.
//!
//! A successful completion becomes an `"ai"` message; any failure becomes the
//! system apology. Calls are detached from the connection that triggered
//! them and capped by a semaphore.

use std::sync::Arc;

use chatrelay_core::{Message, encode};
use chatrelay_llm::CompletionProvider;
use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::{COMPLETION_FAILURES_TOTAL, COMPLETION_REQUESTS_TOTAL};
use crate::websocket::hub::Hub;

/// Generates and broadcasts AI replies.
pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    hub: Hub,
    permits: Arc<Semaphore>,
}

impl Orchestrator {
    /// Create an orchestrator allowing at most `max_inflight` concurrent
    /// completion calls.
    pub fn new(provider: Arc<dyn CompletionProvider>, hub: Hub, max_inflight: usize) -> Self {
        Self {
            provider,
            hub,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Produce the reply for `user_text`. Never fails.
    #[instrument(skip_all, fields(provider = self.provider.name(), model = self.provider.model()))]
    pub async fn respond(&self, user_text: &str) -> Message {
        counter!(COMPLETION_REQUESTS_TOTAL).increment(1);
        match self.provider.complete(user_text).await {
            Ok(reply) => match Message::ai(reply) {
                Ok(message) => {
                    debug!(bytes = message.content().len(), "completion succeeded");
                    message
                }
                Err(e) => {
                    warn!(error = %e, "completion produced an unusable reply");
                    counter!(COMPLETION_FAILURES_TOTAL, "category" => "empty").increment(1);
                    Message::apology()
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    category = e.category(),
                    retryable = e.is_retryable(),
                    "completion failed"
                );
                counter!(COMPLETION_FAILURES_TOTAL, "category" => e.category()).increment(1);
                Message::apology()
            }
        }
    }

    /// Generate a reply for `user_text` in the background and broadcast it.
    ///
    /// Returns immediately. The spawned task waits for a free slot before
    /// calling the provider.
    pub fn dispatch(self: &Arc<Self>, user_text: String) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&this.permits).acquire_owned().await else {
                return;
            };
            let reply = this.respond(&user_text).await;
            match encode(&reply) {
                Ok(frame) => this.hub.broadcast(Arc::new(frame)).await,
                Err(e) => error!(error = %e, "failed to encode reply"),
            }
        })
    }

    /// Completion slots currently free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chatrelay_core::{APOLOGY, MessageType, SENDER_AI, SENDER_SYSTEM, decode};
    use chatrelay_llm::mock::{MockReply, ScriptedCompletion};

    use super::*;
    use crate::config::HubConfig;
    use chatrelay_core::ConnectionId;

    fn orchestrator(mock: Arc<ScriptedCompletion>, cap: usize) -> (Arc<Orchestrator>, Hub) {
        let (hub, _task) = Hub::start(HubConfig::default());
        let orch = Arc::new(Orchestrator::new(mock, hub.clone(), cap));
        (orch, hub)
    }

    #[tokio::test]
    async fn success_becomes_ai_message() {
        let mock = Arc::new(ScriptedCompletion::new(vec![MockReply::text("Hello there")]));
        let (orch, _hub) = orchestrator(mock.clone(), 4);

        let reply = orch.respond("hi").await;
        assert_eq!(reply.kind(), MessageType::Text);
        assert_eq!(reply.sender(), SENDER_AI);
        assert_eq!(reply.content(), "Hello there");
        assert_eq!(mock.inputs(), vec!["hi"]);
    }

    #[tokio::test]
    async fn failure_becomes_apology() {
        let mock = Arc::new(ScriptedCompletion::new(vec![MockReply::Status(500)]));
        let (orch, _hub) = orchestrator(mock, 4);

        let reply = orch.respond("hi").await;
        assert_eq!(reply.kind(), MessageType::Error);
        assert_eq!(reply.sender(), SENDER_SYSTEM);
        assert_eq!(reply.content(), APOLOGY);
    }

    #[tokio::test]
    async fn empty_reply_becomes_apology() {
        let mock = Arc::new(ScriptedCompletion::new(vec![MockReply::Empty, MockReply::text("")]));
        let (orch, _hub) = orchestrator(mock, 4);

        assert_eq!(orch.respond("a").await.content(), APOLOGY);
        assert_eq!(orch.respond("b").await.content(), APOLOGY);
    }

    #[tokio::test]
    async fn dispatch_broadcasts_exactly_one_reply() {
        let mock = Arc::new(ScriptedCompletion::new(vec![MockReply::text("pong")]));
        let (orch, hub) = orchestrator(mock, 4);
        let mut rx = hub.register(ConnectionId::from_raw("peer")).await.unwrap();

        orch.dispatch("ping".into()).await.unwrap();

        let frame = rx.recv().await.unwrap();
        let message = decode(frame.as_bytes()).unwrap();
        assert_eq!(message.sender(), SENDER_AI);
        assert_eq!(message.content(), "pong");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_failure_broadcasts_apology() {
        let mock = Arc::new(ScriptedCompletion::new(vec![MockReply::Status(429)]));
        let (orch, hub) = orchestrator(mock, 4);
        let mut rx = hub.register(ConnectionId::from_raw("peer")).await.unwrap();

        orch.dispatch("ping".into()).await.unwrap();

        let message = decode(rx.recv().await.unwrap().as_bytes()).unwrap();
        assert_eq!(message.kind(), MessageType::Error);
        assert_eq!(message.content(), APOLOGY);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_respects_inflight_cap() {
        let mock = Arc::new(ScriptedCompletion::always(MockReply::delayed(
            Duration::from_secs(1),
            MockReply::text("ok"),
        )));
        let (orch, _hub) = orchestrator(mock.clone(), 2);

        let handles: Vec<_> = (0..6).map(|i| orch.dispatch(format!("m{i}"))).collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(mock.call_count(), 6);
        assert!(mock.peak_concurrency() <= 2);
        assert_eq!(orch.available_slots(), 2);
    }

    #[test]
    fn zero_cap_is_clamped() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let mock = Arc::new(ScriptedCompletion::new(vec![]));
            let (orch, _hub) = orchestrator(mock, 0);
            assert_eq!(orch.available_slots(), 1);
        });
    }
}
