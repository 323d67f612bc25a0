//! Scripted providers for deterministic tests without network calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::provider::{CompletionError, CompletionProvider, TranscriptionError, TranscriptionProvider};

/// One pre-programmed outcome.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Succeed with this text.
    Text(String),
    /// Fail as if the service returned this status.
    Status(u16),
    /// Fail with an empty reply.
    Empty,
    /// Wait, then resolve the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    /// Convenience: successful text.
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_string())
    }

    /// Convenience: wrap any reply with a delay.
    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }

    /// Sleep through any delays and return the terminal reply.
    async fn settle(self) -> MockReply {
        let mut current = self;
        loop {
            match current {
                MockReply::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
                other => return other,
            }
        }
    }
}

/// Tracks concurrent calls so tests can assert on a dispatch cap.
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        let _ = self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Completion provider that replays queued replies in order.
///
/// Once the queue is drained the fallback reply is used, if set; otherwise
/// calls fail with a `500` API error.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Option<MockReply>,
    inputs: Mutex<Vec<String>>,
    concurrency: Concurrency,
}

impl ScriptedCompletion {
    /// Replay `replies`, then fail.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            inputs: Mutex::new(Vec::new()),
            concurrency: Concurrency::default(),
        }
    }

    /// Answer every call with `reply`.
    pub fn always(reply: MockReply) -> Self {
        Self::new(Vec::new()).with_fallback(reply)
    }

    /// Reply used after the queue is drained.
    #[must_use]
    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Every `user_text` seen so far, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Highest number of calls that were in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.concurrency.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Option<MockReply> {
        self.replies.lock().pop_front().or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, user_text: &str) -> Result<String, CompletionError> {
        self.inputs.lock().push(user_text.to_string());
        let Some(reply) = self.next_reply() else {
            return Err(CompletionError::Api {
                status: 500,
                body: "no scripted response".into(),
            });
        };

        self.concurrency.enter();
        let settled = reply.settle().await;
        self.concurrency.exit();

        match settled {
            MockReply::Text(text) => Ok(text),
            MockReply::Status(status) => Err(CompletionError::Api {
                status,
                body: format!("scripted failure {status}"),
            }),
            MockReply::Empty | MockReply::Delay(..) => Err(CompletionError::EmptyResponse),
        }
    }
}

/// Transcription provider that replays queued replies in order.
pub struct ScriptedTranscription {
    replies: Mutex<VecDeque<MockReply>>,
    uploads: Mutex<Vec<(String, usize)>>,
}

impl ScriptedTranscription {
    /// Replay `replies`, then fail.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// `(filename, byte length)` of every upload seen so far.
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl TranscriptionProvider for ScriptedTranscription {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, TranscriptionError> {
        self.uploads.lock().push((filename.to_string(), audio.len()));
        let next = self.replies.lock().pop_front();
        let Some(reply) = next else {
            return Err(TranscriptionError::Api {
                status: 500,
                body: "no scripted response".into(),
            });
        };

        match reply.settle().await {
            MockReply::Text(text) => Ok(text),
            MockReply::Status(status) => Err(TranscriptionError::Api {
                status,
                body: format!("scripted failure {status}"),
            }),
            MockReply::Empty | MockReply::Delay(..) => Err(TranscriptionError::Decode("empty".into())),
        }
    }
}
