//! Shutdown coordination: one cancellation token plus the named background
//! tasks that must finish before the process exits.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default grace period before stragglers are aborted.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the shutdown signal and the server's long-lived tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Track a task to be awaited on shutdown.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        debug!(task = name, "tracking background task");
        self.tasks.lock().push((name, handle));
    }

    /// Number of tracked tasks not yet drained.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Signal shutdown, wait up to `timeout` for every tracked task, then
    /// abort whatever is left. Returns the names of aborted tasks.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> Vec<&'static str> {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let mut pending = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = pending.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = Vec::new();
        for (name, handle) in &mut pending {
            match tokio::time::timeout_at(deadline, &mut *handle).await {
                Ok(Ok(())) => debug!(task = *name, "task finished"),
                Ok(Err(e)) => warn!(task = *name, error = %e, "task ended abnormally"),
                Err(_) => {
                    handle.abort();
                    aborted.push(*name);
                }
            }
        }

        if !aborted.is_empty() {
            warn!(?aborted, "shutdown timed out after {timeout:?}, aborted remaining tasks");
        }
        aborted
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
