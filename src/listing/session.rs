//! Fetch sessions: one per filter/sort/page snapshot of a view.
//!
//! Starting a session cancels the one before it. Async continuations check
//! their own session before committing anything, so a slow response for old
//! filters can never overwrite a faster response for new ones. Cancellation
//! is advisory: in-flight requests run to completion and their results are
//! dropped.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FetchSession {
    token: CancellationToken,
    generation: u64,
}

impl FetchSession {
    /// A session nothing will ever cancel, for background work that has no
    /// view to protect.
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once the session is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Run `apply` only if the session is still current.
    pub fn commit<T>(&self, apply: impl FnOnce() -> T) -> Option<T> {
        if self.is_cancelled() {
            debug!(generation = self.generation, "discarding result of superseded session");
            None
        } else {
            Some(apply())
        }
    }
}

/// Hands out sessions for one consuming view; at most one is live.
#[derive(Debug, Default)]
pub struct SessionTracker {
    current: Mutex<Option<FetchSession>>,
    generations: AtomicU64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current session (if any) and start a new one.
    pub fn begin(&self) -> FetchSession {
        let session = FetchSession {
            token: CancellationToken::new(),
            generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
        };
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(session.clone()) {
            previous.cancel();
            debug!(
                superseded = previous.generation,
                current = session.generation,
                "fetch session superseded"
            );
        }
        session
    }

    /// Cancel the current session without starting another.
    pub fn cancel_current(&self) {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = current.as_ref() {
            session.cancel();
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, FetchSession::generation)
    }
}
