//! Single-flight coordination of token refreshes.
//!
//! The first request to need a refresh becomes the leader and performs it. Requests that need a
//! refresh while one is in flight wait in a FIFO queue and are all settled with the leader's
//! outcome. The state goes back to idle when the leader settles or is dropped, whichever comes
//! first, so a cancelled refresh never leaves the client stuck.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

pub use extract::{extract_credential, Strategy, STRATEGIES};

use crate::error::RefreshError;

mod extract;

/// The new access token, or why the refresh failed.
pub type Outcome = Result<String, RefreshError>;

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<oneshot::Sender<Outcome>>,
}

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

pub enum Role<'a> {
    /// Perform the refresh, then settle the flight.
    Leader(Flight<'a>),
    /// Wait for the leader's outcome.
    Follower(Waiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a refresh, or queue behind the one already in flight.
    pub fn join(&self) -> Role<'_> {
        let mut state = self.lock();
        if state.refreshing {
            state.queue.retain(|tx| !tx.is_closed());
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            debug!(queued = state.queue.len(), "Waiting for in-flight token refresh");
            Role::Follower(Waiter(rx))
        } else {
            state.refreshing = true;
            Role::Leader(Flight {
                coordinator: self,
                settled: false,
            })
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of queued requests whose callers are still waiting.
    pub fn pending(&self) -> usize {
        self.lock().queue.iter().filter(|tx| !tx.is_closed()).count()
    }

    fn finish(&self, outcome: Outcome) -> usize {
        let queue = {
            let mut state = self.lock();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };
        queue
            .into_iter()
            .filter_map(|tx| tx.send(outcome.clone()).ok())
            .count()
    }
}

/// An in-flight refresh owned by the leader.
pub struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Flight<'_> {
    /// Return to idle and release every queued request, in arrival order, with `outcome`.
    /// Returns how many waiting requests received it.
    pub fn settle(mut self, outcome: Outcome) -> usize {
        self.settled = true;
        self.coordinator.finish(outcome)
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.coordinator.finish(Err(RefreshError::Aborted));
            debug!(released, "Token refresh dropped before it settled");
        }
    }
}

pub struct Waiter(oneshot::Receiver<Outcome>);

impl Waiter {
    pub async fn wait(self) -> Outcome {
        self.0.await.unwrap_or(Err(RefreshError::Aborted))
    }
}
