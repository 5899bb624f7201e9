//! Single source of truth for the published collection state
//!
//! Readers load an `Arc<CollectionState>` without taking any lock; a commit builds
//! the complete new state first and swaps the pointer, so a reader sees either the
//! old or the new state and never a mix. Commits are serialized by a mutex that is
//! held only for version stamping and the swap.
//!
//! Every commit is also broadcast to subscribers. The broadcast buffer is bounded:
//! a subscriber that falls behind loses the oldest states and resumes from the
//! newest ones, the committer never waits on it.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::CollectionState;

pub struct StateStore {
    current: ArcSwap<CollectionState>,
    commit_lock: Mutex<()>,
    updates: broadcast::Sender<Arc<CollectionState>>,
}

impl StateStore {
    /// Create a store holding the zeroed initial state
    pub fn new(subscriber_buffer: usize) -> Self {
        let (updates, _) = broadcast::channel(subscriber_buffer.max(1));

        Self {
            current: ArcSwap::from_pointee(CollectionState::initial()),
            commit_lock: Mutex::new(()),
            updates,
        }
    }

    /// Latest committed state
    pub fn read(&self) -> Arc<CollectionState> {
        self.current.load_full()
    }

    /// Atomically replace the current state and notify subscribers
    ///
    /// The stored version is always one more than the previous commit's.
    pub fn commit(&self, mut state: CollectionState) -> Arc<CollectionState> {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        state.version = self.current.load().version + 1;
        state.updated_at = Utc::now();

        let state = Arc::new(state);
        self.current.store(state.clone());

        match self.updates.send(state.clone()) {
            Ok(receivers) => trace!("committed version {} to {receivers} subscribers", state.version),
            Err(_) => trace!("committed version {} with no subscribers", state.version),
        }

        state
    }

    pub fn subscribe(&self) -> StateSubscription {
        StateSubscription {
            receiver: self.updates.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Stream of committed states in commit order
pub struct StateSubscription {
    receiver: broadcast::Receiver<Arc<CollectionState>>,
}

impl StateSubscription {
    /// Wait for the next committed state
    ///
    /// Skips over states dropped while this subscriber lagged. Returns `None` once the
    /// store is gone.
    pub async fn recv(&mut self) -> Option<Arc<CollectionState>> {
        loop {
            match self.receiver.recv().await {
                Ok(state) => return Some(state),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("subscriber lagged, skipped {skipped} states");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<Arc<CollectionState>> {
        loop {
            match self.receiver.try_recv() {
                Ok(state) => return Some(state),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("subscriber lagged, skipped {skipped} states");
                }
                Err(_) => return None,
            }
        }
    }
}
