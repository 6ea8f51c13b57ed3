//! PresentationState - what the rendering surface binds to
//!
//! The state lives in a `tokio::sync::watch` channel. Rendering surfaces take a
//! [`StateStore::snapshot`] or hold a receiver from [`StateStore::subscribe`] and
//! re-render on change. Only the fetch coordinator writes it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

/// Observable fetch state of one widget instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresentationState {
    /// A fetch has started and not yet settled
    pub loading: bool,

    /// The most recent fetch attempt failed
    pub error: bool,

    /// Last successfully transformed response
    pub result: Option<Value>,

    /// Sequence number of the most recently issued fetch
    pub request_id: u64,
}

/// Write side of a widget's presentation state
///
/// The sequence check and the write happen under the channel's write lock, so a
/// settle can never interleave with a newer fetch being issued.
#[derive(Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<PresentationState>>,
}

impl StateStore {
    pub fn new() -> Self {
        debug!("StateStore::new: called");
        let (tx, _) = watch::channel(PresentationState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    pub fn snapshot(&self) -> PresentationState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        debug!("StateStore::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Whether `request_id` is still the latest issued fetch
    pub(crate) fn is_current(&self, request_id: u64) -> bool {
        self.tx.borrow().request_id == request_id
    }

    /// Issue a new sequence number and enter the loading state
    pub(crate) fn begin(&self) -> u64 {
        let mut issued = 0;
        self.tx.send_modify(|state| {
            state.request_id += 1;
            state.loading = true;
            state.error = false;
            issued = state.request_id;
        });
        debug!(request_id = issued, "StateStore::begin: loading");
        issued
    }

    /// Apply a successful result if `request_id` is still current
    pub(crate) fn settle_ok(&self, request_id: u64, result: Value) -> bool {
        let applied = self.tx.send_if_modified(|state| {
            if state.request_id != request_id {
                return false;
            }
            state.loading = false;
            state.error = false;
            state.result = Some(result);
            true
        });
        debug!(request_id, applied, "StateStore::settle_ok: called");
        applied
    }

    /// Mark `request_id` failed if it is still current; prior result is kept
    pub(crate) fn settle_err(&self, request_id: u64) -> bool {
        let applied = self.tx.send_if_modified(|state| {
            if state.request_id != request_id {
                return false;
            }
            state.loading = false;
            state.error = true;
            true
        });
        debug!(request_id, applied, "StateStore::settle_err: called");
        applied
    }

    pub(crate) fn clear_result(&self) {
        debug!("StateStore::clear_result: called");
        self.tx.send_if_modified(|state| state.result.take().is_some());
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
