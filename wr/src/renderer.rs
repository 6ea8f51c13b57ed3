//! WidgetRenderer - one widget instance on a page
//!
//! Pairs one descriptor with one [`FetchCoordinator`] and one [`EventRelay`].
//! All descriptor mutation happens synchronously inside [`WidgetRenderer::handle`];
//! the only awaits are the transport calls of in-flight fetches.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::coordinator::{FetchCoordinator, FetchOutcome, PendingFetch};
use crate::descriptor::QueryDescriptor;
use crate::error::WidgetError;
use crate::events::{DashboardEvent, EventKind, PageEvent};
use crate::hooks::{FetchLifecycleHooks, NoHooks};
use crate::relay::EventRelay;
use crate::state::PresentationState;
use crate::transport::Transport;

pub struct WidgetRenderer {
    id: String,
    descriptor: QueryDescriptor,
    coordinator: FetchCoordinator,
    relay: EventRelay,
}

impl WidgetRenderer {
    pub fn new(id: impl Into<String>, descriptor: QueryDescriptor, transport: Arc<dyn Transport>) -> Self {
        Self::with_hooks(id, descriptor, transport, Arc::new(NoHooks))
    }

    pub fn with_hooks(
        id: impl Into<String>,
        descriptor: QueryDescriptor,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn FetchLifecycleHooks>,
    ) -> Self {
        let id = id.into();
        debug!(%id, source_id = %descriptor.source_id(), "WidgetRenderer::new: called");
        Self {
            coordinator: FetchCoordinator::with_hooks(id.clone(), transport, hooks),
            id,
            descriptor,
            relay: EventRelay::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn state(&self) -> PresentationState {
        self.coordinator.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PresentationState> {
        self.coordinator.subscribe()
    }

    /// Register an event handler on this widget's relay
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(QueryDescriptor, &DashboardEvent) -> Result<Option<QueryDescriptor>, WidgetError>
            + Send
            + Sync
            + 'static,
    {
        self.relay.subscribe(kind, handler);
    }

    /// Initial fetch when the widget is placed on the page
    pub fn mount(&self) -> PendingFetch {
        debug!(id = %self.id, "WidgetRenderer::mount: called");
        self.coordinator.fetch(self.descriptor.clone())
    }

    /// Re-fetch with the current descriptor
    pub fn fetch(&self) -> PendingFetch {
        self.coordinator.fetch(self.descriptor.clone())
    }

    /// Route one bus event; returns the fetches it triggered
    ///
    /// Surface events of other widgets and unknown event names are ignored.
    pub fn handle(&mut self, event: &PageEvent) -> Vec<PendingFetch> {
        if !event.is_for(&self.id) {
            return Vec::new();
        }

        let parsed = match DashboardEvent::parse(&event.name, &event.payload) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                debug!(id = %self.id, name = %event.name, "WidgetRenderer::handle: ignoring unknown event");
                return Vec::new();
            }
            Err(e) => {
                warn!(id = %self.id, name = %event.name, error = %e, "WidgetRenderer::handle: malformed payload");
                return Vec::new();
            }
        };

        self.relay.dispatch(&parsed, &mut self.descriptor, &self.coordinator)
    }

    /// Mount, then follow the bus until it closes
    ///
    /// Runs on a single task: events are dispatched one at a time and in-flight
    /// fetches are driven alongside. When the bus closes, in-flight fetches are
    /// drained and the final state is returned.
    pub async fn run(mut self, mut events: broadcast::Receiver<PageEvent>) -> PresentationState {
        info!(id = %self.id, "WidgetRenderer::run: started");
        let mut inflight = FuturesUnordered::new();
        inflight.push(self.mount());

        loop {
            tokio::select! {
                Some(outcome) = inflight.next(), if !inflight.is_empty() => {
                    log_outcome(&self.id, outcome);
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        for fetch in self.handle(&event) {
                            inflight.push(fetch);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(id = %self.id, skipped, "WidgetRenderer::run: lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        while let Some(outcome) = inflight.next().await {
            log_outcome(&self.id, outcome);
        }

        info!(id = %self.id, "WidgetRenderer::run: bus closed");
        self.state()
    }
}

impl fmt::Debug for WidgetRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetRenderer")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn log_outcome(id: &str, outcome: Result<FetchOutcome, WidgetError>) {
    match outcome {
        Ok(FetchOutcome::Applied) => debug!(%id, "fetch applied"),
        Ok(FetchOutcome::Superseded) => debug!(%id, "fetch superseded"),
        // Already logged and surfaced by the coordinator
        Err(e) => debug!(%id, error = %e, "fetch failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::mock::FixedTransport;
    use crate::descriptor::{RelativeTime, TimeUnit};
    use serde_json::json;

    fn renderer(transport: Arc<FixedTransport>) -> WidgetRenderer {
        let mut r = WidgetRenderer::new(
            "w1",
            QueryDescriptor::relative("cpu", RelativeTime::new(1, TimeUnit::Hours)),
            transport,
        );
        r.on(EventKind::Refresh, |d, _| Ok(Some(d)));
        r
    }

    #[tokio::test]
    async fn test_mount_fetches_once() {
        let transport = Arc::new(FixedTransport::ok(json!({"v": 1})));
        let r = renderer(transport.clone());
        r.mount().await.unwrap();
        assert_eq!(r.state().result, Some(json!({"v": 1})));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_handle_ignores_other_widgets_surface_events() {
        let transport = Arc::new(FixedTransport::ok(json!(1)));
        let mut r = renderer(transport);
        let fetches = r.handle(&PageEvent::surface("w2", "refresh", json!(null)));
        assert!(fetches.is_empty());

        let fetches = r.handle(&PageEvent::surface("w1", "refresh", json!(null)));
        assert_eq!(fetches.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_ignores_unknown_and_malformed() {
        let transport = Arc::new(FixedTransport::ok(json!(1)));
        let mut r = renderer(transport);
        assert!(r.handle(&PageEvent::page("px-unknown", json!({}))).is_empty());
        assert!(r.handle(&PageEvent::page("after-set-extremes", json!("nope"))).is_empty());
        assert!(!r.state().error);
    }

    #[tokio::test]
    async fn test_run_drains_and_returns_final_state() {
        let transport = Arc::new(FixedTransport::ok(json!("data")));
        let r = renderer(transport.clone());
        let (tx, rx) = broadcast::channel(8);
        tx.send(PageEvent::page("refresh", json!(null))).unwrap();
        drop(tx);

        let state = r.run(rx).await;
        assert_eq!(state.result, Some(json!("data")));
        assert!(!state.loading);
        // mount + refresh
        assert_eq!(transport.call_count(), 2);
    }
}
