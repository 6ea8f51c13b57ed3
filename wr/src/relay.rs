//! EventRelay - turns events into descriptor mutations and fetches
//!
//! Handlers are registered per [`EventKind`] and run in registration order.
//! A handler gets a copy of the widget's current descriptor. If it returns a
//! descriptor, that descriptor replaces the widget's and a fetch is issued
//! right away. Each handler decides independently, so two handlers for the
//! same event can trigger two fetches. The relay does not deduplicate them.

use tracing::{debug, warn};

use crate::coordinator::{FetchCoordinator, PendingFetch};
use crate::descriptor::QueryDescriptor;
use crate::error::{HookPoint, WidgetError};
use crate::events::{DashboardEvent, EventKind};
use crate::hooks::guarded;

/// Event handler: `Ok(Some(d))` replaces the descriptor and fetches, `Ok(None)` does nothing
pub type EventHandler =
    Box<dyn Fn(QueryDescriptor, &DashboardEvent) -> Result<Option<QueryDescriptor>, WidgetError> + Send + Sync>;

struct Subscription {
    kind: EventKind,
    handler: EventHandler,
}

/// Ordered event handlers of one widget
#[derive(Default)]
pub struct EventRelay {
    subscriptions: Vec<Subscription>,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; existing handlers are kept
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(QueryDescriptor, &DashboardEvent) -> Result<Option<QueryDescriptor>, WidgetError>
            + Send
            + Sync
            + 'static,
    {
        debug!(event = kind.name(), "EventRelay::subscribe: called");
        self.subscriptions.push(Subscription {
            kind,
            handler: Box::new(handler),
        });
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.subscriptions.iter().filter(|s| s.kind == kind).count()
    }

    /// Run every handler for `event` against `descriptor`
    ///
    /// Returns the fetches the handlers triggered, in order. A failing handler
    /// is reported through the coordinator and the remaining handlers still run.
    pub fn dispatch(
        &self,
        event: &DashboardEvent,
        descriptor: &mut QueryDescriptor,
        coordinator: &FetchCoordinator,
    ) -> Vec<PendingFetch> {
        let kind = event.kind();
        debug!(event = kind.name(), widget_id = %coordinator.widget_id(), "EventRelay::dispatch: called");

        let mut fetches = Vec::new();
        for subscription in self.subscriptions.iter().filter(|s| s.kind == kind) {
            let current = descriptor.clone();
            match guarded(HookPoint::EventHandler, || (subscription.handler)(current, event)) {
                Ok(Some(next)) => {
                    *descriptor = next;
                    fetches.push(coordinator.fetch(descriptor.clone()));
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(event = kind.name(), %error, "EventRelay::dispatch: handler failed");
                    coordinator.report_failure(error);
                }
            }
        }

        debug!(fetches = fetches.len(), "EventRelay::dispatch: done");
        fetches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::mock::FixedTransport;
    use crate::descriptor::{RelativeTime, TimeUnit};
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor::relative("cpu", RelativeTime::new(1, TimeUnit::Hours))
    }

    #[tokio::test]
    async fn test_handler_returning_descriptor_triggers_fetch() {
        let transport = Arc::new(FixedTransport::ok(json!("ok")));
        let coord = FetchCoordinator::new("w1", transport.clone());
        let mut relay = EventRelay::new();
        relay.subscribe(EventKind::AfterSetExtremes, |mut d, event| {
            if let DashboardEvent::AfterSetExtremes { min, max } = event {
                d.set_absolute_window(*min, *max);
            }
            Ok(Some(d))
        });

        let mut d = descriptor();
        let fetches = relay.dispatch(&DashboardEvent::AfterSetExtremes { min: 5, max: 9 }, &mut d, &coord);
        assert_eq!(fetches.len(), 1);
        assert!(d.window().is_absolute());

        for f in fetches {
            f.await.unwrap();
        }
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_handler_returning_none_does_not_fetch() {
        let transport = Arc::new(FixedTransport::ok(json!("ok")));
        let coord = FetchCoordinator::new("w1", transport.clone());
        let mut relay = EventRelay::new();
        relay.subscribe(EventKind::Refresh, |mut d, _| {
            // Mutating the copy without returning it has no effect
            d.set_cache_hint(5);
            Ok(None)
        });

        let mut d = descriptor();
        let fetches = relay.dispatch(&DashboardEvent::Refresh, &mut d, &coord);
        assert!(fetches.is_empty());
        assert_eq!(d.cache_hint(), None);
        assert_eq!(coord.state().request_id, 0);
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let coord = FetchCoordinator::new("w1", Arc::new(FixedTransport::ok(json!(1))));
        let mut relay = EventRelay::new();
        relay.subscribe(EventKind::Refresh, |mut d, _| {
            d.set_option("order", json!(["first"]))?;
            Ok(Some(d))
        });
        relay.subscribe(EventKind::Refresh, |mut d, _| {
            let mut order = d.options().get("order").cloned().unwrap_or(json!([]));
            order.as_array_mut().unwrap().push(json!("second"));
            d.set_option("order", order)?;
            Ok(Some(d))
        });

        let mut d = descriptor();
        let fetches = relay.dispatch(&DashboardEvent::Refresh, &mut d, &coord);

        // Overlapping handlers each fetch; only the last one can apply
        assert_eq!(fetches.len(), 2);
        assert_eq!(d.options().get("order"), Some(&json!(["first", "second"])));
        let outcomes: Vec<_> = futures::future::join_all(fetches).await;
        assert_eq!(
            outcomes.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            vec![
                crate::coordinator::FetchOutcome::Superseded,
                crate::coordinator::FetchOutcome::Applied
            ]
        );
    }

    #[tokio::test]
    async fn test_other_kinds_are_not_dispatched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let coord = FetchCoordinator::new("w1", Arc::new(FixedTransport::ok(json!(1))));
        let mut relay = EventRelay::new();
        relay.subscribe(EventKind::UpdateTimeseries, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });

        let mut d = descriptor();
        let fetches = relay.dispatch(&DashboardEvent::Refresh, &mut d, &coord);
        assert!(fetches.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(relay.handler_count(EventKind::UpdateTimeseries), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_marks_error_and_keeps_descriptor() {
        let transport = Arc::new(FixedTransport::ok(json!(1)));
        let coord = FetchCoordinator::new("w1", transport.clone());
        let mut relay = EventRelay::new();
        relay.subscribe(EventKind::AfterSetExtremes, |mut d, _| {
            d.set_sampling(7, TimeUnit::Minutes, "1")?;
            Ok(Some(d))
        });

        let mut d = descriptor();
        let before = d.clone();
        let fetches = relay.dispatch(&DashboardEvent::AfterSetExtremes { min: 1, max: 2 }, &mut d, &coord);

        assert!(fetches.is_empty());
        assert_eq!(d, before);
        let state = coord.state();
        assert!(state.error);
        assert!(!state.loading);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let hooks = crate::hooks::HookSet::new().on_error(move |e| seen.lock().unwrap().push(e.kind()));
        let coord = FetchCoordinator::with_hooks("w1", Arc::new(FixedTransport::ok(json!(1))), Arc::new(hooks));
        let mut relay = EventRelay::new();
        relay.subscribe(EventKind::Refresh, |_, _| panic!("handler bug"));
        relay.subscribe(EventKind::Refresh, |d, _| Ok(Some(d)));

        let mut d = descriptor();
        let fetches = relay.dispatch(&DashboardEvent::Refresh, &mut d, &coord);

        // The second handler still ran
        assert_eq!(fetches.len(), 1);
        assert_eq!(*errors.lock().unwrap(), vec![ErrorKind::Hook]);
    }
}
