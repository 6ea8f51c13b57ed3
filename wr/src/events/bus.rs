//! Event Bus - page-level pub/sub between widgets and their host page
//!
//! The EventBus uses a tokio broadcast channel. Subscribing never disturbs any
//! other subscription, and emitting never waits on a consumer.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{DashboardEvent, PageEvent};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Shared bus connecting sibling widgets and their host page
pub struct EventBus {
    tx: broadcast::Sender<PageEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// This is fire-and-forget: if there are no subscribers, the event is dropped.
    /// If a subscriber is full, its oldest events are dropped.
    pub fn emit(&self, event: PageEvent) {
        debug!(name = %event.name, origin = ?event.origin, "EventBus::emit");
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter for the rendering surface wrapped by `widget_id`
    ///
    /// Events sent through it are delivered to that widget only.
    pub fn emitter_for(&self, widget_id: impl Into<String>) -> SurfaceEmitter {
        let widget_id = widget_id.into();
        debug!(%widget_id, "EventBus::emitter_for: creating emitter");
        SurfaceEmitter {
            tx: self.tx.clone(),
            widget_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle a rendering surface uses to signal its own widget
///
/// Cheap to clone. Note that a live emitter keeps the bus open.
#[derive(Clone)]
pub struct SurfaceEmitter {
    tx: broadcast::Sender<PageEvent>,
    widget_id: String,
}

impl SurfaceEmitter {
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    /// Emit a typed event scoped to this widget
    pub fn emit(&self, event: &DashboardEvent) {
        debug!(widget_id = %self.widget_id, kind = ?event.kind(), "SurfaceEmitter::emit");
        let _ = self.tx.send(PageEvent::surface(
            self.widget_id.clone(),
            event.kind().name(),
            event.to_payload(),
        ));
    }

    /// The chart's visible x-axis range changed
    pub fn after_set_extremes(&self, min: i64, max: i64) {
        self.emit(&DashboardEvent::AfterSetExtremes { min, max });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus(capacity: usize) -> Arc<EventBus> {
    Arc::new(EventBus::new(capacity))
}
