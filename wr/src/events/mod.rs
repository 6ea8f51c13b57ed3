//! Page-level event bus
//!
//! Widgets talk to each other and to their host page through one shared bus.
//! A chart surface raises an event scoped to its own widget; the page (or a
//! sibling widget, relayed by the page) broadcasts events to every widget.
//!
//! ```text
//!   chart surface ──surface(w1)──┐
//!                                ▼
//!   host page ────page─────► EVENT BUS (tokio broadcast) ───► every WidgetRenderer
//!                                                              (filters by origin,
//!                                                               parses by name)
//! ```
//!
//! The bus is fire-and-forget: no acknowledgment, no backpressure. A receiver
//! that falls behind skips the oldest events.
//!
//! # Usage
//!
//! ```rust,ignore
//! use widgetrenderer::events::{EventBus, PageEvent};
//!
//! let bus = EventBus::with_default_capacity();
//! let rx = bus.subscribe();
//! tokio::spawn(renderer.run(rx));
//!
//! // A chart surface zoomed in
//! bus.emitter_for("cpu-chart").after_set_extremes(1000, 2000);
//!
//! // The page relays a tag click to every widget
//! bus.emit(PageEvent::page("update-timeseries", serde_json::json!({"tags": ["web"]})));
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, SurfaceEmitter, create_event_bus};
pub use types::{DashboardEvent, EventKind, EventOrigin, PageEvent};
