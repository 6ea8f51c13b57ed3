//! WidgetRenderer - data-fetch lifecycle for dashboard widgets
//!
//! Each widget on a dashboard page owns one query descriptor and one
//! presentation state. The widget fetches when it is mounted, re-fetches when
//! events on the page bus ask it to, and exposes `loading` / `error` / `result`
//! to whatever renders it. Responses that arrive after a newer request was
//! issued are discarded, so the state always reflects the latest request.
//!
//! # Modules
//!
//! - [`descriptor`] - Query descriptor and its typed setters
//! - [`coordinator`] - Fetch lifecycle and stale-response suppression
//! - [`hooks`] - Consumer customization points (before/after/on_error)
//! - [`relay`] - Event handlers that mutate the descriptor and fetch
//! - [`events`] - Page-level event bus and typed events
//! - [`renderer`] - One widget instance: descriptor, coordinator, relay
//! - [`controllers`] - Named controllers selected by view definitions
//! - [`view`] - YAML view definitions
//! - [`transport`] - Transport trait and HTTP implementation
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod controllers;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod hooks;
pub mod relay;
pub mod renderer;
pub mod state;
pub mod transport;
pub mod view;

// Re-export commonly used types
pub use config::{BusConfig, Config, TransportConfig};
pub use coordinator::{FetchCoordinator, FetchOutcome, PendingFetch};
pub use descriptor::{
    Aggregator, HttpMethod, MetricSpec, QueryDescriptor, QueryOptions, RelativeTime, Sampling, TimeUnit, TimeWindow,
};
pub use error::{DescriptorError, ErrorKind, HookError, HookPoint, TransportError, WidgetError};
pub use events::{DashboardEvent, EventBus, EventKind, EventOrigin, PageEvent, SurfaceEmitter, create_event_bus};
pub use hooks::{FetchLifecycleHooks, HookSet, NoHooks, RequestContext};
pub use relay::{EventHandler, EventRelay};
pub use renderer::WidgetRenderer;
pub use state::{PresentationState, StateStore};
pub use transport::{HttpTransport, Transport};
pub use view::{ViewDefinition, WidgetDefinition};
