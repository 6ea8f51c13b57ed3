//! Named widget controllers
//!
//! A view definition picks a controller per widget. The controller decides
//! which hooks and event handlers the widget's renderer gets. Widgets without
//! a `controller` use [`DEFAULT_CONTROLLER`].

pub mod timeseries;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::descriptor::QueryDescriptor;
use crate::events::EventKind;
use crate::hooks::{FetchLifecycleHooks, NoHooks};
use crate::renderer::WidgetRenderer;
use crate::transport::Transport;

/// Stock controller: fetch on mount, re-fetch on `refresh`
pub const DEFAULT_CONTROLLER: &str = "WidgetRendererController";

/// Time-series chart controller, see [`timeseries`]
pub const TIMESERIES_CONTROLLER: &str = "TimeseriesWidgetRendererCtrl";

/// Every controller name [`build`] accepts
pub const CONTROLLERS: &[&str] = &[DEFAULT_CONTROLLER, TIMESERIES_CONTROLLER];

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Unknown controller '{name}'. Supported: {}", CONTROLLERS.join(", "))]
    Unknown { name: String },
}

/// Build a renderer for a widget using the named controller
pub fn build(
    controller: Option<&str>,
    widget_id: impl Into<String>,
    descriptor: QueryDescriptor,
    transport: Arc<dyn Transport>,
) -> Result<WidgetRenderer, ControllerError> {
    let name = controller.unwrap_or(DEFAULT_CONTROLLER);
    debug!(controller = %name, "controllers::build: called");

    let hooks: Arc<dyn FetchLifecycleHooks> = match name {
        DEFAULT_CONTROLLER | TIMESERIES_CONTROLLER => Arc::new(NoHooks),
        other => {
            return Err(ControllerError::Unknown {
                name: other.to_string(),
            });
        }
    };

    let mut renderer = WidgetRenderer::with_hooks(widget_id, descriptor, transport, hooks);
    install_default(&mut renderer);
    if name == TIMESERIES_CONTROLLER {
        timeseries::install(&mut renderer);
    }
    Ok(renderer)
}

/// Handlers every controller gets
pub fn install_default(renderer: &mut WidgetRenderer) {
    renderer.on(EventKind::Refresh, |descriptor, _| Ok(Some(descriptor)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::mock::FixedTransport;
    use crate::descriptor::{RelativeTime, TimeUnit};
    use serde_json::json;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(FixedTransport::ok(json!(1)))
    }

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor::relative("cpu", RelativeTime::new(1, TimeUnit::Hours))
    }

    #[tokio::test]
    async fn test_default_controller() {
        let mut r = build(None, "w1", descriptor(), transport()).unwrap();
        let fetches = r.handle(&crate::events::PageEvent::page("refresh", json!(null)));
        assert_eq!(fetches.len(), 1);
        // Default widgets do not react to axis changes
        let fetches = r.handle(&crate::events::PageEvent::page(
            "after-set-extremes",
            json!({"min": 1, "max": 2}),
        ));
        assert!(fetches.is_empty());
    }

    #[tokio::test]
    async fn test_timeseries_controller_reacts_to_extremes() {
        let mut r = build(Some(TIMESERIES_CONTROLLER), "w1", descriptor(), transport()).unwrap();
        let fetches = r.handle(&crate::events::PageEvent::surface(
            "w1",
            "after-set-extremes",
            json!({"min": 1, "max": 2}),
        ));
        assert_eq!(fetches.len(), 1);
    }

    #[test]
    fn test_unknown_controller() {
        let err = build(Some("MySpecialCtrl"), "w1", descriptor(), transport()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MySpecialCtrl"));
        assert!(msg.contains(TIMESERIES_CONTROLLER));
    }
}
