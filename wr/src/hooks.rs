//! Fetch lifecycle hooks
//!
//! Customization points a widget controller may override:
//!
//! - `before_request`: rewrite the descriptor right before transport
//! - `after_response`: transform a successful response before it is shown
//! - `on_error`: observe a failure that reached the presentation state
//!
//! Every method has an identity (or no-op) default, so an implementation
//! overrides only what it needs. [`HookSet`] does the same with closures for
//! callers that do not want a dedicated type.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::descriptor::QueryDescriptor;
use crate::error::{HookError, HookPoint, WidgetError};

/// Per-request context handed to `before_request` and the transport
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Widget instance issuing the request
    pub widget_id: String,
    /// Sequence number used for stale-response suppression
    pub request_id: u64,
    /// Correlation id sent to the backend
    pub trace_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(widget_id: impl Into<String>, request_id: u64) -> Self {
        Self {
            widget_id: widget_id.into(),
            request_id,
            trace_id: Uuid::now_v7(),
            issued_at: Utc::now(),
        }
    }
}

/// Optional overrides of a widget's fetch lifecycle
pub trait FetchLifecycleHooks: Send + Sync {
    /// Rewrite the descriptor before it is sent
    fn before_request(&self, descriptor: QueryDescriptor, _ctx: &RequestContext) -> Result<QueryDescriptor, HookError> {
        Ok(descriptor)
    }

    /// Transform a successful response
    fn after_response(&self, raw: Value) -> Result<Value, HookError> {
        Ok(raw)
    }

    /// Called once per failure that marks the widget as errored
    fn on_error(&self, _error: &WidgetError) {}
}

/// Hooks that leave every stage untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl FetchLifecycleHooks for NoHooks {}

type BeforeRequestFn = Box<dyn Fn(QueryDescriptor, &RequestContext) -> Result<QueryDescriptor, HookError> + Send + Sync>;
type AfterResponseFn = Box<dyn Fn(Value) -> Result<Value, HookError> + Send + Sync>;
type ErrorFn = Box<dyn Fn(&WidgetError) + Send + Sync>;

/// Closure-backed hooks; each one is individually optional
#[derive(Default)]
pub struct HookSet {
    before_request: Option<BeforeRequestFn>,
    after_response: Option<AfterResponseFn>,
    on_error: Option<ErrorFn>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_request<F>(mut self, f: F) -> Self
    where
        F: Fn(QueryDescriptor, &RequestContext) -> Result<QueryDescriptor, HookError> + Send + Sync + 'static,
    {
        self.before_request = Some(Box::new(f));
        self
    }

    pub fn after_response<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.after_response = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&WidgetError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl FetchLifecycleHooks for HookSet {
    fn before_request(&self, descriptor: QueryDescriptor, ctx: &RequestContext) -> Result<QueryDescriptor, HookError> {
        match &self.before_request {
            Some(f) => f(descriptor, ctx),
            None => Ok(descriptor),
        }
    }

    fn after_response(&self, raw: Value) -> Result<Value, HookError> {
        match &self.after_response {
            Some(f) => f(raw),
            None => Ok(raw),
        }
    }

    fn on_error(&self, error: &WidgetError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }
}

/// Run consumer code, turning both errors and panics into a [`WidgetError`]
pub(crate) fn guarded<T, E>(point: HookPoint, f: impl FnOnce() -> Result<T, E>) -> Result<T, WidgetError>
where
    E: Into<WidgetError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(Into::into),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(%point, %message, "guarded: hook panicked");
            Err(WidgetError::hook(point, HookError::Panicked(message)))
        }
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Tag a hook failure with the lifecycle point it came from
pub(crate) fn at(point: HookPoint) -> impl Fn(HookError) -> WidgetError {
    move |source| WidgetError::hook(point, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{RelativeTime, TimeUnit};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor::relative("cpu", RelativeTime::new(1, TimeUnit::Hours))
    }

    #[test]
    fn test_no_hooks_is_identity() {
        let hooks = NoHooks;
        let ctx = RequestContext::new("w1", 1);
        assert_eq!(hooks.before_request(descriptor(), &ctx).unwrap(), descriptor());
        assert_eq!(hooks.after_response(json!({"a": 1})).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_hook_set_partial_override() {
        let hooks = HookSet::new().before_request(|mut d, ctx| {
            d.set_option("id", json!(ctx.widget_id)).map_err(|e| HookError::failed(e.to_string()))?;
            Ok(d)
        });
        let ctx = RequestContext::new("w1", 1);

        let d = FetchLifecycleHooks::before_request(&hooks, descriptor(), &ctx).unwrap();
        assert_eq!(d.options().get("id"), Some(&json!("w1")));

        // after_response was never set, so it stays identity
        assert_eq!(FetchLifecycleHooks::after_response(&hooks, json!([1, 2])).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_hook_set_on_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hooks = HookSet::new().on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        FetchLifecycleHooks::on_error(&hooks, &WidgetError::hook(HookPoint::BeforeRequest, HookError::failed("x")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guarded_catches_panic() {
        let result: Result<(), WidgetError> = guarded(HookPoint::AfterResponse, || -> Result<(), WidgetError> {
            panic!("hook exploded");
        });
        match result {
            Err(WidgetError::Hook {
                point: HookPoint::AfterResponse,
                source: HookError::Panicked(msg),
            }) => assert!(msg.contains("hook exploded")),
            other => panic!("Expected panicked hook error, got {:?}", other),
        }
    }

    #[test]
    fn test_guarded_passes_errors_through() {
        let result: Result<(), WidgetError> =
            guarded(HookPoint::BeforeRequest, || Err(HookError::failed("nope")).map_err(at(HookPoint::BeforeRequest)));
        assert!(matches!(
            result,
            Err(WidgetError::Hook {
                point: HookPoint::BeforeRequest,
                ..
            })
        ));
    }
}
