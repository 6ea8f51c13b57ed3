//! FetchCoordinator - the single in-flight-fetch discipline of one widget
//!
//! Every call to [`FetchCoordinator::fetch`] is issued a sequence number. The
//! number, the loading flag and the `before_request` hook are all handled
//! synchronously, before `fetch` returns. The transport call then runs on its
//! own task and is the only suspension point. When it settles, the response is
//! applied only if its number is still the latest issued. Older responses are
//! dropped, never merged, so responses land in issuance order rather than
//! completion order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{self, Ready};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::descriptor::QueryDescriptor;
use crate::error::{HookPoint, TransportError, WidgetError};
use crate::hooks::{FetchLifecycleHooks, NoHooks, RequestContext, at, guarded, panic_message};
use crate::state::{PresentationState, StateStore};
use crate::transport::Transport;

/// How a settled fetch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result reached the presentation state
    Applied,
    /// A newer fetch was issued first; the result was discarded
    Superseded,
}

type FetchResult = Result<FetchOutcome, WidgetError>;

/// A fetch that has been issued but not yet settled
///
/// Loading state and the `before_request` hook have already been handled when
/// this is returned, and the transport call is already running on its own
/// task. Awaiting it yields the outcome. Dropping it detaches the fetch: the
/// request still completes and settles the presentation state.
pub struct PendingFetch {
    request_id: u64,
    inner: Inner,
}

enum Inner {
    /// Failed before any transport call
    Settled(Ready<FetchResult>),
    Running(JoinHandle<FetchResult>),
}

impl PendingFetch {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl Future for PendingFetch {
    type Output = FetchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            Inner::Settled(ready) => Pin::new(ready).poll(cx),
            Inner::Running(handle) => Pin::new(handle).poll(cx).map(|joined| {
                joined.unwrap_or_else(|e| Err(WidgetError::from(TransportError::Aborted(e.to_string()))))
            }),
        }
    }
}

struct Shared {
    widget_id: String,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn FetchLifecycleHooks>,
    state: StateStore,
}

impl Shared {
    /// Apply a transport result if `request_id` is still current
    fn settle(&self, request_id: u64, raw: Result<serde_json::Value, TransportError>) -> FetchResult {
        if !self.state.is_current(request_id) {
            debug!(request_id, "FetchCoordinator::settle: superseded, discarding response");
            return Ok(FetchOutcome::Superseded);
        }

        let transformed = raw.map_err(WidgetError::from).and_then(|raw| {
            guarded(HookPoint::AfterResponse, || {
                self.hooks.after_response(raw).map_err(at(HookPoint::AfterResponse))
            })
        });

        match transformed {
            Ok(result) => {
                if self.state.settle_ok(request_id, result) {
                    debug!(request_id, "FetchCoordinator::settle: applied");
                    Ok(FetchOutcome::Applied)
                } else {
                    Ok(FetchOutcome::Superseded)
                }
            }
            Err(error) => {
                if self.fail(request_id, &error) {
                    Err(error)
                } else {
                    Ok(FetchOutcome::Superseded)
                }
            }
        }
    }

    /// Surface a failure if `request_id` is still current
    fn fail(&self, request_id: u64, error: &WidgetError) -> bool {
        if !self.state.settle_err(request_id) {
            debug!(request_id, %error, "FetchCoordinator: stale failure dropped");
            return false;
        }
        warn!(widget_id = %self.widget_id, request_id, %error, "FetchCoordinator: fetch failed");
        // on_error is consumer code too; a panic there must not escape the settle
        let _ = guarded(HookPoint::OnError, || {
            self.hooks.on_error(error);
            Ok::<(), WidgetError>(())
        });
        true
    }
}

/// Drives fetches for one widget instance
#[derive(Clone)]
pub struct FetchCoordinator {
    shared: Arc<Shared>,
}

impl FetchCoordinator {
    pub fn new(widget_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self::with_hooks(widget_id, transport, Arc::new(NoHooks))
    }

    pub fn with_hooks(
        widget_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn FetchLifecycleHooks>,
    ) -> Self {
        let widget_id = widget_id.into();
        debug!(%widget_id, "FetchCoordinator::new: called");
        Self {
            shared: Arc::new(Shared {
                widget_id,
                transport,
                hooks,
                state: StateStore::new(),
            }),
        }
    }

    pub fn widget_id(&self) -> &str {
        &self.shared.widget_id
    }

    pub fn state(&self) -> PresentationState {
        self.shared.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.shared.state.subscribe()
    }

    /// Drop the last result; stale data is otherwise kept across failures
    pub fn clear_result(&self) {
        self.shared.state.clear_result();
    }

    /// Issue a fetch for `descriptor`, superseding any fetch in flight
    ///
    /// Must be called within a Tokio runtime; the transport call is spawned.
    pub fn fetch(&self, descriptor: QueryDescriptor) -> PendingFetch {
        let shared = Arc::clone(&self.shared);
        let request_id = shared.state.begin();
        let ctx = RequestContext::new(&shared.widget_id, request_id);
        debug!(widget_id = %shared.widget_id, request_id, source_id = %descriptor.source_id(), "FetchCoordinator::fetch: called");

        let prepared = guarded(HookPoint::BeforeRequest, || {
            shared
                .hooks
                .before_request(descriptor, &ctx)
                .map_err(at(HookPoint::BeforeRequest))
        });

        let descriptor = match prepared {
            Ok(descriptor) => descriptor,
            Err(error) => {
                // The widget must not be left loading; no transport call is made
                shared.fail(request_id, &error);
                return PendingFetch {
                    request_id,
                    inner: Inner::Settled(future::ready(Err(error))),
                };
            }
        };

        let handle = tokio::spawn(async move {
            let raw = AssertUnwindSafe(shared.transport.issue(&descriptor, &ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(TransportError::Aborted(format!("panicked: {}", panic_message(payload.as_ref()))))
                });
            shared.settle(request_id, raw)
        });

        PendingFetch {
            request_id,
            inner: Inner::Running(handle),
        }
    }

    /// Surface a failure that happened outside a fetch (e.g. a bad mutation)
    ///
    /// Counts as the most recent attempt: any fetch in flight is superseded.
    pub fn report_failure(&self, error: WidgetError) {
        let request_id = self.shared.state.begin();
        self.shared.fail(request_id, &error);
    }
}

/// Apply a result directly; used by tests that need a populated state
#[cfg(test)]
impl FetchCoordinator {
    pub(crate) fn seed_result(&self, result: serde_json::Value) {
        let id = self.shared.state.begin();
        self.shared.state.settle_ok(id, result);
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Transport returning the same result every time
    pub struct FixedTransport {
        result: Result<Value, u16>,
        calls: AtomicUsize,
    }

    impl FixedTransport {
        pub fn ok(value: Value) -> Self {
            Self {
                result: Ok(value),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(status: u16) -> Self {
            Self {
                result: Err(status),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn issue(&self, _d: &QueryDescriptor, _ctx: &RequestContext) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(v) => Ok(v.clone()),
                Err(status) => Err(TransportError::Status {
                    status: *status,
                    message: "stub failure".to_string(),
                }),
            }
        }
    }

    type Gate = oneshot::Receiver<Result<Value, TransportError>>;

    /// Transport whose responses are released by the test, keyed by request id
    pub struct GatedTransport {
        gates: Mutex<HashMap<u64, Gate>>,
    }

    impl GatedTransport {
        /// Gates for request ids `1..=count`
        pub fn new(count: u64) -> (Self, Vec<oneshot::Sender<Result<Value, TransportError>>>) {
            let mut gates = HashMap::new();
            let mut senders = Vec::new();
            for id in 1..=count {
                let (tx, rx) = oneshot::channel();
                gates.insert(id, rx);
                senders.push(tx);
            }
            (
                Self {
                    gates: Mutex::new(gates),
                },
                senders,
            )
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn issue(&self, _d: &QueryDescriptor, ctx: &RequestContext) -> Result<Value, TransportError> {
            let gate = self.gates.lock().unwrap().remove(&ctx.request_id);
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(TransportError::InvalidResponse("gate dropped".to_string()))),
                None => Err(TransportError::InvalidResponse(format!("no gate for {}", ctx.request_id))),
            }
        }
    }
}
