//! Registry of progress observers.
//!
//! Observers ("interceptors") are registered per [`SyncEventKind`] and run
//! in registration order. A handler is either synchronous or returns a
//! future; the orchestrator awaits [`Interceptors::dispatch`] either way, so
//! every observer of one event has finished before the next protocol step
//! starts.
//!
//! Observer failures never reach the transfer: an `Err` or a panic raised by
//! a handler is logged at `warn` level, counted in the [`DispatchReport`],
//! and dispatch moves on to the next handler.

use crate::events::{
    GettingChangesRequestArgs, GettingChangesResponseArgs, ProgressArgs, ProgressEvent,
    SendingChangesRequestArgs, SyncEventKind,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// Error type observers may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of a fallible observer.
pub type ObserverResult = Result<(), ObserverError>;

type SyncHandler = Arc<dyn Fn(&ProgressEvent) -> ObserverResult + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(ProgressEvent) -> BoxFuture<'static, ObserverResult> + Send + Sync>;

/// Why an observer did not complete normally.
#[derive(Error, Debug)]
pub enum ObserverFailure {
    /// The observer returned an error.
    #[error("observer returned an error: {0}")]
    Error(ObserverError),
    /// The observer panicked.
    #[error("observer panicked: {0}")]
    Panic(String),
}

/// A registered observer.
#[derive(Clone)]
pub enum Interceptor {
    /// Runs inline on the orchestrating task.
    Sync(SyncHandler),
    /// Returns a future the orchestrator awaits.
    Async(AsyncHandler),
}

impl Interceptor {
    /// Wraps a synchronous handler.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(&ProgressEvent) -> ObserverResult + Send + Sync + 'static,
    {
        Interceptor::Sync(Arc::new(handler))
    }

    /// Wraps an asynchronous handler.
    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(ProgressEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ObserverResult> + Send + 'static,
    {
        Interceptor::Async(Arc::new(move |event| handler(event).boxed()))
    }

    /// Returns true for asynchronous handlers.
    pub fn is_async(&self) -> bool {
        matches!(self, Interceptor::Async(_))
    }

    async fn invoke(&self, event: &ProgressEvent) -> Result<(), ObserverFailure> {
        match self {
            Interceptor::Sync(handler) => match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(result) => result.map_err(ObserverFailure::Error),
                Err(payload) => Err(ObserverFailure::Panic(panic_message(payload.as_ref()))),
            },
            Interceptor::Async(handler) => {
                let future = catch_unwind(AssertUnwindSafe(|| handler(event.clone())))
                    .map_err(|payload| ObserverFailure::Panic(panic_message(payload.as_ref())))?;
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => result.map_err(ObserverFailure::Error),
                    Err(payload) => Err(ObserverFailure::Panic(panic_message(payload.as_ref()))),
                }
            }
        }
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interceptor::Sync(_) => f.write_str("Interceptor::Sync"),
            Interceptor::Async(_) => f.write_str("Interceptor::Async"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Outcome of one dispatch, for logging and tests only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Observers that completed normally.
    pub delivered: usize,
    /// Observers that returned an error or panicked.
    pub failed: usize,
}

/// Observers keyed by event kind.
#[derive(Default)]
pub struct Interceptors {
    handlers: RwLock<HashMap<SyncEventKind, Vec<Interceptor>>>,
}

impl Interceptors {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer; observers of one kind run in registration order.
    pub fn register(&self, kind: SyncEventKind, interceptor: Interceptor) {
        self.handlers.write().entry(kind).or_default().push(interceptor);
    }

    /// Removes every observer of `kind`.
    pub fn clear(&self, kind: SyncEventKind) {
        self.handlers.write().remove(&kind);
    }

    /// Number of observers registered for `kind`.
    pub fn count(&self, kind: SyncEventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Returns true if `kind` has at least one observer.
    pub fn has_observers(&self, kind: SyncEventKind) -> bool {
        self.count(kind) > 0
    }

    /// Runs every observer of the event's kind to completion, in order.
    pub async fn dispatch(&self, event: ProgressEvent) -> DispatchReport {
        let kind = event.kind();
        // Snapshot so no lock is held while observers run.
        let handlers: Vec<Interceptor> = self.handlers.read().get(&kind).cloned().unwrap_or_default();

        let mut report = DispatchReport::default();
        if handlers.is_empty() {
            return report;
        }

        trace!(event_id = %event.event_id(), message = %event.message(), "dispatching progress event");

        for handler in &handlers {
            match handler.invoke(&event).await {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    report.failed += 1;
                    warn!(
                        event_id = %event.event_id(),
                        error = %failure,
                        "progress observer failed; continuing"
                    );
                }
            }
        }
        report
    }

    /// Observes download batch requests.
    pub fn on_http_getting_changes_request<F>(&self, handler: F)
    where
        F: Fn(&GettingChangesRequestArgs) + Send + Sync + 'static,
    {
        self.register(
            SyncEventKind::HttpGettingChangesRequest,
            typed_sync(ProgressEvent::as_getting_changes_request, handler),
        );
    }

    /// Observes download batch requests with an async handler.
    pub fn on_http_getting_changes_request_async<F, Fut>(&self, handler: F)
    where
        F: Fn(GettingChangesRequestArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(
            SyncEventKind::HttpGettingChangesRequest,
            typed_async(ProgressEvent::into_getting_changes_request, handler),
        );
    }

    /// Observes received download batches.
    pub fn on_http_getting_changes_response<F>(&self, handler: F)
    where
        F: Fn(&GettingChangesResponseArgs) + Send + Sync + 'static,
    {
        self.register(
            SyncEventKind::HttpGettingChangesResponse,
            typed_sync(ProgressEvent::as_getting_changes_response, handler),
        );
    }

    /// Observes received download batches with an async handler.
    pub fn on_http_getting_changes_response_async<F, Fut>(&self, handler: F)
    where
        F: Fn(GettingChangesResponseArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(
            SyncEventKind::HttpGettingChangesResponse,
            typed_async(ProgressEvent::into_getting_changes_response, handler),
        );
    }

    /// Observes upload batches about to be sent.
    pub fn on_http_sending_changes_request<F>(&self, handler: F)
    where
        F: Fn(&SendingChangesRequestArgs) + Send + Sync + 'static,
    {
        self.register(
            SyncEventKind::HttpSendingChangesRequest,
            typed_sync(ProgressEvent::as_sending_changes_request, handler),
        );
    }

    /// Observes upload batches about to be sent with an async handler.
    pub fn on_http_sending_changes_request_async<F, Fut>(&self, handler: F)
    where
        F: Fn(SendingChangesRequestArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(
            SyncEventKind::HttpSendingChangesRequest,
            typed_async(ProgressEvent::into_sending_changes_request, handler),
        );
    }
}

impl std::fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let mut map = f.debug_map();
        for (kind, list) in handlers.iter() {
            map.entry(kind, &list.len());
        }
        map.finish()
    }
}

fn typed_sync<A, F>(extract: fn(&ProgressEvent) -> Option<&A>, handler: F) -> Interceptor
where
    A: 'static,
    F: Fn(&A) + Send + Sync + 'static,
{
    Interceptor::sync(move |event| {
        if let Some(args) = extract(event) {
            handler(args);
        }
        Ok(())
    })
}

fn typed_async<A, F, Fut>(extract: fn(ProgressEvent) -> Option<A>, handler: F) -> Interceptor
where
    A: 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Interceptor::from_async(move |event| {
        let pending = extract(event).map(&handler);
        async move {
            if let Some(pending) = pending {
                pending.await;
            }
            Ok::<(), ObserverError>(())
        }
    })
}
