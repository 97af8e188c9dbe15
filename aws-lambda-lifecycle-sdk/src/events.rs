//! Lifecycle events and the per-orchestrator event emitter.
//!
//! Events are fire-and-forget notifications. Listeners run synchronously on
//! the emitting task, and a panicking listener is caught and logged so it can
//! never change how an invocation completes.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::context::InvocationContext;
use crate::outcome::HandlerError;

/// An observable point in an invocation's lifecycle.
#[derive(Debug)]
pub enum LifecycleEvent<'a, I, O> {
    /// The handler is about to be called.
    Called {
        /// The invocation input
        input: &'a I,
        /// The invocation context
        context: &'a InvocationContext,
    },
    /// All persist extensions completed.
    Persisted {
        /// The handler's output
        output: &'a O,
        /// The invocation context
        context: &'a InvocationContext,
    },
    /// The invocation completed successfully.
    Succeeded {
        /// The handler's output
        output: &'a O,
        /// The invocation context
        context: &'a InvocationContext,
    },
    /// The invocation failed, expectedly or not.
    Error {
        /// The failure
        error: &'a HandlerError<O>,
        /// The invocation context
        context: &'a InvocationContext,
    },
    /// The invocation settled. Always follows `Succeeded` or `Error`.
    Finished {
        /// The invocation context
        context: &'a InvocationContext,
    },
    /// The watchdog deadline passed before the invocation settled.
    TimeOut {
        /// The invocation context
        context: &'a InvocationContext,
    },
}

impl<'a, I, O> LifecycleEvent<'a, I, O> {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Called { .. } => EventKind::Called,
            Self::Persisted { .. } => EventKind::Persisted,
            Self::Succeeded { .. } => EventKind::Succeeded,
            Self::Error { .. } => EventKind::Error,
            Self::Finished { .. } => EventKind::Finished,
            Self::TimeOut { .. } => EventKind::TimeOut,
        }
    }

    /// Returns the context of the invocation that emitted this event.
    pub fn context(&self) -> &'a InvocationContext {
        match self {
            Self::Called { context, .. }
            | Self::Persisted { context, .. }
            | Self::Succeeded { context, .. }
            | Self::Error { context, .. }
            | Self::Finished { context }
            | Self::TimeOut { context } => context,
        }
    }
}

/// The payload-free kind of a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Called,
    Persisted,
    Succeeded,
    Error,
    Finished,
    TimeOut,
}

impl EventKind {
    /// Returns the event's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Called => "called",
            Self::Persisted => "persisted",
            Self::Succeeded => "succeeded",
            Self::Error => "error",
            Self::Finished => "finished",
            Self::TimeOut => "timeOut",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Listener<I, O> = Arc<dyn Fn(&LifecycleEvent<'_, I, O>) + Send + Sync>;

struct Registry<I, O> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<I, O>)>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<I, O> Detach for Registry<I, O> {
    fn detach(&self, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Event emitter scoped to one orchestrator instance.
///
/// Cloning yields a handle to the same listener set.
pub struct EventEmitter<I, O> {
    registry: Arc<Registry<I, O>>,
}

impl<I, O> Clone for EventEmitter<I, O> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<I, O> Default for EventEmitter<I, O> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl<I: 'static, O: 'static> fmt::Debug for EventEmitter<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<I: 'static, O: 'static> EventEmitter<I, O> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    ///
    /// The listener stays attached until the returned [`Subscription`] is
    /// dropped or detached.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let subscription = handler.subscribe(|event| {
    ///     if event.kind() == EventKind::TimeOut {
    ///         metrics.increment("near_deadline");
    ///     }
    /// });
    /// ```
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LifecycleEvent<'_, I, O>) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));

        let registry: Arc<dyn Detach> = self.registry.clone();
        Subscription {
            id,
            registry: Some(Arc::downgrade(&registry)),
        }
    }

    /// Delivers an event to every listener attached at the time of the call.
    ///
    /// Listener panics are caught and logged.
    pub fn emit(&self, event: &LifecycleEvent<'_, I, O>) {
        let listeners: Vec<Listener<I, O>> = self
            .registry
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(event = %event.kind(), "Lifecycle event listener panicked");
            }
        }
    }

    /// Returns the number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.registry
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Handle keeping a listener attached.
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    id: u64,
    registry: Option<Weak<dyn Detach>>,
}

impl Subscription {
    /// Detaches the listener now.
    pub fn detach(mut self) {
        self.release();
    }

    /// Keeps the listener attached for the emitter's whole lifetime.
    pub fn forget(mut self) {
        self.registry = None;
    }

    fn release(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Listener that writes every event through `tracing`.
///
/// # Examples
///
/// ```rust,ignore
/// handler.subscribe(log_event).forget();
/// ```
pub fn log_event<I, O>(event: &LifecycleEvent<'_, I, O>) {
    let context = event.context();
    match event {
        LifecycleEvent::Error { error, .. } => tracing::warn!(
            event = %event.kind(),
            function_name = %context.function_name,
            request_id = %context.request_id,
            expected = error.is_expected(),
            error = %error,
            "Lifecycle event"
        ),
        LifecycleEvent::TimeOut { .. } => tracing::warn!(
            event = %event.kind(),
            function_name = %context.function_name,
            request_id = %context.request_id,
            "Lifecycle event"
        ),
        _ => tracing::debug!(
            event = %event.kind(),
            function_name = %context.function_name,
            request_id = %context.request_id,
            "Lifecycle event"
        ),
    }
}
