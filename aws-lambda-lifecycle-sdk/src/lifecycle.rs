//! The invocation lifecycle orchestrator.
//!
//! [`Lifecycle`] wraps a [`Handler`] with four extension phases, a deadline
//! watchdog and result classification. Every call to
//! [`LifecycleHandler::invoke`] walks the same state machine:
//!
//! ```text
//! initialize ──> called ──> handler ──ok──> persist ──> persisted ──> flush ──> succeeded ──> finished
//!     │                        │                │                        │
//!     └────────────────────────┴──err───────────┴────────────────────────┴──> handleError ──> error ──> finished
//! ```
//!
//! The watchdog is armed right after `called` and disarmed before the
//! terminal `succeeded` or `error` event. If it fires first, a `timeOut`
//! event is emitted and the invocation keeps running; `timeOut` never
//! follows `finished`.
//!
//! # Examples
//!
//! ```rust,ignore
//! use aws_lambda_lifecycle_sdk::{handler_fn, HandlerError, Lifecycle};
//!
//! let handler = Lifecycle::builder()
//!     .on_initialize(load_settings)
//!     .on_flush(publish_metrics)
//!     .build()
//!     .wrap(handler_fn(|order: Order, ctx| async move {
//!         if order.items.is_empty() {
//!             return Err(HandlerError::expected("empty order", Receipt::rejected()));
//!         }
//!         Ok(Receipt::accepted(&order, &ctx.request_id))
//!     }));
//!
//! let receipt = handler.invoke(order, &context).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::config::LifecycleConfig;
use crate::context::InvocationContext;
use crate::error::LifecycleError;
use crate::events::{EventEmitter, LifecycleEvent, Subscription};
use crate::extension::{run_phase, Extension, Phase, SharedExtension};
use crate::outcome::{HandlerError, Outcome};
use crate::watchdog::{DeadlineWatchdog, WatchdogGuard};

/// Business logic wrapped by the orchestrator.
#[async_trait]
pub trait Handler<I, O>: Send + Sync {
    /// Handles one invocation.
    ///
    /// # Arguments
    ///
    /// * `input` - The invocation input
    /// * `context` - The invocation context
    ///
    /// # Returns
    ///
    /// The output, an expected failure carrying the response to complete
    /// with, or an unexpected failure.
    async fn call(&self, input: I, context: &InvocationContext) -> Result<O, HandlerError<O>>;
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps an async closure into a [`Handler`].
///
/// The closure receives its own copy of the invocation context.
pub fn handler_fn<I, O, F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(I, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, HandlerError<O>>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<I, O, F, Fut> Handler<I, O> for HandlerFn<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, HandlerError<O>>> + Send + 'static,
{
    async fn call(&self, input: I, context: &InvocationContext) -> Result<O, HandlerError<O>> {
        (self.f)(input, context.clone()).await
    }
}

/// Entry point for building an orchestrator.
pub struct Lifecycle<I, O> {
    registry: Arc<Registry<I, O>>,
    config: LifecycleConfig,
}

struct Registry<I, O> {
    initialize: Vec<SharedExtension<I>>,
    persist: Vec<SharedExtension<O>>,
    flush: Vec<SharedExtension<O>>,
    handle_error: Vec<SharedExtension<HandlerError<O>>>,
}

impl<I, O> Lifecycle<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Starts a new builder with no extensions and the default configuration.
    pub fn builder() -> LifecycleBuilder<I, O> {
        LifecycleBuilder::default()
    }

    /// Returns the configuration the orchestrator was built with.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Wraps a handler, producing the instrumented entry point.
    pub fn wrap<H>(self, handler: H) -> LifecycleHandler<I, O>
    where
        H: Handler<I, O> + 'static,
    {
        LifecycleHandler {
            inner: Arc::new(Inner {
                registry: self.registry,
                watchdog: DeadlineWatchdog::new(self.config.safety_margin),
                handler: Box::new(handler),
                events: EventEmitter::new(),
            }),
        }
    }
}

/// Collects extensions per phase until [`build`](Self::build) freezes them.
pub struct LifecycleBuilder<I, O> {
    initialize: Vec<SharedExtension<I>>,
    persist: Vec<SharedExtension<O>>,
    flush: Vec<SharedExtension<O>>,
    handle_error: Vec<SharedExtension<HandlerError<O>>>,
    config: LifecycleConfig,
}

impl<I, O> Default for LifecycleBuilder<I, O> {
    fn default() -> Self {
        Self {
            initialize: Vec::new(),
            persist: Vec::new(),
            flush: Vec::new(),
            handle_error: Vec::new(),
            config: LifecycleConfig::default(),
        }
    }
}

impl<I, O> fmt::Debug for LifecycleBuilder<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBuilder")
            .field("initialize", &self.initialize.len())
            .field("persist", &self.persist.len())
            .field("flush", &self.flush.len())
            .field("handle_error", &self.handle_error.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<I, O> LifecycleBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Adds an extension run with the input before the handler.
    pub fn on_initialize<E: Extension<I> + 'static>(mut self, extension: E) -> Self {
        self.initialize.push(Arc::new(extension));
        self
    }

    /// Adds an extension run with the output after a successful handler.
    pub fn on_persist<E: Extension<O> + 'static>(mut self, extension: E) -> Self {
        self.persist.push(Arc::new(extension));
        self
    }

    /// Adds an extension run with the output after the persist phase.
    pub fn on_flush<E: Extension<O> + 'static>(mut self, extension: E) -> Self {
        self.flush.push(Arc::new(extension));
        self
    }

    /// Adds an extension run with the error after a failed handler.
    ///
    /// A failing error extension is logged; the original error is kept.
    pub fn on_handle_error<E>(mut self, extension: E) -> Self
    where
        E: Extension<HandlerError<O>> + 'static,
    {
        self.handle_error.push(Arc::new(extension));
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Freezes the extension registry.
    pub fn build(self) -> Lifecycle<I, O> {
        tracing::debug!(
            initialize = self.initialize.len(),
            persist = self.persist.len(),
            flush = self.flush.len(),
            handle_error = self.handle_error.len(),
            "Lifecycle built"
        );
        Lifecycle {
            registry: Arc::new(Registry {
                initialize: self.initialize,
                persist: self.persist,
                flush: self.flush,
                handle_error: self.handle_error,
            }),
            config: self.config,
        }
    }
}

struct Inner<I, O> {
    registry: Arc<Registry<I, O>>,
    watchdog: DeadlineWatchdog,
    handler: Box<dyn Handler<I, O>>,
    events: EventEmitter<I, O>,
}

/// A handler wrapped with the lifecycle. Cheap to clone.
pub struct LifecycleHandler<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for LifecycleHandler<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: 'static, O: 'static> fmt::Debug for LifecycleHandler<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHandler")
            .field("watchdog", &self.inner.watchdog)
            .field("events", &self.inner.events)
            .finish()
    }
}

impl<I, O> LifecycleHandler<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Returns the event emitter of this orchestrator.
    pub fn events(&self) -> &EventEmitter<I, O> {
        &self.inner.events
    }

    /// Registers an event listener. See [`EventEmitter::subscribe`].
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LifecycleEvent<'_, I, O>) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Runs one invocation through the lifecycle.
    ///
    /// # Returns
    ///
    /// The handler's output, the response of an expected failure, or the
    /// unexpected failure.
    pub async fn invoke(&self, input: I, context: &InvocationContext) -> Result<O, LifecycleError> {
        let span = tracing::info_span!(
            "invocation",
            function_name = %context.function_name,
            request_id = %context.request_id,
        );
        self.run(input, context).instrument(span).await
    }

    async fn run(&self, input: I, context: &InvocationContext) -> Result<O, LifecycleError> {
        let registry = &self.inner.registry;
        let events = &self.inner.events;

        let initialized =
            run_phase(Phase::Initialize.as_str(), &registry.initialize, &input, context).await;
        if let Err(error) = initialized {
            return self
                .fail(HandlerError::Unexpected(error), context, WatchdogGuard::inert())
                .await;
        }

        events.emit(&LifecycleEvent::Called {
            input: &input,
            context,
        });

        let timeout_events = events.clone();
        let timeout_context = context.clone();
        let guard = self.inner.watchdog.arm(context.remaining_time(), move || {
            timeout_events.emit(&LifecycleEvent::TimeOut {
                context: &timeout_context,
            });
        });

        match self.inner.handler.call(input, context).await {
            Ok(output) => self.succeed(output, context, guard).await,
            Err(error) => self.fail(error, context, guard).await,
        }
    }

    async fn succeed(
        &self,
        output: O,
        context: &InvocationContext,
        guard: WatchdogGuard,
    ) -> Result<O, LifecycleError> {
        let registry = &self.inner.registry;
        let events = &self.inner.events;

        let persisted = run_phase(Phase::Persist.as_str(), &registry.persist, &output, context).await;
        if let Err(error) = persisted {
            return self.fail(HandlerError::Unexpected(error), context, guard).await;
        }
        events.emit(&LifecycleEvent::Persisted {
            output: &output,
            context,
        });

        if let Err(error) =
            run_phase(Phase::Flush.as_str(), &registry.flush, &output, context).await
        {
            return self.fail(HandlerError::Unexpected(error), context, guard).await;
        }

        settle(guard).await;
        events.emit(&LifecycleEvent::Succeeded {
            output: &output,
            context,
        });
        events.emit(&LifecycleEvent::Finished { context });
        tracing::debug!("Invocation succeeded");
        Ok(output)
    }

    async fn fail(
        &self,
        error: HandlerError<O>,
        context: &InvocationContext,
        guard: WatchdogGuard,
    ) -> Result<O, LifecycleError> {
        let registry = &self.inner.registry;
        let events = &self.inner.events;

        if let Err(extension_error) =
            run_phase(Phase::HandleError.as_str(), &registry.handle_error, &error, context).await
        {
            tracing::warn!(
                error = %extension_error,
                original_error = %error,
                "Error extension failed, keeping the original error"
            );
        }

        settle(guard).await;
        events.emit(&LifecycleEvent::Error {
            error: &error,
            context,
        });
        events.emit(&LifecycleEvent::Finished { context });

        match Outcome::classify(Err(error)) {
            Outcome::ExpectedFailure { response, message } => {
                tracing::info!(message = %message, "Invocation completed with an expected failure");
                Ok(response)
            }
            outcome => {
                let completion = outcome.into_completion();
                if let Err(error) = &completion {
                    tracing::error!(
                        error_type = error.error_type(),
                        error = %error,
                        "Invocation failed"
                    );
                }
                completion
            }
        }
    }
}

// A timeout in flight completes before the terminal events are emitted.
async fn settle(mut guard: WatchdogGuard) {
    guard.settle().await;
    if guard.has_fired() {
        tracing::debug!("Invocation settled after the watchdog deadline");
    }
}
