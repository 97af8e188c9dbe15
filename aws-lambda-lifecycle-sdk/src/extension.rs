//! Lifecycle extensions and the phase runner.
//!
//! Extensions are registered per [`Phase`] at build time. All extensions of
//! a phase run concurrently on the invocation task; the phase completes when
//! every extension has finished, and the first failure fails the phase.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};

use crate::context::InvocationContext;
use crate::error::LifecycleError;

/// Named points of the lifecycle where extensions run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the handler, with the invocation input.
    Initialize,
    /// After a successful handler, with its output.
    Persist,
    /// After persist, with the handler's output.
    Flush,
    /// After a failed handler, with its error.
    HandleError,
}

impl Phase {
    /// Returns the phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Persist => "persist",
            Self::Flush => "flush",
            Self::HandleError => "handleError",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callable run during a lifecycle phase.
///
/// `V` is the value the phase hands out: the input for
/// [`Phase::Initialize`], the output for [`Phase::Persist`] and
/// [`Phase::Flush`], the error for [`Phase::HandleError`].
#[async_trait]
pub trait Extension<V: ?Sized>: Send + Sync {
    /// Runs the extension.
    ///
    /// # Arguments
    ///
    /// * `value` - The phase's value
    /// * `context` - The current invocation context
    async fn run(&self, value: &V, context: &InvocationContext) -> Result<(), LifecycleError>;

    /// Name used when the extension is logged.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to an extension.
pub type SharedExtension<V> = Arc<dyn Extension<V>>;

/// Extension backed by a closure. See [`extension_fn`].
pub struct ExtensionFn<F> {
    name: String,
    f: F,
}

impl<F> ExtensionFn<F> {
    /// Sets the name used in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> fmt::Debug for ExtensionFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFn").field("name", &self.name).finish()
    }
}

/// Wraps a closure returning a boxed future into an [`Extension`].
///
/// # Examples
///
/// ```rust,ignore
/// let audit = extension_fn(|order: &Order, ctx| {
///     Box::pin(async move {
///         tracing::info!(order_id = %order.id, request_id = %ctx.request_id, "received");
///         Ok(())
///     })
/// })
/// .named("audit");
/// ```
pub fn extension_fn<V, F>(f: F) -> ExtensionFn<F>
where
    V: ?Sized,
    F: for<'a> Fn(&'a V, &'a InvocationContext) -> BoxFuture<'a, Result<(), LifecycleError>>
        + Send
        + Sync,
{
    ExtensionFn {
        name: "extension_fn".to_string(),
        f,
    }
}

#[async_trait]
impl<V, F> Extension<V> for ExtensionFn<F>
where
    V: ?Sized + Sync,
    F: for<'a> Fn(&'a V, &'a InvocationContext) -> BoxFuture<'a, Result<(), LifecycleError>>
        + Send
        + Sync,
{
    async fn run(&self, value: &V, context: &InvocationContext) -> Result<(), LifecycleError> {
        (self.f)(value, context).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs every extension of a phase concurrently.
///
/// `phase` labels the log lines. Returns the first failure unchanged.
/// Extensions still pending when a failure arrives are dropped.
pub(crate) async fn run_phase<V>(
    phase: &str,
    extensions: &[SharedExtension<V>],
    value: &V,
    context: &InvocationContext,
) -> Result<(), LifecycleError>
where
    V: ?Sized + Sync,
{
    if extensions.is_empty() {
        return Ok(());
    }

    tracing::debug!(phase = phase, count = extensions.len(), "Running lifecycle extensions");

    try_join_all(extensions.iter().map(|extension| async move {
        extension.run(value, context).await.map_err(|error| {
            tracing::warn!(
                phase = phase,
                extension = extension.name(),
                error = %error,
                "Lifecycle extension failed"
            );
            error
        })
    }))
    .await?;

    Ok(())
}
