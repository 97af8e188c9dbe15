//! FIFO continuation consumer.
//!
//! The consumer drains a FIFO queue one bounded batch per invocation, on top
//! of the lifecycle orchestrator:
//!
//! 1. **Load**: receive up to `max_number_of_messages`. A continuation
//!    (`retryMessagesGet`) that finds the queue empty waits `retry_delay`
//!    and receives once more.
//! 2. **Process**: messages are decoded and handed to the processor one at a
//!    time, in queue order. The first failure aborts the batch.
//! 3. **Flush** (success only): every processed message is acknowledged in a
//!    single batch request, then a continuation is dispatched so the next
//!    invocation keeps draining.
//!
//! A message is acknowledged only after it was fully processed. A failed
//! batch acknowledges nothing and sends no continuation; its messages become
//! visible again after the queue's visibility timeout, so processors must be
//! idempotent.
//!
//! ## Module Structure
//!
//! - `batch` - Processed-message set and the invocation report

mod batch;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use batch::{BatchReport, ProcessedMessages};

use crate::config::FifoConsumerConfig;
use crate::context::InvocationContext;
use crate::error::{BoxError, LifecycleError};
use crate::extension::{run_phase, Extension, SharedExtension};
use crate::invoker::SharedInvoker;
use crate::lambda::{ConsumerInput, ContinuationPayload};
use crate::lifecycle::{Handler, LifecycleBuilder, LifecycleHandler};
use crate::outcome::HandlerError;
use crate::queue::{Message, SharedQueueService};

/// Business logic applied to each decoded message.
#[async_trait]
pub trait MessageProcessor<T>: Send + Sync {
    /// Processes one message payload.
    ///
    /// Any error aborts the batch; nothing received in this invocation is
    /// acknowledged.
    async fn process(&self, payload: T, context: &InvocationContext) -> Result<(), BoxError>;
}

/// Processor backed by an async closure. See [`processor_fn`].
pub struct ProcessorFn<F> {
    f: F,
}

/// Wraps an async closure into a [`MessageProcessor`].
///
/// # Examples
///
/// ```rust,ignore
/// let processor = processor_fn(|order: Order, ctx| async move {
///     ledger.record(&order, &ctx.request_id).await?;
///     Ok(())
/// });
/// ```
pub fn processor_fn<T, F, Fut>(f: F) -> ProcessorFn<F>
where
    F: Fn(T, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    ProcessorFn { f }
}

#[async_trait]
impl<T, F, Fut> MessageProcessor<T> for ProcessorFn<F>
where
    T: Send + 'static,
    F: Fn(T, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn process(&self, payload: T, context: &InvocationContext) -> Result<(), BoxError> {
        (self.f)(payload, context.clone()).await
    }
}

/// A message that could not be consumed, handed to consumption-error observers.
#[derive(Debug)]
pub struct ConsumptionFailure {
    /// Why consumption failed
    pub error: LifecycleError,
    /// The raw message
    pub message: Message,
}

/// Builder of a FIFO continuation consumer.
///
/// # Examples
///
/// ```rust,ignore
/// let queue = Arc::new(SqsQueueService::from_env(queue_url).await);
/// let invoker = Arc::new(LambdaInvoker::from_env().await);
///
/// let handler = FifoConsumer::<Order>::new(queue, invoker, FifoConsumerConfig::from_env()?)?
///     .on_consumption_error(alert_on_poison_message)
///     .build(Lifecycle::builder(), processor_fn(process_order));
/// ```
pub struct FifoConsumer<T> {
    queue: SharedQueueService,
    invoker: SharedInvoker,
    config: FifoConsumerConfig,
    on_consuming: Vec<SharedExtension<T>>,
    on_consumption_error: Vec<SharedExtension<ConsumptionFailure>>,
}

impl<T> FifoConsumer<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a consumer for the given queue.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is invalid.
    pub fn new(
        queue: SharedQueueService,
        invoker: SharedInvoker,
        config: FifoConsumerConfig,
    ) -> Result<Self, LifecycleError> {
        config.validate()?;
        Ok(Self {
            queue,
            invoker,
            config,
            on_consuming: Vec::new(),
            on_consumption_error: Vec::new(),
        })
    }

    /// Adds an observer run with each decoded payload before it is processed.
    ///
    /// Observer failures are logged and do not affect processing.
    pub fn on_consuming_message<E: Extension<T> + 'static>(mut self, observer: E) -> Self {
        self.on_consuming.push(Arc::new(observer));
        self
    }

    /// Adds an observer run when a message cannot be decoded or processed.
    pub fn on_consumption_error<E: Extension<ConsumptionFailure> + 'static>(
        mut self,
        observer: E,
    ) -> Self {
        self.on_consumption_error.push(Arc::new(observer));
        self
    }

    /// Installs the consumer into a lifecycle and wraps `processor`.
    ///
    /// Registers an initialize extension that opens a processed set for the
    /// invocation, a flush extension that acknowledges it and dispatches the
    /// continuation, and an error extension that discards it. Sets are keyed
    /// by request id, so clones of the handler may serve overlapping
    /// invocations.
    pub fn build<P>(
        self,
        lifecycle: LifecycleBuilder<ConsumerInput, BatchReport>,
        processor: P,
    ) -> LifecycleHandler<ConsumerInput, BatchReport>
    where
        P: MessageProcessor<T> + 'static,
    {
        let state = Arc::new(ConsumerState {
            on_consuming: self.on_consuming,
            on_consumption_error: self.on_consumption_error,
            ..ConsumerState::new(self.queue, self.invoker, self.config)
        });

        lifecycle
            .on_initialize(ResetProcessed {
                state: Arc::clone(&state),
            })
            .on_flush(AcknowledgeAndContinue {
                state: Arc::clone(&state),
            })
            .on_handle_error(DiscardProcessed {
                state: Arc::clone(&state),
            })
            .build()
            .wrap(ConsumerHandler {
                state,
                processor,
                payload: PhantomData,
            })
    }
}

struct ConsumerState<T> {
    queue: SharedQueueService,
    invoker: SharedInvoker,
    config: FifoConsumerConfig,
    /// Processed messages per in-flight invocation, keyed by request id
    processed: Mutex<HashMap<String, ProcessedMessages>>,
    on_consuming: Vec<SharedExtension<T>>,
    on_consumption_error: Vec<SharedExtension<ConsumptionFailure>>,
}

impl<T> ConsumerState<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn new(queue: SharedQueueService, invoker: SharedInvoker, config: FifoConsumerConfig) -> Self {
        Self {
            queue,
            invoker,
            config,
            processed: Mutex::new(HashMap::new()),
            on_consuming: Vec::new(),
            on_consumption_error: Vec::new(),
        }
    }

    fn batches(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProcessedMessages>> {
        self.processed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, request_id: &str) {
        self.batches()
            .insert(request_id.to_string(), ProcessedMessages::new());
    }

    fn record(&self, request_id: &str, message: Message) {
        self.batches()
            .entry(request_id.to_string())
            .or_default()
            .push(message);
    }

    fn processed_ids(&self, request_id: &str) -> Vec<String> {
        self.batches()
            .get(request_id)
            .map(ProcessedMessages::ids)
            .unwrap_or_default()
    }

    fn take_processed(&self, request_id: &str) -> ProcessedMessages {
        self.batches().remove(request_id).unwrap_or_default()
    }

    async fn load(&self, input: &ConsumerInput) -> Result<Vec<Message>, LifecycleError> {
        let max = self.config.max_number_of_messages;
        let messages = self.queue.receive(max).await?;
        if !messages.is_empty() || !input.retry_messages_get {
            return Ok(messages);
        }

        tracing::debug!(
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "Queue empty on continuation, receiving once more"
        );
        tokio::time::sleep(self.config.retry_delay).await;
        self.queue.receive(max).await
    }

    async fn consume<P>(
        &self,
        message: &Message,
        processor: &P,
        context: &InvocationContext,
    ) -> Result<(), LifecycleError>
    where
        P: MessageProcessor<T>,
    {
        let payload: T = match serde_json::from_str(&message.body) {
            Ok(payload) => payload,
            Err(e) => {
                let error = LifecycleError::deserialization(&message.id, e.to_string());
                return Err(self.consumption_failed(error, message, context).await);
            }
        };

        if let Err(error) =
            run_phase("onConsumingMessage", &self.on_consuming, &payload, context).await
        {
            tracing::warn!(message_id = %message.id, error = %error, "Consuming observer failed");
        }

        if let Err(source) = processor.process(payload, context).await {
            let error = LifecycleError::message_processing(&message.id, source);
            return Err(self.consumption_failed(error, message, context).await);
        }

        self.record(&context.request_id, message.clone());
        tracing::debug!(message_id = %message.id, "Message processed");
        Ok(())
    }

    async fn consumption_failed(
        &self,
        error: LifecycleError,
        message: &Message,
        context: &InvocationContext,
    ) -> LifecycleError {
        tracing::error!(message_id = %message.id, error = %error, "Message consumption failed");
        let failure = ConsumptionFailure {
            error,
            message: message.clone(),
        };
        if let Err(observer_error) =
            run_phase("onConsumptionError", &self.on_consumption_error, &failure, context).await
        {
            tracing::warn!(
                message_id = %message.id,
                error = %observer_error,
                "Consumption error observer failed"
            );
        }
        failure.error
    }

    async fn flush(&self, context: &InvocationContext) -> Result<(), LifecycleError> {
        let processed = self.take_processed(&context.request_id);
        if processed.is_empty() {
            tracing::debug!("No processed messages to acknowledge");
            return Ok(());
        }

        let result = self.queue.acknowledge_batch(&processed.ack_entries()).await?;
        if !result.is_complete() {
            tracing::error!(
                failed_ids = ?result.failed_ids,
                acknowledged = processed.len().saturating_sub(result.failed_ids.len()),
                "Batch acknowledgement partially failed"
            );
            return Err(LifecycleError::acknowledgement(result.failed_ids));
        }
        tracing::info!(count = processed.len(), "Acknowledged processed messages");

        self.continue_draining(context).await;
        Ok(())
    }

    async fn continue_draining(&self, context: &InvocationContext) {
        let target = self
            .config
            .continuation_function
            .as_deref()
            .unwrap_or(&context.function_name);

        let payload = match serde_json::to_value(ContinuationPayload::from_context(context)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build continuation payload");
                return;
            }
        };

        match self.invoker.invoke_async(target, payload).await {
            Ok(()) => tracing::info!(function_name = %target, "Continuation dispatched"),
            Err(error) => tracing::error!(
                function_name = %target,
                error = %error,
                "Continuation dispatch failed"
            ),
        }
    }
}

struct ResetProcessed<T> {
    state: Arc<ConsumerState<T>>,
}

#[async_trait]
impl<T> Extension<ConsumerInput> for ResetProcessed<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn run(
        &self,
        _input: &ConsumerInput,
        context: &InvocationContext,
    ) -> Result<(), LifecycleError> {
        self.state.begin(&context.request_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "fifo-consumer-reset"
    }
}

struct AcknowledgeAndContinue<T> {
    state: Arc<ConsumerState<T>>,
}

#[async_trait]
impl<T> Extension<BatchReport> for AcknowledgeAndContinue<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn run(
        &self,
        _report: &BatchReport,
        context: &InvocationContext,
    ) -> Result<(), LifecycleError> {
        self.state.flush(context).await
    }

    fn name(&self) -> &str {
        "fifo-consumer-flush"
    }
}

struct DiscardProcessed<T> {
    state: Arc<ConsumerState<T>>,
}

#[async_trait]
impl<T> Extension<HandlerError<BatchReport>> for DiscardProcessed<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn run(
        &self,
        _error: &HandlerError<BatchReport>,
        context: &InvocationContext,
    ) -> Result<(), LifecycleError> {
        let discarded = self.state.take_processed(&context.request_id);
        if !discarded.is_empty() {
            tracing::debug!(
                count = discarded.len(),
                "Discarded unacknowledged messages of a failed batch"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fifo-consumer-discard"
    }
}

struct ConsumerHandler<T, P> {
    state: Arc<ConsumerState<T>>,
    processor: P,
    payload: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, P> Handler<ConsumerInput, BatchReport> for ConsumerHandler<T, P>
where
    T: DeserializeOwned + Send + Sync + 'static,
    P: MessageProcessor<T>,
{
    async fn call(
        &self,
        input: ConsumerInput,
        context: &InvocationContext,
    ) -> Result<BatchReport, HandlerError<BatchReport>> {
        if let Some(env) = &input.env {
            tracing::info!(
                previous_request_id = %env.request_id,
                previous_log_stream = %env.log_stream_id,
                "Continuing from a previous invocation"
            );
        }

        let messages = self.state.load(&input).await?;
        if messages.is_empty() {
            tracing::debug!("No messages to consume");
            return Ok(BatchReport::empty());
        }

        for message in &messages {
            self.state.consume(message, &self.processor, context).await?;
        }

        Ok(BatchReport {
            received: messages.len(),
            message_ids: self.state.processed_ids(&context.request_id),
        })
    }
}
