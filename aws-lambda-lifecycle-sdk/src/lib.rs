//! # AWS Lambda Lifecycle SDK
//!
//! Invocation lifecycle orchestration for Lambda handlers, and a FIFO queue
//! consumer that drains its queue one batch per invocation by re-invoking
//! its own function.
//!
//! ## Overview
//!
//! ### Lifecycle
//!
//! A [`Lifecycle`] wraps a business handler and runs every invocation through
//! a fixed sequence of extension phases:
//!
//! - **initialize**: runs with the input before the handler
//! - **persist**: runs with the output of a successful handler
//! - **flush**: runs with the output after persist
//! - **handleError**: runs with the failure when anything above fails
//!
//! Extensions registered for the same phase run concurrently and the phase
//! fails with the first extension error. A deadline watchdog emits a
//! `timeOut` event shortly before the Lambda deadline, so telemetry can be
//! flushed before the runtime freezes the process.
//!
//! Handlers may fail in two ways. An *expected* failure ([`HandlerError::Expected`])
//! carries a response that is returned to the caller, and still goes through
//! persist and flush. An *unexpected* failure goes through handleError and is
//! returned as an error.
//!
//! ```rust,ignore
//! use aws_lambda_lifecycle_sdk::{handler_fn, Lifecycle, HandlerError};
//!
//! let handler = Lifecycle::builder()
//!     .on_initialize(load_tenant)
//!     .on_flush(flush_metrics)
//!     .on_handle_error(report_error)
//!     .build()
//!     .wrap(handler_fn(|order: Order, ctx| async move {
//!         if order.items.is_empty() {
//!             return Err(HandlerError::expected("empty order", Receipt::rejected()));
//!         }
//!         Ok(Receipt::accepted(&order))
//!     }));
//!
//! lambda_runtime::run(service_fn(|event| handler.handle(event))).await?;
//! ```
//!
//! ### FIFO Consumer
//!
//! A [`FifoConsumer`] builds a lifecycle handler that receives a bounded
//! batch from an SQS FIFO queue, processes it strictly in order, and on
//! success acknowledges every processed message in one batch request and
//! asynchronously invokes the function again to keep draining.
//!
//! ```rust,ignore
//! use aws_lambda_lifecycle_sdk::{
//!     processor_fn, FifoConsumer, FifoConsumerConfig, LambdaInvoker, Lifecycle, SqsQueueService,
//! };
//!
//! let queue = Arc::new(SqsQueueService::from_env(queue_url).await);
//! let invoker = Arc::new(LambdaInvoker::from_env().await);
//!
//! let handler = FifoConsumer::<Order>::new(queue, invoker, FifoConsumerConfig::from_env()?)?
//!     .build(Lifecycle::builder(), processor_fn(|order: Order, _ctx| async move {
//!         ship(order).await
//!     }));
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`LifecycleError`]:
//!
//! - **Handler**: Unexpected handler failure
//! - **Extension**: Extension failure in a named phase
//! - **MessageProcessing**: Processor failure for a queue message
//! - **Deserialization**: Undecodable input or message body
//! - **Queue**: Queue service failure (retriable or non-retriable)
//! - **Acknowledgement**: Some processed messages could not be acknowledged
//! - **Invoke**: Asynchronous invocation failure
//! - **Validation**: Invalid configuration
//!
//! ## Logging
//!
//! The SDK logs through `tracing`. Every invocation runs inside an
//! `invocation` span carrying the function name and request id. Attach
//! [`log_event`] to a handler to log each lifecycle event.
//!
//! ## Module Organization
//!
//! - [`config`]: Lifecycle and consumer configuration
//! - [`consumer`]: FIFO continuation consumer
//! - [`context`]: Invocation context
//! - [`error`]: Error types
//! - [`events`]: Lifecycle events and listeners
//! - [`extension`]: Phase extensions
//! - [`invoker`]: Asynchronous function invocation
//! - [`lambda`]: Lambda runtime integration and continuation payloads
//! - [`lifecycle`]: Invocation orchestrator
//! - [`outcome`]: Handler outcome classification
//! - [`queue`]: Queue service abstraction
//! - [`watchdog`]: Deadline watchdog

pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod events;
pub mod extension;
pub mod invoker;
pub mod lambda;
pub mod lifecycle;
pub mod outcome;
pub mod queue;
pub mod watchdog;

// Re-export main types at crate root
pub use config::{FifoConsumerConfig, LifecycleConfig};
pub use consumer::{
    processor_fn, BatchReport, ConsumptionFailure, FifoConsumer, MessageProcessor,
    ProcessedMessages, ProcessorFn,
};
pub use context::InvocationContext;
pub use error::{BoxError, ErrorObject, LifecycleError};
pub use events::{log_event, EventEmitter, EventKind, LifecycleEvent, Subscription};
pub use extension::{extension_fn, Extension, ExtensionFn, Phase, SharedExtension};
pub use invoker::{Invoker, LambdaInvoker, SharedInvoker};
pub use lambda::{ConsumerInput, ContinuationEnv, ContinuationPayload};
pub use lifecycle::{handler_fn, Handler, HandlerFn, Lifecycle, LifecycleBuilder, LifecycleHandler};
pub use outcome::{HandlerError, Outcome};
pub use queue::{AckEntry, AckResult, Message, QueueService, SharedQueueService, SqsQueueService};
pub use watchdog::{DeadlineWatchdog, WatchdogGuard};
