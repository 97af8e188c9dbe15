//! FIFO Consumer Example
//!
//! Drains an SQS FIFO queue of shipment events one batch per invocation.
//! Each successful batch is acknowledged and the function re-invokes itself
//! to continue with the next one.
//!
//! Environment:
//!
//! - `QUEUE_URL`: URL of the FIFO queue (required)
//! - `FIFO_MAX_NUMBER_OF_MESSAGES`, `FIFO_RETRY_DELAY_MS`,
//!   `FIFO_CONTINUATION_FUNCTION`, `LIFECYCLE_SAFETY_MARGIN_MS`: optional tuning

use std::sync::Arc;

use aws_lambda_lifecycle_sdk_examples::*;
use lambda_runtime::{service_fn, LambdaEvent};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEvent {
    pub shipment_id: String,
    pub status: String,
}

/// Applies one shipment status change.
///
/// Must be idempotent: a failed batch is redelivered from its first message.
pub async fn apply_shipment_event(
    event: ShipmentEvent,
    ctx: InvocationContext,
) -> Result<(), BoxError> {
    if event.shipment_id.is_empty() {
        return Err("shipment event without id".into());
    }
    tracing::info!(
        shipment_id = %event.shipment_id,
        status = %event.status,
        request_id = %ctx.request_id,
        "Shipment status applied"
    );
    Ok(())
}

fn report_poison_messages() -> impl Extension<ConsumptionFailure> {
    extension_fn(|failure: &ConsumptionFailure, _ctx| {
        tracing::error!(
            message_id = %failure.message.id,
            group_id = ?failure.message.group_id,
            error = %failure.error,
            "Shipment event blocks its message group"
        );
        Box::pin(async { Ok(()) })
    })
    .named("report-poison-messages")
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    init_tracing();

    let queue_url = std::env::var("QUEUE_URL").map_err(|_| "QUEUE_URL is not set")?;
    let queue = Arc::new(SqsQueueService::from_env(queue_url).await);
    let invoker = Arc::new(LambdaInvoker::from_env().await);

    let lifecycle = Lifecycle::builder().with_config(LifecycleConfig::from_env()?);
    let config = FifoConsumerConfig::from_env()?;
    let handler = FifoConsumer::<ShipmentEvent>::new(queue, invoker, config)?
        .on_consumption_error(report_poison_messages())
        .build(lifecycle, processor_fn(apply_shipment_event));
    handler.subscribe(log_event).forget();

    lambda_runtime::run(service_fn(move |event: LambdaEvent<ConsumerInput>| {
        let handler = handler.clone();
        async move { handler.handle(event).await }
    }))
    .await
}
