//! Expected Failure Example
//!
//! A business rejection completes the invocation with a response instead of
//! failing it. Anything else fails the invocation.

use aws_lambda_lifecycle_sdk_examples::*;
use lambda_runtime::{service_fn, LambdaEvent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub account_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResponse {
    pub account_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Accepts positive transfers and rejects the rest with a response.
pub async fn transfer(
    request: TransferRequest,
    ctx: InvocationContext,
) -> Result<TransferResponse, HandlerError<TransferResponse>> {
    if request.amount_cents <= 0 {
        return Err(HandlerError::expected(
            "non-positive amount",
            TransferResponse {
                account_id: request.account_id,
                status: "rejected".to_string(),
                reason: Some("amount must be positive".to_string()),
            },
        ));
    }

    tracing::info!(
        account_id = %request.account_id,
        amount_cents = request.amount_cents,
        remaining_ms = ?ctx.remaining_time_millis(),
        "Transfer accepted"
    );
    Ok(TransferResponse {
        account_id: request.account_id,
        status: "accepted".to_string(),
        reason: None,
    })
}

fn audit_rejections() -> impl Extension<HandlerError<TransferResponse>> {
    extension_fn(|error: &HandlerError<TransferResponse>, ctx| {
        let expected = error.is_expected();
        let request_id = ctx.request_id.clone();
        Box::pin(async move {
            tracing::info!(request_id = %request_id, expected, "Transfer not completed");
            Ok(())
        })
    })
    .named("audit-rejections")
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    init_tracing();

    let handler = Lifecycle::builder()
        .with_config(LifecycleConfig::from_env()?)
        .on_handle_error(audit_rejections())
        .build()
        .wrap(handler_fn(transfer));
    handler.subscribe(log_event).forget();

    lambda_runtime::run(service_fn(move |event: LambdaEvent<TransferRequest>| {
        let handler = handler.clone();
        async move { handler.handle(event).await }
    }))
    .await
}
