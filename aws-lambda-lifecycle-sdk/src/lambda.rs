//! Lambda integration types for the AWS Lambda Lifecycle SDK.
//!
//! This module defines the invocation input and continuation payload of the
//! FIFO consumer, and the glue that lets a [`LifecycleHandler`] be served by
//! `lambda_runtime`.

use lambda_runtime::LambdaEvent;
use serde::{Deserialize, Serialize};

use crate::context::InvocationContext;
use crate::error::ErrorObject;
use crate::lifecycle::LifecycleHandler;

/// Input of a FIFO consumer invocation.
///
/// Scheduled or manual triggers usually send `{}`; continuations send a
/// [`ContinuationPayload`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInput {
    /// Set by continuations: retry the receive once if it comes back empty
    #[serde(default)]
    pub retry_messages_get: bool,

    /// Identity of the invocation that sent the continuation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<ContinuationEnv>,
}

impl ConsumerInput {
    /// Returns true if this invocation was triggered by a continuation.
    pub fn is_continuation(&self) -> bool {
        self.env.is_some()
    }
}

/// Invocation identity carried by a continuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationEnv {
    /// Request id of the sending invocation
    pub request_id: String,
    /// Function name of the sending invocation
    pub function_name: String,
    /// Log group of the sending invocation
    pub log_group_id: String,
    /// Log stream of the sending invocation
    pub log_stream_id: String,
}

impl From<&InvocationContext> for ContinuationEnv {
    fn from(context: &InvocationContext) -> Self {
        Self {
            request_id: context.request_id.clone(),
            function_name: context.function_name.clone(),
            log_group_id: context.log_group.clone(),
            log_stream_id: context.log_stream.clone(),
        }
    }
}

/// Payload sent to the next invocation when handing off remaining work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationPayload {
    /// Identity of the sending invocation
    pub env: ContinuationEnv,
    /// Always true for continuations
    pub retry_messages_get: bool,
}

impl ContinuationPayload {
    /// Builds the continuation payload for the given invocation.
    pub fn from_context(context: &InvocationContext) -> Self {
        Self {
            env: ContinuationEnv::from(context),
            retry_messages_get: true,
        }
    }
}

impl<I, O> LifecycleHandler<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Serves one Lambda event.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handler = consumer.build(Lifecycle::builder(), processor_fn(process));
    /// lambda_runtime::run(service_fn(|event| {
    ///     let handler = handler.clone();
    ///     async move { handler.handle(event).await }
    /// }))
    /// .await
    /// ```
    pub async fn handle(&self, event: LambdaEvent<I>) -> Result<O, lambda_runtime::Error> {
        let context = InvocationContext::from(&event.context);
        self.invoke(event.payload, &context).await.map_err(|error| {
            let object = ErrorObject::from(&error);
            tracing::error!(
                error_type = %object.error_type,
                error_message = %object.error_message,
                "Returning invocation error to the Lambda runtime"
            );
            lambda_runtime::Error::from(error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{handler_fn, Lifecycle};
    use crate::outcome::HandlerError;
    use serde_json::json;

    #[test]
    fn test_consumer_input_defaults() {
        let input: ConsumerInput = serde_json::from_str("{}").unwrap();
        assert!(!input.retry_messages_get);
        assert!(!input.is_continuation());
    }

    #[test]
    fn test_consumer_input_from_continuation() {
        let input: ConsumerInput = serde_json::from_value(json!({
            "env": {
                "requestId": "req-1",
                "functionName": "consumer",
                "logGroupId": "/aws/lambda/consumer",
                "logStreamId": "stream-1"
            },
            "retryMessagesGet": true
        }))
        .unwrap();
        assert!(input.retry_messages_get);
        assert!(input.is_continuation());
        assert_eq!(input.env.unwrap().request_id, "req-1");
    }

    #[test]
    fn test_continuation_payload_wire_format() {
        let context = InvocationContext::new("consumer", "req-9")
            .with_log_group("/aws/lambda/consumer")
            .with_log_stream("stream-9");
        let payload = serde_json::to_value(ContinuationPayload::from_context(&context)).unwrap();
        assert_eq!(
            payload,
            json!({
                "env": {
                    "requestId": "req-9",
                    "functionName": "consumer",
                    "logGroupId": "/aws/lambda/consumer",
                    "logStreamId": "stream-9"
                },
                "retryMessagesGet": true
            })
        );
    }

    #[tokio::test]
    async fn test_handle_maps_lambda_event() {
        let handler = Lifecycle::builder().build().wrap(handler_fn(
            |input: u32, ctx: InvocationContext| async move {
                if ctx.request_id != "req-7" {
                    return Err(HandlerError::unexpected("wrong request id"));
                }
                Ok(input + 1)
            },
        ));
        let mut lambda_ctx = lambda_runtime::Context::default();
        lambda_ctx.request_id = "req-7".to_string();

        let output = handler.handle(LambdaEvent::new(1, lambda_ctx)).await.unwrap();
        assert_eq!(output, 2);
    }

    #[tokio::test]
    async fn test_handle_converts_unexpected_failure() {
        let handler = Lifecycle::builder().build().wrap(handler_fn(
            |_input: u32, _ctx| async { Err::<u32, _>(HandlerError::unexpected("boom")) },
        ));
        let err = handler
            .handle(LambdaEvent::new(1, lambda_runtime::Context::default()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Handler error: boom");
    }
}
