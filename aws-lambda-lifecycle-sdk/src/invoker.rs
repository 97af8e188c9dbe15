//! Compute invocation transport.
//!
//! The FIFO consumer hands remaining work to a fresh invocation through the
//! `Invoker` trait. `LambdaInvoker` implements it with an asynchronous
//! (`Event`) AWS Lambda invocation.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;

use crate::error::LifecycleError;

/// Trait for triggering fire-and-forget invocations.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Dispatches an asynchronous invocation of `function_name`.
    ///
    /// Returns once the invocation has been accepted. It does not wait for
    /// the invoked function to run.
    ///
    /// # Arguments
    ///
    /// * `function_name` - Name or ARN of the function to invoke
    /// * `payload` - JSON payload handed to the function
    async fn invoke_async(
        &self,
        function_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), LifecycleError>;
}

/// Type alias for a shared Invoker.
pub type SharedInvoker = Arc<dyn Invoker>;

/// AWS Lambda implementation of [`Invoker`].
#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaInvoker {
    /// Creates a new LambdaInvoker.
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }

    /// Creates a new LambdaInvoker from the default AWS configuration.
    pub async fn from_env() -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(aws_sdk_lambda::Client::new(&aws_config))
    }
}

#[async_trait]
impl Invoker for LambdaInvoker {
    async fn invoke_async(
        &self,
        function_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), LifecycleError> {
        let body = serde_json::to_vec(&payload).map_err(|e| {
            LifecycleError::invoke(function_name, format!("Failed to serialize payload: {}", e))
        })?;

        let output = self
            .client
            .invoke()
            .function_name(function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                LifecycleError::invoke(function_name, DisplayErrorContext(&e).to_string())
            })?;

        // Event invocations are accepted with 202.
        if output.status_code() != 202 {
            return Err(LifecycleError::invoke(
                function_name,
                format!("Unexpected status code {}", output.status_code()),
            ));
        }

        tracing::debug!(function_name = %function_name, "Dispatched asynchronous invocation");
        Ok(())
    }
}

/// A mock implementation of Invoker for testing.
#[cfg(test)]
pub struct MockInvoker {
    calls: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
    responses: std::sync::Mutex<Vec<Result<(), LifecycleError>>>,
}

#[cfg(test)]
impl MockInvoker {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            responses: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: Result<(), LifecycleError>) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    pub fn get_calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke_async(
        &self,
        function_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), LifecycleError> {
        self.calls
            .lock()
            .unwrap()
            .push((function_name.to_string(), payload));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(())
        } else {
            responses.remove(0)
        }
    }
}
