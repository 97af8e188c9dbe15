//! Queue transport.
//!
//! This module defines the `QueueService` trait used by the FIFO consumer
//! and an Amazon SQS implementation of it.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, MessageSystemAttributeName};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// A message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message id
    pub id: String,
    /// Raw message body
    pub body: String,
    /// Token required to acknowledge this particular receipt
    pub receipt_token: String,
    /// FIFO message group, when the queue reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Message {
    /// Creates a new Message.
    pub fn new(
        id: impl Into<String>,
        body: impl Into<String>,
        receipt_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            receipt_token: receipt_token.into(),
            group_id: None,
        }
    }

    /// Sets the message group id.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Returns the entry acknowledging this message.
    pub fn ack_entry(&self) -> AckEntry {
        AckEntry {
            id: self.id.clone(),
            receipt_token: self.receipt_token.clone(),
        }
    }
}

/// One entry of a batch acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckEntry {
    /// The message id
    pub id: String,
    /// The receipt token of the message
    pub receipt_token: String,
}

/// Result of a batch acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResult {
    /// Ids of the entries the queue failed to acknowledge
    #[serde(default)]
    pub failed_ids: Vec<String>,
}

impl AckResult {
    /// Creates a result where every entry was acknowledged.
    pub fn all_acknowledged() -> Self {
        Self::default()
    }

    /// Returns true if every entry was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

/// Trait for receiving and acknowledging queue messages.
///
/// This trait abstracts the queue, allowing for different implementations
/// (e.g., SQS, an in-memory queue for testing).
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Receives up to `max_number_of_messages` messages, in queue order.
    ///
    /// # Arguments
    ///
    /// * `max_number_of_messages` - Upper bound of the batch size
    ///
    /// # Returns
    ///
    /// The received messages. An empty queue yields an empty vector.
    async fn receive(&self, max_number_of_messages: i32) -> Result<Vec<Message>, LifecycleError>;

    /// Acknowledges (deletes) a batch of messages in a single request.
    ///
    /// # Arguments
    ///
    /// * `entries` - The messages to acknowledge
    ///
    /// # Returns
    ///
    /// The ids of the entries the queue could not acknowledge.
    async fn acknowledge_batch(&self, entries: &[AckEntry]) -> Result<AckResult, LifecycleError>;
}

/// Type alias for a shared QueueService.
pub type SharedQueueService = Arc<dyn QueueService>;

/// Amazon SQS implementation of [`QueueService`].
#[derive(Debug, Clone)]
pub struct SqsQueueService {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueueService {
    /// Creates a new SqsQueueService for the given queue.
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Creates a new SqsQueueService from the default AWS configuration.
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(aws_sdk_sqs::Client::new(&aws_config), queue_url)
    }

    /// Returns the queue URL.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

fn queue_error<E, R>(operation: &str, error: SdkError<E, R>) -> LifecycleError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let is_retriable = matches!(
        error,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    );
    LifecycleError::Queue {
        message: format!("{} failed: {}", operation, DisplayErrorContext(&error)),
        is_retriable,
    }
}

#[async_trait]
impl QueueService for SqsQueueService {
    async fn receive(&self, max_number_of_messages: i32) -> Result<Vec<Message>, LifecycleError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_number_of_messages)
            .message_system_attribute_names(MessageSystemAttributeName::MessageGroupId)
            .send()
            .await
            .map_err(|e| queue_error("ReceiveMessage", e))?;

        let mut messages = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let (Some(id), Some(receipt_token)) = (message.message_id, message.receipt_handle)
            else {
                tracing::warn!("Skipping SQS message without id or receipt handle");
                continue;
            };
            let group_id = message
                .attributes
                .and_then(|mut attrs| attrs.remove(&MessageSystemAttributeName::MessageGroupId));
            messages.push(Message {
                id,
                body: message.body.unwrap_or_default(),
                receipt_token,
                group_id,
            });
        }

        tracing::debug!(
            queue_url = %self.queue_url,
            count = messages.len(),
            "Received messages"
        );
        Ok(messages)
    }

    async fn acknowledge_batch(&self, entries: &[AckEntry]) -> Result<AckResult, LifecycleError> {
        if entries.is_empty() {
            return Ok(AckResult::all_acknowledged());
        }

        let request_entries = entries
            .iter()
            .map(|entry| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(&entry.id)
                    .receipt_handle(&entry.receipt_token)
                    .build()
                    .map_err(|e| {
                        LifecycleError::validation(format!(
                            "Invalid acknowledgement entry {}: {}",
                            entry.id, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(request_entries))
            .send()
            .await
            .map_err(|e| queue_error("DeleteMessageBatch", e))?;

        let failed_ids: Vec<String> = output
            .failed()
            .iter()
            .map(|failure| {
                tracing::warn!(
                    message_id = failure.id(),
                    code = failure.code(),
                    reason = failure.message().unwrap_or_default(),
                    "SQS failed to delete message"
                );
                failure.id().to_string()
            })
            .collect();

        Ok(AckResult { failed_ids })
    }
}

/// A mock implementation of QueueService for testing.
#[cfg(test)]
pub struct MockQueueService {
    receive_responses: std::sync::Mutex<Vec<Result<Vec<Message>, LifecycleError>>>,
    ack_responses: std::sync::Mutex<Vec<Result<AckResult, LifecycleError>>>,
    receive_calls: std::sync::Mutex<Vec<(i32, tokio::time::Instant)>>,
    ack_calls: std::sync::Mutex<Vec<Vec<AckEntry>>>,
}

#[cfg(test)]
impl MockQueueService {
    pub fn new() -> Self {
        Self {
            receive_responses: std::sync::Mutex::new(Vec::new()),
            ack_responses: std::sync::Mutex::new(Vec::new()),
            receive_calls: std::sync::Mutex::new(Vec::new()),
            ack_calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_receive_response(self, response: Result<Vec<Message>, LifecycleError>) -> Self {
        self.receive_responses.lock().unwrap().push(response);
        self
    }

    pub fn with_ack_response(self, response: Result<AckResult, LifecycleError>) -> Self {
        self.ack_responses.lock().unwrap().push(response);
        self
    }

    /// Returns the requested batch size and time of every receive call.
    pub fn get_receive_calls(&self) -> Vec<(i32, tokio::time::Instant)> {
        self.receive_calls.lock().unwrap().clone()
    }

    /// Returns the entries of every acknowledgement call.
    pub fn get_ack_calls(&self) -> Vec<Vec<AckEntry>> {
        self.ack_calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl QueueService for MockQueueService {
    async fn receive(&self, max_number_of_messages: i32) -> Result<Vec<Message>, LifecycleError> {
        self.receive_calls
            .lock()
            .unwrap()
            .push((max_number_of_messages, tokio::time::Instant::now()));
        let mut responses = self.receive_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            responses.remove(0)
        }
    }

    async fn acknowledge_batch(&self, entries: &[AckEntry]) -> Result<AckResult, LifecycleError> {
        self.ack_calls.lock().unwrap().push(entries.to_vec());
        let mut responses = self.ack_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(AckResult::all_acknowledged())
        } else {
            responses.remove(0)
        }
    }
}
