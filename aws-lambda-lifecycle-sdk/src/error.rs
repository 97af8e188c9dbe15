//! Error types for the AWS Lambda Lifecycle SDK.
//!
//! This module defines the error hierarchy shared by the lifecycle
//! orchestrator, its extensions, the FIFO consumer and the queue and
//! invoker transports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error type returned by user-provided handlers and processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for the AWS Lambda Lifecycle SDK.
///
/// Every failure that leaves the orchestrator as an unexpected failure is
/// one of these variants.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Unexpected failure raised by the wrapped handler.
    #[error("Handler error: {message}")]
    Handler {
        /// Error message describing what went wrong
        message: String,
        /// The underlying user error, if one was supplied
        #[source]
        source: Option<BoxError>,
    },

    /// An extension registered for a lifecycle phase failed.
    #[error("Extension error in {phase} phase: {message}")]
    Extension {
        /// Name of the phase the extension was registered for
        phase: String,
        /// Error message from the extension
        message: String,
    },

    /// The message processor rejected a queue message.
    #[error("Failed to process message {message_id}: {source}")]
    MessageProcessing {
        /// Id of the message that failed
        message_id: String,
        /// The processor's error
        #[source]
        source: BoxError,
    },

    /// A message body or payload could not be (de)serialized.
    #[error("Deserialization error: {message}")]
    Deserialization {
        /// Id of the offending message, when the failure concerns a message
        message_id: Option<String>,
        /// Error message describing the failure
        message: String,
    },

    /// The queue service failed to receive or acknowledge messages.
    #[error("Queue error: {message}")]
    Queue {
        /// Error message describing what went wrong
        message: String,
        /// Whether retrying the call may succeed
        is_retriable: bool,
    },

    /// The batch acknowledgement reported per-message failures.
    #[error("Failed to acknowledge {} message(s): {}", failed_ids.len(), failed_ids.join(", "))]
    Acknowledgement {
        /// Ids of the messages the queue did not acknowledge
        failed_ids: Vec<String>,
    },

    /// The asynchronous invocation of a function could not be dispatched.
    #[error("Failed to invoke {function_name}: {message}")]
    Invoke {
        /// The function that was targeted
        function_name: String,
        /// Error message describing the failure
        message: String,
    },

    /// Validation error for invalid configuration or arguments.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure
        message: String,
    },
}

impl LifecycleError {
    /// Creates a new Handler error without an underlying source.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new Extension error for the given phase.
    pub fn extension(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extension {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Creates a new MessageProcessing error.
    pub fn message_processing(message_id: impl Into<String>, source: BoxError) -> Self {
        Self::MessageProcessing {
            message_id: message_id.into(),
            source,
        }
    }

    /// Creates a new Deserialization error for a specific message.
    pub fn deserialization(message_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deserialization {
            message_id: Some(message_id.into()),
            message: message.into(),
        }
    }

    /// Creates a new retriable Queue error.
    pub fn queue_retriable(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            is_retriable: true,
        }
    }

    /// Creates a new non-retriable Queue error.
    pub fn queue_non_retriable(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            is_retriable: false,
        }
    }

    /// Creates a new Acknowledgement error carrying the failed message ids.
    pub fn acknowledgement(failed_ids: Vec<String>) -> Self {
        Self::Acknowledgement { failed_ids }
    }

    /// Creates a new Invoke error.
    pub fn invoke(function_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invoke {
            function_name: function_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns true if this is a Queue error that is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Queue { is_retriable: true, .. })
    }

    /// Returns true if the batch acknowledgement partially failed.
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, Self::Acknowledgement { .. })
    }

    /// Returns true if a queue message could not be processed or decoded.
    pub fn is_consumption_failure(&self) -> bool {
        matches!(
            self,
            Self::MessageProcessing { .. }
                | Self::Deserialization {
                    message_id: Some(_),
                    ..
                }
        )
    }

    /// Returns the message ids the queue failed to acknowledge, if any.
    pub fn failed_ids(&self) -> &[String] {
        match self {
            Self::Acknowledgement { failed_ids } => failed_ids,
            _ => &[],
        }
    }

    /// Returns the stable error type name reported to the Lambda runtime.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Handler { .. } => "HandlerError",
            Self::Extension { .. } => "ExtensionError",
            Self::MessageProcessing { .. } => "MessageProcessingError",
            Self::Deserialization { .. } => "DeserializationError",
            Self::Queue { .. } => "QueueError",
            Self::Acknowledgement { .. } => "AcknowledgementError",
            Self::Invoke { .. } => "InvokeError",
            Self::Validation { .. } => "ValidationError",
        }
    }
}

/// Error object for serialization in Lambda responses and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error type/name
    #[serde(rename = "errorType")]
    pub error_type: String,
    /// The error message
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

impl ErrorObject {
    /// Creates a new ErrorObject.
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }
}

impl From<&LifecycleError> for ErrorObject {
    fn from(error: &LifecycleError) -> Self {
        ErrorObject::new(error.error_type(), error.to_string())
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(error: serde_json::Error) -> Self {
        Self::Deserialization {
            message_id: None,
            message: error.to_string(),
        }
    }
}

impl From<BoxError> for LifecycleError {
    fn from(error: BoxError) -> Self {
        Self::Handler {
            message: error.to_string(),
            source: Some(error),
        }
    }
}
