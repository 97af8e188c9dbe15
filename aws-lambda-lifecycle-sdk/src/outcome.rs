//! Classification of handler results.
//!
//! A handler either succeeds, fails in an *expected* way by returning
//! [`HandlerError::Expected`] together with the response the invocation
//! should complete with, or fails unexpectedly. Only the unexpected case
//! surfaces as an invocation failure.

use thiserror::Error;

use crate::error::{BoxError, LifecycleError};

/// Error returned at the handler boundary.
///
/// # Examples
///
/// ```rust,ignore
/// async fn handler(input: Order, _ctx: &InvocationContext) -> Result<Receipt, HandlerError<Receipt>> {
///     if input.items.is_empty() {
///         return Err(HandlerError::expected("empty order", Receipt::rejected()));
///     }
///     Ok(Receipt::accepted(&input))
/// }
/// ```
#[derive(Debug, Error)]
pub enum HandlerError<O> {
    /// An anticipated failure that should complete the invocation with `response`.
    #[error("{message}")]
    Expected {
        /// Description of the failure
        message: String,
        /// The response the invocation completes with
        response: O,
    },

    /// Any other failure. It propagates as the invocation's error.
    #[error(transparent)]
    Unexpected(#[from] LifecycleError),
}

impl<O> HandlerError<O> {
    /// Creates an expected failure carrying the intended response.
    pub fn expected(message: impl Into<String>, response: O) -> Self {
        Self::Expected {
            message: message.into(),
            response,
        }
    }

    /// Creates an unexpected handler failure from a message.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(LifecycleError::handler(message))
    }

    /// Returns true if this failure carries an intended response.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Expected { .. })
    }

    /// Returns the intended response of an expected failure.
    pub fn response(&self) -> Option<&O> {
        match self {
            Self::Expected { response, .. } => Some(response),
            Self::Unexpected(_) => None,
        }
    }
}

impl<O> From<BoxError> for HandlerError<O> {
    fn from(error: BoxError) -> Self {
        Self::Unexpected(LifecycleError::from(error))
    }
}

impl<O> From<serde_json::Error> for HandlerError<O> {
    fn from(error: serde_json::Error) -> Self {
        Self::Unexpected(LifecycleError::from(error))
    }
}

/// The classified result of one invocation.
#[derive(Debug)]
pub enum Outcome<O> {
    /// The handler returned a value.
    Success(O),
    /// The handler failed with an expected error and an intended response.
    ExpectedFailure {
        /// The intended response
        response: O,
        /// Description of the failure
        message: String,
    },
    /// The handler failed unexpectedly.
    UnexpectedFailure(LifecycleError),
}

impl<O> Outcome<O> {
    /// Classifies a handler result.
    pub fn classify(result: Result<O, HandlerError<O>>) -> Self {
        match result {
            Ok(output) => Self::Success(output),
            Err(HandlerError::Expected { message, response }) => {
                Self::ExpectedFailure { response, message }
            }
            Err(HandlerError::Unexpected(error)) => Self::UnexpectedFailure(error),
        }
    }

    /// Returns true unless the outcome is an unexpected failure.
    pub fn is_success_shaped(&self) -> bool {
        !matches!(self, Self::UnexpectedFailure(_))
    }

    /// Converts the outcome into the invocation's completion.
    ///
    /// Expected failures complete successfully with their response.
    pub fn into_completion(self) -> Result<O, LifecycleError> {
        match self {
            Self::Success(output) => Ok(output),
            Self::ExpectedFailure { response, .. } => Ok(response),
            Self::UnexpectedFailure(error) => Err(error),
        }
    }
}
