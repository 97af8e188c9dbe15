//! Per-invocation identity and deadline metadata.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Immutable record describing the current invocation.
///
/// The deadline is measured on the tokio clock, so `remaining_time()` keeps
/// counting down while the invocation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Name of the function being invoked
    pub function_name: String,
    /// The runtime's request id for this invocation
    pub request_id: String,
    /// Log group the invocation writes to
    pub log_group: String,
    /// Log stream the invocation writes to
    pub log_stream: String,
    deadline: Option<Instant>,
}

impl InvocationContext {
    /// Creates a context without a deadline.
    pub fn new(function_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            request_id: request_id.into(),
            log_group: String::new(),
            log_stream: String::new(),
            deadline: None,
        }
    }

    /// Sets the log group.
    pub fn with_log_group(mut self, log_group: impl Into<String>) -> Self {
        self.log_group = log_group.into();
        self
    }

    /// Sets the log stream.
    pub fn with_log_stream(mut self, log_stream: impl Into<String>) -> Self {
        self.log_stream = log_stream.into();
        self
    }

    /// Sets the deadline to `remaining` from now.
    pub fn with_remaining_time(mut self, remaining: Duration) -> Self {
        self.deadline = Some(Instant::now() + remaining);
        self
    }

    /// Returns the time left before the invocation's deadline.
    ///
    /// `None` when no deadline is known. Saturates at zero once the deadline
    /// has passed.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the time left in whole milliseconds.
    pub fn remaining_time_millis(&self) -> Option<u64> {
        self.remaining_time()
            .map(|remaining| u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<lambda_runtime::Context> for InvocationContext {
    fn from(ctx: lambda_runtime::Context) -> Self {
        Self::from(&ctx)
    }
}

impl From<&lambda_runtime::Context> for InvocationContext {
    fn from(ctx: &lambda_runtime::Context) -> Self {
        // The runtime reports the deadline as epoch milliseconds; 0 means unknown.
        let deadline = (ctx.deadline > 0).then(|| {
            let at = UNIX_EPOCH + Duration::from_millis(ctx.deadline);
            let remaining = at
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO);
            Instant::now() + remaining
        });

        Self {
            function_name: ctx.env_config.function_name.clone(),
            request_id: ctx.request_id.clone(),
            log_group: ctx.env_config.log_group.clone(),
            log_stream: ctx.env_config.log_stream.clone(),
            deadline,
        }
    }
}
