//! Configuration types for the lifecycle orchestrator and the FIFO consumer.
//!
//! Both structs follow the same shape: a `Default` impl carrying the
//! documented defaults, builder-style `with_*` setters, a `validate()`
//! check and a `from_env()` constructor for use inside a Lambda function.

use std::time::Duration;

use crate::error::LifecycleError;

/// Environment variable overriding [`LifecycleConfig::safety_margin`] (milliseconds).
pub const SAFETY_MARGIN_ENV: &str = "LIFECYCLE_SAFETY_MARGIN_MS";

/// Environment variable overriding [`FifoConsumerConfig::max_number_of_messages`].
pub const MAX_NUMBER_OF_MESSAGES_ENV: &str = "FIFO_MAX_NUMBER_OF_MESSAGES";

/// Environment variable overriding [`FifoConsumerConfig::retry_delay`] (milliseconds).
pub const RETRY_DELAY_ENV: &str = "FIFO_RETRY_DELAY_MS";

/// Environment variable overriding [`FifoConsumerConfig::continuation_function`].
pub const CONTINUATION_FUNCTION_ENV: &str = "FIFO_CONTINUATION_FUNCTION";

/// Default margin kept between the watchdog's timeout and the hard deadline.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_millis(500);

/// Default number of messages received per invocation.
pub const DEFAULT_MAX_NUMBER_OF_MESSAGES: i32 = 10;

/// Default pause before the second receive of a continuation invocation.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Upper bound of a single receive and of a single batch acknowledgement.
pub const MAX_BATCH_SIZE: i32 = 10;

/// Configuration of the lifecycle orchestrator.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
/// use aws_lambda_lifecycle_sdk::LifecycleConfig;
///
/// let config = LifecycleConfig::default().with_safety_margin(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Time subtracted from the remaining invocation time to get the watchdog deadline.
    pub safety_margin: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

impl LifecycleConfig {
    /// Sets the watchdog safety margin.
    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, LifecycleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LifecycleError> {
        let mut config = Self::default();
        if let Some(millis) = parse_var::<u64>(&lookup, SAFETY_MARGIN_ENV)? {
            config.safety_margin = Duration::from_millis(millis);
        }
        Ok(config)
    }
}

/// Configuration of the FIFO continuation consumer.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
/// use aws_lambda_lifecycle_sdk::FifoConsumerConfig;
///
/// let config = FifoConsumerConfig::default()
///     .with_max_number_of_messages(5)
///     .with_retry_delay(Duration::from_millis(250))
///     .with_continuation_function("orders-drainer");
/// config.validate()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoConsumerConfig {
    /// Maximum number of messages received per invocation (1..=10).
    pub max_number_of_messages: i32,
    /// Pause before receiving again when a continuation finds the queue empty.
    pub retry_delay: Duration,
    /// Function targeted by continuations. Defaults to the invoked function.
    pub continuation_function: Option<String>,
}

impl Default for FifoConsumerConfig {
    fn default() -> Self {
        Self {
            max_number_of_messages: DEFAULT_MAX_NUMBER_OF_MESSAGES,
            retry_delay: DEFAULT_RETRY_DELAY,
            continuation_function: None,
        }
    }
}

impl FifoConsumerConfig {
    /// Sets the maximum number of messages received per invocation.
    pub fn with_max_number_of_messages(mut self, max_number_of_messages: i32) -> Self {
        self.max_number_of_messages = max_number_of_messages;
        self
    }

    /// Sets the pause before the second receive.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets the function that continuations are sent to.
    pub fn with_continuation_function(mut self, function_name: impl Into<String>) -> Self {
        self.continuation_function = Some(function_name.into());
        self
    }

    /// Checks the configuration against the queue's batch limits.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.max_number_of_messages) {
            return Err(LifecycleError::validation(format!(
                "max_number_of_messages must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.max_number_of_messages
            )));
        }
        if matches!(&self.continuation_function, Some(name) if name.trim().is_empty()) {
            return Err(LifecycleError::validation(
                "continuation_function must not be empty",
            ));
        }
        Ok(())
    }

    /// Reads and validates the configuration from the process environment.
    pub fn from_env() -> Result<Self, LifecycleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LifecycleError> {
        let mut config = Self::default();
        if let Some(max) = parse_var::<i32>(&lookup, MAX_NUMBER_OF_MESSAGES_ENV)? {
            config.max_number_of_messages = max;
        }
        if let Some(millis) = parse_var::<u64>(&lookup, RETRY_DELAY_ENV)? {
            config.retry_delay = Duration::from_millis(millis);
        }
        if let Some(name) = lookup(CONTINUATION_FUNCTION_ENV) {
            config.continuation_function = Some(name);
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, LifecycleError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            LifecycleError::validation(format!("invalid value {:?} for {}: {}", raw, key, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_lifecycle_config_default() {
        let config = LifecycleConfig::default();
        assert_eq!(config.safety_margin, Duration::from_millis(500));
    }

    #[test]
    fn test_lifecycle_config_from_lookup() {
        let config = LifecycleConfig::from_lookup(lookup(&[(SAFETY_MARGIN_ENV, "1500")])).unwrap();
        assert_eq!(config.safety_margin, Duration::from_millis(1500));

        let err = LifecycleConfig::from_lookup(lookup(&[(SAFETY_MARGIN_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { .. }));
    }

    #[test]
    fn test_fifo_consumer_config_default() {
        let config = FifoConsumerConfig::default();
        assert_eq!(config.max_number_of_messages, 10);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert!(config.continuation_function.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fifo_consumer_config_builder() {
        let config = FifoConsumerConfig::default()
            .with_max_number_of_messages(3)
            .with_retry_delay(Duration::from_millis(50))
            .with_continuation_function("drainer");
        assert_eq!(config.max_number_of_messages, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.continuation_function.as_deref(), Some("drainer"));
    }

    #[test]
    fn test_fifo_consumer_config_rejects_out_of_range_batch() {
        for max in [0, -1, 11] {
            let config = FifoConsumerConfig::default().with_max_number_of_messages(max);
            assert!(config.validate().is_err(), "{} should be rejected", max);
        }
        assert!(FifoConsumerConfig::default()
            .with_continuation_function(" ")
            .validate()
            .is_err());
    }

    #[test]
    fn test_fifo_consumer_config_from_lookup() {
        let config = FifoConsumerConfig::from_lookup(lookup(&[
            (MAX_NUMBER_OF_MESSAGES_ENV, "4"),
            (RETRY_DELAY_ENV, "100"),
            (CONTINUATION_FUNCTION_ENV, "other-fn"),
        ]))
        .unwrap();
        assert_eq!(config.max_number_of_messages, 4);
        assert_eq!(config.retry_delay, Duration::from_millis(100));
        assert_eq!(config.continuation_function.as_deref(), Some("other-fn"));

        let err = FifoConsumerConfig::from_lookup(lookup(&[(MAX_NUMBER_OF_MESSAGES_ENV, "25")]))
            .unwrap_err();
        assert!(err.to_string().contains("between 1 and 10"));
    }
}
