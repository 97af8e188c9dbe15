//! Tests for the consumer module.



use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::config::FifoConsumerConfig;
use crate::consumer::{processor_fn, BatchReport, ConsumptionFailure, FifoConsumer};
use crate::context::InvocationContext;
use crate::error::BoxError;
use crate::extension::extension_fn;
use crate::invoker::MockInvoker;
use crate::lambda::ConsumerInput;
use crate::lifecycle::{Lifecycle, LifecycleHandler};
use crate::queue::{Message, MockQueueService};

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Job {
    n: u32,
}

fn job_message(n: u32) -> Message {
    Message::new(
        format!("m{}", n),
        serde_json::json!({ "n": n }).to_string(),
        format!("rh-{}", n),
    )
}

fn jobs(range: std::ops::RangeInclusive<u32>) -> Vec<Message> {
    range.map(job_message).collect()
}

fn ctx() -> InvocationContext {
    InvocationContext::new("fifo-consumer", "req-1")
        .with_log_group("/aws/lambda/fifo-consumer")
        .with_log_stream("stream-1")
}

fn continuation_input() -> ConsumerInput {
    ConsumerInput {
        retry_messages_get: true,
        env: None,
    }
}

/// A consumer wired to recording mocks.
struct Harness {
    queue: Arc<MockQueueService>,
    invoker: Arc<MockInvoker>,
    handler: LifecycleHandler<ConsumerInput, BatchReport>,
    /// Job numbers handed to the processor, in call order
    attempts: Arc<Mutex<Vec<u32>>>,
    /// Ids of messages reported to the consumption-error observer
    failures: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(queue: MockQueueService, invoker: MockInvoker) -> Self {
        Self::with_config(queue, invoker, FifoConsumerConfig::default(), None)
    }

    fn failing_on(queue: MockQueueService, n: u32) -> Self {
        Self::with_config(queue, MockInvoker::new(), FifoConsumerConfig::default(), Some(n))
    }

    fn with_config(
        queue: MockQueueService,
        invoker: MockInvoker,
        config: FifoConsumerConfig,
        fail_on: Option<u32>,
    ) -> Self {
        let queue = Arc::new(queue);
        let invoker = Arc::new(invoker);
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let failure_log = Arc::clone(&failures);
        let attempt_log = Arc::clone(&attempts);
        let handler = FifoConsumer::<Job>::new(queue.clone(), invoker.clone(), config)
            .unwrap()
            .on_consumption_error(extension_fn(move |failure: &ConsumptionFailure, _ctx| {
                failure_log.lock().unwrap().push(failure.message.id.clone());
                Box::pin(async { Ok(()) })
            }))
            .build(
                Lifecycle::builder(),
                processor_fn(move |job: Job, _ctx| {
                    attempt_log.lock().unwrap().push(job.n);
                    async move {
                        if Some(job.n) == fail_on {
                            let error: BoxError = format!("job {} failed", job.n).into();
                            return Err(error);
                        }
                        Ok(())
                    }
                }),
            );

        Self {
            queue,
            invoker,
            handler,
            attempts,
            failures,
        }
    }

    fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().unwrap().clone()
    }

    fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }

    fn acked_ids(&self) -> Vec<Vec<String>> {
        self.queue
            .get_ack_calls()
            .into_iter()
            .map(|entries| entries.into_iter().map(|e| e.id).collect())
            .collect()
    }
}
