//! Shared test utilities for integration tests.
//!
//! This module provides an in-memory FIFO queue and a recording invoker so
//! that whole draining runs can be exercised without AWS infrastructure.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_lambda_lifecycle_sdk::{
    AckEntry, AckResult, ConsumerInput, InvocationContext, Invoker, LifecycleError, Message,
    QueueService,
};

// =============================================================================
// In-memory FIFO queue
// =============================================================================

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    body: String,
    group_id: String,
    /// Receipt token of the current delivery, `None` while visible
    in_flight: Option<String>,
}

/// An in-memory FIFO queue with receipt tokens and visibility.
///
/// Received messages stay in the queue, invisible, until they are
/// acknowledged with the receipt token of their latest delivery or made
/// visible again with [`InMemoryQueue::expire_visibility`].
pub struct InMemoryQueue {
    messages: Mutex<VecDeque<Stored>>,
    /// Ids the next acknowledgement reports as failed
    reject_acks: Mutex<Vec<String>>,
    receive_calls: Mutex<Vec<i32>>,
    ack_calls: Mutex<Vec<Vec<AckEntry>>>,
}

impl InMemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            reject_acks: Mutex::new(Vec::new()),
            receive_calls: Mutex::new(Vec::new()),
            ack_calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a queue holding `bodies` in order, all in one message group.
    pub fn with_bodies<S: Into<String>>(bodies: impl IntoIterator<Item = S>) -> Self {
        let queue = Self::new();
        for body in bodies {
            queue.send(body);
        }
        queue
    }

    /// Appends a message and returns its id.
    pub fn send(&self, body: impl Into<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.messages.lock().unwrap().push_back(Stored {
            id: id.clone(),
            body: body.into(),
            group_id: "default".to_string(),
            in_flight: None,
        });
        id
    }

    /// Makes the next acknowledgement report `id` as failed.
    pub fn reject_ack_of(&self, id: impl Into<String>) {
        self.reject_acks.lock().unwrap().push(id.into());
    }

    /// Makes every in-flight message visible again.
    pub fn expire_visibility(&self) {
        for message in self.messages.lock().unwrap().iter_mut() {
            message.in_flight = None;
        }
    }

    /// Bodies of the messages still in the queue, in order.
    pub fn remaining_bodies(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    /// Returns the batch size requested by every receive call.
    pub fn receive_calls(&self) -> Vec<i32> {
        self.receive_calls.lock().unwrap().clone()
    }

    /// Returns the entries of every acknowledgement call.
    pub fn ack_calls(&self) -> Vec<Vec<AckEntry>> {
        self.ack_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueService for InMemoryQueue {
    async fn receive(&self, max_number_of_messages: i32) -> Result<Vec<Message>, LifecycleError> {
        self.receive_calls.lock().unwrap().push(max_number_of_messages);

        let mut messages = self.messages.lock().unwrap();
        // A FIFO queue hands out nothing from a group that has messages in flight.
        if messages.iter().any(|m| m.in_flight.is_some()) {
            return Ok(Vec::new());
        }

        let limit = usize::try_from(max_number_of_messages).unwrap_or(0);
        let received = messages
            .iter_mut()
            .take(limit)
            .map(|stored| {
                let receipt = uuid::Uuid::new_v4().to_string();
                stored.in_flight = Some(receipt.clone());
                Message::new(&stored.id, &stored.body, receipt).with_group_id(&stored.group_id)
            })
            .collect();
        Ok(received)
    }

    async fn acknowledge_batch(&self, entries: &[AckEntry]) -> Result<AckResult, LifecycleError> {
        self.ack_calls.lock().unwrap().push(entries.to_vec());

        let rejected = std::mem::take(&mut *self.reject_acks.lock().unwrap());
        let mut messages = self.messages.lock().unwrap();
        let mut failed_ids = Vec::new();
        for entry in entries {
            let current = messages.iter().position(|m| {
                m.id == entry.id && m.in_flight.as_deref() == Some(entry.receipt_token.as_str())
            });
            match current {
                Some(index) if !rejected.contains(&entry.id) => {
                    messages.remove(index);
                }
                _ => failed_ids.push(entry.id.clone()),
            }
        }
        Ok(AckResult { failed_ids })
    }
}

// =============================================================================
// Recording invoker
// =============================================================================

/// An invoker that records every dispatch instead of running it.
pub struct RecordingInvoker {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
    fail: bool,
}

impl RecordingInvoker {
    /// Creates an invoker that accepts every dispatch.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Creates an invoker that records and then rejects every dispatch.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Returns the target and payload of every dispatch.
    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Removes and returns the oldest dispatched payload as consumer input.
    pub fn pop_continuation(&self) -> Option<ConsumerInput> {
        let mut calls = self.calls.lock().unwrap();
        if calls.is_empty() {
            return None;
        }
        let (_, payload) = calls.remove(0);
        Some(serde_json::from_value(payload).expect("continuation payload is consumer input"))
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke_async(
        &self,
        function_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), LifecycleError> {
        self.calls
            .lock()
            .unwrap()
            .push((function_name.to_string(), payload));
        if self.fail {
            return Err(LifecycleError::invoke(function_name, "rate exceeded"));
        }
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Creates the context of invocation number `n` of the "drainer" function.
pub fn invocation(n: usize) -> InvocationContext {
    InvocationContext::new("drainer", format!("req-{}", n))
        .with_log_group("/aws/lambda/drainer")
        .with_log_stream(format!("2026/10/16/[$LATEST]{}", n))
}
