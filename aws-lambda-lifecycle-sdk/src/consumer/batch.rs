//! Invocation-scoped bookkeeping of the FIFO consumer.

use serde::{Deserialize, Serialize};

use crate::queue::{AckEntry, Message};

/// Messages fully processed during the current invocation, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedMessages {
    messages: Vec<Message>,
}

impl ProcessedMessages {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message whose processing completed without error.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drains the set, leaving it empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the message ids in processing order.
    pub fn ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }

    /// Returns the acknowledgement entries in processing order.
    pub fn ack_entries(&self) -> Vec<AckEntry> {
        self.messages.iter().map(Message::ack_entry).collect()
    }
}

/// Output of a FIFO consumer invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Number of messages received
    pub received: usize,
    /// Ids of the processed messages awaiting acknowledgement, in order
    pub message_ids: Vec<String>,
}

impl BatchReport {
    /// Report of an invocation that found the queue empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if no message was received.
    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}
