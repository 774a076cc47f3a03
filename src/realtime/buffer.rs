//! Bounded chat message buffer
//!
//! Append-only ordered sequence with a hard cap: insertion beyond the cap
//! drops the oldest entries (FIFO) and never reorders what is retained.

use std::collections::VecDeque;

use super::envelope::ChatMessage;

/// Default buffer capacity
pub const DEFAULT_BUFFER_CAP: usize = 200;

/// FIFO-capped message buffer.
#[derive(Debug)]
pub struct MessageBuffer {
    cap: usize,
    items: VecDeque<ChatMessage>,
}

impl MessageBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            items: VecDeque::with_capacity(cap.min(DEFAULT_BUFFER_CAP)),
        }
    }

    /// Append one message, dropping from the head when over capacity.
    pub fn push(&mut self, message: ChatMessage) {
        self.items.push_back(message);
        while self.items.len() > self.cap {
            self.items.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ordered snapshot, oldest first.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.items.iter().cloned().collect()
    }
}
