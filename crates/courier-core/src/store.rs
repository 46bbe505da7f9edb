//! Priority-ordered message store for Courier.
//!
//! The store holds every pending message in a single sequence sorted by
//! (priority descending, creation time ascending) and enforces a capacity
//! bound by evicting the lowest-priority, oldest-on-tie entry. Messages
//! leave the store exactly once: either through [`MessageStore::next`] /
//! [`MessageStore::dispatch`] (ownership transfers to the caller) or
//! through eviction (the message is dropped).

use crate::message::{Message, MessageId};
use std::cmp::Reverse;
use tracing::{debug, trace};

/// Default capacity when none is configured.
const DEFAULT_CAPACITY: usize = 1000;

/// A bounded, priority-ordered store of pending messages.
#[derive(Debug)]
pub struct MessageStore {
    /// Pending messages, kept sorted by (priority desc, created_at asc).
    queue: Vec<Message>,
    /// Maximum number of pending messages.
    capacity: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MessageStore {
    /// Create a store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store bounded to `capacity` pending messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the store holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The configured capacity bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a message, evicting if the store is full.
    ///
    /// Never rejects: when the store is at capacity the lowest-priority
    /// entry (oldest on tie) is dropped first. Returns the ID of the
    /// evicted message, if any.
    pub fn add(&mut self, msg: Message) -> Option<MessageId> {
        let evicted = if self.queue.len() >= self.capacity {
            self.evict_lowest()
        } else {
            None
        };

        trace!(id = msg.id, priority = msg.priority, "Message stored");
        self.queue.push(msg);
        // Stable sort: equal (priority, created_at) keys keep insertion order
        self.queue
            .sort_by_key(|m| (Reverse(m.priority), m.created_at));

        evicted
    }

    /// Remove and return the head of the sequence: highest priority,
    /// oldest on tie. Returns `None` when the store is empty.
    pub fn next(&mut self) -> Option<Message> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    /// Remove and return every message addressed to `target_id`.
    ///
    /// A message matches when its target is absent (broadcast) or equals
    /// `target_id`. Matches are returned in their stored order; everything
    /// else stays behind, also in order. Delivery is at-most-once: a
    /// second call never sees the same messages again.
    pub fn dispatch(&mut self, target_id: &str) -> Vec<Message> {
        let queue = std::mem::take(&mut self.queue);
        let (matches, rest): (Vec<_>, Vec<_>) =
            queue.into_iter().partition(|m| m.matches(target_id));
        self.queue = rest;

        if !matches.is_empty() {
            debug!(
                target = %target_id,
                delivered = matches.len(),
                remaining = self.queue.len(),
                "Dispatched messages"
            );
        }

        matches
    }

    /// Drop all pending messages.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Remove the lowest-priority message, oldest on tie.
    fn evict_lowest(&mut self) -> Option<MessageId> {
        let victim = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| (m.priority, m.created_at))
            .map(|(i, _)| i)?;

        let msg = self.queue.remove(victim);
        debug!(id = msg.id, priority = msg.priority, "Evicted message to respect capacity");
        Some(msg.id)
    }
}
