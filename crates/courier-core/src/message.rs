//! Message types for Courier.
//!
//! A [`Message`] is created on push and owned by the store until it is
//! either dispatched to a puller or evicted to make room.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// Lowest (and default) message priority.
pub const MIN_PRIORITY: u8 = 1;

/// Highest message priority.
pub const MAX_PRIORITY: u8 = 5;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    // Combine timestamp with atomic counter for guaranteed uniqueness
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    timestamp.wrapping_add(counter)
}

/// Nanoseconds since the Unix epoch, used for creation-order tie-breaks.
#[must_use]
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// The kind of payload a message carries.
///
/// Informational only; the store never inspects the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Json,
    Binary,
}

impl MessageType {
    /// Parse a wire name, falling back to [`MessageType::Text`] for
    /// anything unrecognized (silent-clamp validation policy).
    #[must_use]
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "binary" => Self::Binary,
            _ => Self::Text,
        }
    }

    /// The wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Binary => "binary",
        }
    }
}

/// Clamp a raw priority into the valid range.
///
/// Anything outside `[MIN_PRIORITY, MAX_PRIORITY]` falls back to
/// [`MIN_PRIORITY`] rather than the nearest bound, matching the
/// silent-clamp validation policy.
#[must_use]
pub fn clamp_priority(raw: i64) -> u8 {
    if (i64::from(MIN_PRIORITY)..=i64::from(MAX_PRIORITY)).contains(&raw) {
        raw as u8
    } else {
        MIN_PRIORITY
    }
}

/// A pending message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Opaque payload (shared for cheap clones).
    pub content: Bytes,
    /// Payload kind.
    pub msg_type: MessageType,
    /// Priority, `1..=5` with 5 highest.
    pub priority: u8,
    /// Target subscriber ID; `None` means broadcast.
    ///
    /// A soft reference: never validated against the registry.
    pub target: Option<String>,
    /// Creation timestamp in nanoseconds, used only as an ordering
    /// tie-break among equal priorities.
    pub created_at: u64,
}

impl Message {
    /// Create a new broadcast message with default type and priority.
    #[must_use]
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            id: generate_message_id(),
            content: content.into(),
            msg_type: MessageType::default(),
            priority: MIN_PRIORITY,
            target: None,
            created_at: now_nanos(),
        }
    }

    /// Set the payload kind.
    #[must_use]
    pub fn with_type(mut self, msg_type: MessageType) -> Self {
        self.msg_type = msg_type;
        self
    }

    /// Set the priority. The value is clamped, not rejected.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = clamp_priority(priority);
        self
    }

    /// Address the message to a single subscriber.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Whether this message is broadcast (no target).
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    /// Whether this message would be delivered to `subscriber_id`.
    #[must_use]
    pub fn matches(&self, subscriber_id: &str) -> bool {
        match &self.target {
            None => true,
            Some(t) => t == subscriber_id,
        }
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn content_size(&self) -> usize {
        self.content.len()
    }
}
