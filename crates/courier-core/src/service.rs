//! The dispatch service for Courier.
//!
//! [`DispatchService`] composes the message store and the subscriber
//! registry behind a single request surface: push, pull, register,
//! unregister, heartbeat, status. It owns one lock per structure — every
//! store mutation rewrites the whole ordered sequence, so coarse mutual
//! exclusion is the correct granularity at this scale.

use crate::message::{Message, MessageType};
use crate::registry::{Subscriber, SubscriberRegistry};
use crate::store::MessageStore;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Dispatch errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The referenced subscriber ID is not registered.
    #[error("subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// The registry is at its configured maximum.
    #[error("subscriber limit reached ({0})")]
    CapacityExceeded(usize),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of pending messages.
    pub max_queue_size: usize,
    /// Maximum number of registered subscribers.
    pub max_subscribers: usize,
    /// Rolling window after the last heartbeat during which a subscriber
    /// counts as active.
    pub heartbeat_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_subscribers: 100,
            heartbeat_timeout: Duration::from_secs(60),
        }
    }
}

/// A point-in-time snapshot of service state.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Pending messages in the store.
    pub queue_size: usize,
    /// Subscribers heartbeating within the liveness window.
    pub active_subscribers: usize,
    /// All registered subscribers, live or stale.
    pub total_subscribers: usize,
    /// Messages accepted since startup.
    pub total_messages: u64,
    /// Messages delivered through pulls since startup.
    pub messages_sent: u64,
    /// Push failures since startup. Stays zero under the clamp policy;
    /// carried for the status surface.
    pub messages_failed: u64,
}

/// The central dispatch service.
///
/// Constructed once per service instance and shared by reference across
/// request handlers; all methods take `&self`.
pub struct DispatchService {
    /// Pending messages, guarded as a whole (add and dispatch rewrite the
    /// full sequence).
    store: Mutex<MessageStore>,
    /// Subscriber records; reads dominate writes.
    registry: RwLock<SubscriberRegistry>,
    config: ServiceConfig,
    total_messages: AtomicU64,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
}

impl DispatchService {
    /// Create a service with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    /// Create a service with custom configuration.
    #[must_use]
    pub fn with_config(config: ServiceConfig) -> Self {
        info!(
            max_queue_size = config.max_queue_size,
            max_subscribers = config.max_subscribers,
            heartbeat_timeout_secs = config.heartbeat_timeout.as_secs(),
            "Creating dispatch service"
        );
        Self {
            store: Mutex::new(MessageStore::with_capacity(config.max_queue_size)),
            registry: RwLock::new(SubscriberRegistry::with_limit(config.max_subscribers)),
            config,
            total_messages: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
        }
    }

    /// The configuration this service was built with.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Accept a message for dispatch.
    ///
    /// Out-of-range priorities clamp to the minimum and unknown type
    /// names clamp to text; a push never fails. Returns the stored
    /// record (the store keeps ownership of the original).
    pub fn push(
        &self,
        content: impl Into<Bytes>,
        msg_type: &str,
        priority: i64,
        target: Option<String>,
    ) -> Message {
        let mut message = Message::new(content)
            .with_type(MessageType::parse_or_default(msg_type))
            .with_priority(priority);
        if let Some(t) = target {
            message = message.with_target(t);
        }
        let record = message.clone();

        let evicted = self.store.lock().add(message);
        self.total_messages.fetch_add(1, Ordering::Relaxed);

        debug!(
            id = record.id,
            priority = record.priority,
            target = record.target.as_deref().unwrap_or("<broadcast>"),
            evicted = ?evicted,
            "Message pushed"
        );

        record
    }

    /// Deliver every pending message addressed to `subscriber_id`.
    ///
    /// Refreshes the subscriber's heartbeat, then drains matching
    /// messages (broadcast or targeted) in priority order. An empty batch
    /// is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SubscriberNotFound`] for unknown IDs.
    pub fn pull(&self, subscriber_id: &str) -> Result<Vec<Message>, DispatchError> {
        if !self.registry.write().touch(subscriber_id) {
            return Err(DispatchError::SubscriberNotFound(subscriber_id.to_string()));
        }

        let delivered = self.store.lock().dispatch(subscriber_id);
        self.messages_sent
            .fetch_add(delivered.len() as u64, Ordering::Relaxed);

        Ok(delivered)
    }

    /// Register a subscriber (or replace an existing record under the
    /// same ID).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::CapacityExceeded`] when a new ID would
    /// push the registry past its maximum.
    pub fn register(
        &self,
        subscriber_id: &str,
        name: Option<String>,
        tags: Vec<String>,
    ) -> Result<Subscriber, DispatchError> {
        self.registry
            .write()
            .register(subscriber_id, name, tags)
            .ok_or(DispatchError::CapacityExceeded(self.config.max_subscribers))
    }

    /// Remove a subscriber record.
    ///
    /// Pending messages targeted at the removed ID stay in the store
    /// until evicted; the target is a soft reference.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SubscriberNotFound`] for unknown IDs.
    pub fn unregister(&self, subscriber_id: &str) -> Result<Subscriber, DispatchError> {
        self.registry
            .write()
            .unregister(subscriber_id)
            .ok_or_else(|| DispatchError::SubscriberNotFound(subscriber_id.to_string()))
    }

    /// Refresh a subscriber's heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SubscriberNotFound`] for unknown IDs.
    pub fn heartbeat(&self, subscriber_id: &str) -> Result<(), DispatchError> {
        if self.registry.write().touch(subscriber_id) {
            Ok(())
        } else {
            Err(DispatchError::SubscriberNotFound(subscriber_id.to_string()))
        }
    }

    /// Snapshot the service state.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        let registry = self.registry.read();
        ServiceStatus {
            queue_size: self.store.lock().len(),
            active_subscribers: registry.active(self.config.heartbeat_timeout).len(),
            total_subscribers: registry.count(),
            total_messages: self.total_messages.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
        }
    }

    /// Snapshot subscriber records, sorted by ID.
    #[must_use]
    pub fn subscribers(&self, active_only: bool) -> Vec<Subscriber> {
        let registry = self.registry.read();
        let mut subs: Vec<Subscriber> = if active_only {
            registry
                .active(self.config.heartbeat_timeout)
                .into_iter()
                .cloned()
                .collect()
        } else {
            registry.all().into_iter().cloned().collect()
        };
        subs.sort_by(|a, b| a.id.cmp(&b.id));
        subs
    }

    /// Remove subscribers whose heartbeat expired; returns the removed
    /// IDs. Exposed for an external scheduler, never self-invoked.
    pub fn sweep(&self) -> Vec<String> {
        self.registry.write().sweep(self.config.heartbeat_timeout)
    }
}

impl Default for DispatchService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_service() -> DispatchService {
        DispatchService::with_config(ServiceConfig {
            max_queue_size: 10,
            max_subscribers: 2,
            heartbeat_timeout: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_push_clamps_invalid_input() {
        let service = DispatchService::new();

        let msg = service.push(b"x".to_vec(), "carrier-pigeon", 99, None);
        assert_eq!(msg.msg_type, MessageType::Text);
        assert_eq!(msg.priority, 1);

        let msg = service.push(b"y".to_vec(), "json", 5, None);
        assert_eq!(msg.msg_type, MessageType::Json);
        assert_eq!(msg.priority, 5);
    }

    #[test]
    fn test_push_to_unknown_target_is_legal() {
        let service = DispatchService::new();
        service.push(b"x".to_vec(), "text", 3, Some("nobody".into()));
        assert_eq!(service.status().queue_size, 1);
    }

    #[test]
    fn test_pull_requires_registration() {
        let service = small_service();
        assert!(matches!(
            service.pull("ghost"),
            Err(DispatchError::SubscriberNotFound(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_broadcast_is_consumed_by_first_pull() {
        let service = small_service();
        service.register("a", None, vec![]).unwrap();
        service.register("b", None, vec![]).unwrap();

        let m1 = service.push(b"broadcast".to_vec(), "text", 1, None);
        let m2 = service.push(b"direct".to_vec(), "text", 1, Some("a".into()));

        let for_a = service.pull("a").unwrap();
        assert_eq!(
            for_a.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id]
        );

        // The broadcast was already consumed by a's pull
        assert!(service.pull("b").unwrap().is_empty());
    }

    #[test]
    fn test_pull_updates_heartbeat_and_counters() {
        let service = small_service();
        service.register("a", None, vec![]).unwrap();
        service.push(b"one".to_vec(), "text", 2, None);
        service.push(b"two".to_vec(), "text", 4, None);

        let delivered = service.pull("a").unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].priority, 4);

        let status = service.status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.total_messages, 2);
        assert_eq!(status.messages_sent, 2);
        assert_eq!(status.messages_failed, 0);
        assert_eq!(status.active_subscribers, 1);
    }

    #[test]
    fn test_register_capacity() {
        let service = small_service();
        service.register("a", None, vec![]).unwrap();
        service.register("b", None, vec![]).unwrap();

        assert!(matches!(
            service.register("c", None, vec![]),
            Err(DispatchError::CapacityExceeded(2))
        ));
        assert_eq!(service.status().total_subscribers, 2);
    }

    #[test]
    fn test_unregister_unknown() {
        let service = small_service();
        service.register("a", None, vec![]).unwrap();

        assert!(matches!(
            service.unregister("ghost"),
            Err(DispatchError::SubscriberNotFound(_))
        ));
        assert_eq!(service.status().total_subscribers, 1);

        service.unregister("a").unwrap();
        assert_eq!(service.status().total_subscribers, 0);
    }

    #[test]
    fn test_heartbeat() {
        let service = small_service();
        service.register("a", None, vec![]).unwrap();

        assert!(service.heartbeat("a").is_ok());
        assert!(matches!(
            service.heartbeat("ghost"),
            Err(DispatchError::SubscriberNotFound(_))
        ));
    }

    #[test]
    fn test_subscribers_sorted_by_id() {
        let service = small_service();
        service.register("beta", None, vec![]).unwrap();
        service.register("alpha", None, vec![]).unwrap();

        let ids: Vec<_> = service
            .subscribers(false)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let service = Arc::new(DispatchService::new());
        service.register("a", None, vec![]).unwrap();

        let pushers: Vec<_> = (0..4i64)
            .map(|i| {
                let svc = Arc::clone(&service);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        svc.push(b"x".to_vec(), "text", i % 5 + 1, None);
                    }
                })
            })
            .collect();
        for handle in pushers {
            handle.join().unwrap();
        }

        assert_eq!(service.status().total_messages, 200);

        let mut delivered = service.pull("a").unwrap().len();
        while delivered < 200 {
            delivered += service.pull("a").unwrap().len();
            if service.status().queue_size == 0 {
                break;
            }
        }
        assert_eq!(delivered, 200);
    }
}
