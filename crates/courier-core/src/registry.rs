//! Subscriber identity and liveness tracking for Courier.
//!
//! The registry records who is subscribed and when each subscriber last
//! heartbeated. Liveness is derived lazily from the stored timestamp and
//! the current clock; nothing in here runs on a timer. Stale records are
//! only removed by an explicit [`SubscriberRegistry::sweep`], which an
//! external scheduler decides when to call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A registered subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Unique subscriber ID.
    pub id: String,
    /// Display name; defaults to the ID.
    pub name: String,
    /// Informational tags, never used for routing.
    pub tags: Vec<String>,
    /// When the subscriber registered (ms since epoch).
    pub connected_at: u64,
    /// Last heartbeat timestamp (ms since epoch).
    pub last_heartbeat: u64,
}

impl Subscriber {
    /// Create a new subscriber record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: Option<String>, tags: Vec<String>) -> Self {
        let id = id.into();
        let now = now_millis();

        Self {
            name: name.unwrap_or_else(|| id.clone()),
            id,
            tags,
            connected_at: now,
            last_heartbeat: now,
        }
    }

    /// Update the last heartbeat timestamp.
    ///
    /// The timestamp never moves backwards, even if the wall clock does.
    pub fn touch(&mut self) {
        self.last_heartbeat = self.last_heartbeat.max(now_millis());
    }

    /// Check whether the subscriber heartbeated within `timeout`.
    #[must_use]
    pub fn is_alive(&self, timeout: Duration) -> bool {
        let elapsed = now_millis().saturating_sub(self.last_heartbeat);
        elapsed < timeout.as_millis() as u64
    }
}

/// Registry of subscribers with a bounded record count.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    /// Map of subscriber ID to record.
    subscribers: HashMap<String, Subscriber>,
    /// Maximum number of records; `None` means unbounded.
    max_subscribers: Option<usize>,
}

impl SubscriberRegistry {
    /// Create an unbounded registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry bounded to `max_subscribers` records.
    #[must_use]
    pub fn with_limit(max_subscribers: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            max_subscribers: Some(max_subscribers),
        }
    }

    /// Number of records, live or stale.
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether an ID is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.subscribers.contains_key(id)
    }

    /// Get a subscriber record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Subscriber> {
        self.subscribers.get(id)
    }

    /// Register a subscriber.
    ///
    /// Re-registering an existing ID replaces the record (name, tags, and
    /// heartbeat reset) and is always allowed — replacement never grows
    /// the registry. A new ID is refused with `None` when the record
    /// count is already at the configured maximum.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        name: Option<String>,
        tags: Vec<String>,
    ) -> Option<Subscriber> {
        let id = id.into();
        let is_new = !self.subscribers.contains_key(&id);

        if is_new {
            if let Some(max) = self.max_subscribers {
                if self.subscribers.len() >= max {
                    return None;
                }
            }
        }

        let subscriber = Subscriber::new(id.clone(), name, tags);
        self.subscribers.insert(id.clone(), subscriber.clone());

        if is_new {
            debug!(subscriber = %id, "Subscriber registered");
        } else {
            debug!(subscriber = %id, "Subscriber re-registered");
        }

        Some(subscriber)
    }

    /// Remove a subscriber record.
    ///
    /// Returns the removed record, if any.
    pub fn unregister(&mut self, id: &str) -> Option<Subscriber> {
        let removed = self.subscribers.remove(id);
        if removed.is_some() {
            debug!(subscriber = %id, "Subscriber unregistered");
        }
        removed
    }

    /// Refresh a subscriber's heartbeat.
    ///
    /// Returns `false` if the ID is unknown.
    pub fn touch(&mut self, id: &str) -> bool {
        if let Some(sub) = self.subscribers.get_mut(id) {
            sub.touch();
            true
        } else {
            false
        }
    }

    /// Check whether a subscriber heartbeated within `timeout`.
    ///
    /// Unknown IDs are not alive.
    #[must_use]
    pub fn is_alive(&self, id: &str, timeout: Duration) -> bool {
        self.subscribers
            .get(id)
            .is_some_and(|s| s.is_alive(timeout))
    }

    /// All subscribers heartbeating within `timeout`.
    #[must_use]
    pub fn active(&self, timeout: Duration) -> Vec<&Subscriber> {
        self.subscribers
            .values()
            .filter(|s| s.is_alive(timeout))
            .collect()
    }

    /// All subscriber records.
    #[must_use]
    pub fn all(&self) -> Vec<&Subscriber> {
        self.subscribers.values().collect()
    }

    /// Remove records whose heartbeat expired more than `timeout` ago.
    ///
    /// Returns the removed IDs. Never called by the core itself; an
    /// external scheduler decides when.
    pub fn sweep(&mut self, timeout: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .subscribers
            .iter()
            .filter(|(_, s)| !s.is_alive(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.subscribers.remove(id);
            debug!(subscriber = %id, "Swept stale subscriber");
        }

        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let mut registry = SubscriberRegistry::new();

        let sub = registry.register("sub-1", Some("Alice".into()), vec![]).unwrap();
        assert_eq!(sub.name, "Alice");
        assert_eq!(registry.count(), 1);
        assert!(registry.contains("sub-1"));

        assert!(registry.unregister("sub-1").is_some());
        assert!(!registry.contains("sub-1"));
        assert!(registry.unregister("sub-1").is_none());
    }

    #[test]
    fn test_name_defaults_to_id() {
        let mut registry = SubscriberRegistry::new();
        let sub = registry.register("sub-1", None, vec![]).unwrap();
        assert_eq!(sub.name, "sub-1");
    }

    #[test]
    fn test_capacity_limit() {
        let mut registry = SubscriberRegistry::with_limit(2);
        assert!(registry.register("a", None, vec![]).is_some());
        assert!(registry.register("b", None, vec![]).is_some());

        assert!(registry.register("c", None, vec![]).is_none());
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_reregistration_allowed_at_capacity() {
        let mut registry = SubscriberRegistry::with_limit(1);
        registry.register("a", Some("old".into()), vec![]).unwrap();

        let replaced = registry
            .register("a", Some("new".into()), vec!["tag".into()])
            .unwrap();
        assert_eq!(replaced.name, "new");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_heartbeat_then_alive() {
        let mut registry = SubscriberRegistry::new();
        registry.register("sub-1", None, vec![]).unwrap();

        assert!(registry.touch("sub-1"));
        assert!(registry.is_alive("sub-1", Duration::from_secs(1)));
        assert!(registry.is_alive("sub-1", Duration::from_secs(3600)));

        assert!(!registry.touch("ghost"));
        assert!(!registry.is_alive("ghost", Duration::from_secs(3600)));
    }

    #[test]
    fn test_zero_timeout_means_stale() {
        let mut registry = SubscriberRegistry::new();
        registry.register("sub-1", None, vec![]).unwrap();

        // elapsed >= 0 is never strictly below a zero window
        assert!(!registry.is_alive("sub-1", Duration::ZERO));
    }

    #[test]
    fn test_sweep_removes_only_stale() {
        let mut registry = SubscriberRegistry::new();
        registry.register("live", None, vec![]).unwrap();
        registry.register("stale", None, vec![]).unwrap();

        // Age one record artificially
        registry
            .subscribers
            .get_mut("stale")
            .unwrap()
            .last_heartbeat = 0;

        let removed = registry.sweep(Duration::from_secs(60));
        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(registry.contains("live"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_active_filters_by_liveness() {
        let mut registry = SubscriberRegistry::new();
        registry.register("live", None, vec![]).unwrap();
        registry.register("stale", None, vec![]).unwrap();
        registry
            .subscribers
            .get_mut("stale")
            .unwrap()
            .last_heartbeat = 0;

        let active = registry.active(Duration::from_secs(60));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "live");
        assert_eq!(registry.all().len(), 2);
    }
}
