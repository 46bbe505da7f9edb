//! # courier-core
//!
//! The dispatch engine for the Courier publish/dispatch broker.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Message** - Prioritized, optionally targeted payloads
//! - **MessageStore** - Priority-ordered store with capacity eviction
//! - **SubscriberRegistry** - Subscriber identity and heartbeat liveness
//! - **DispatchService** - The single request surface tying them together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │   push      │────▶│ DispatchService  │────▶│ MessageStore │
//! └─────────────┘     └──────────────────┘     └──────────────┘
//!                            │
//!                            ▼
//!                  ┌────────────────────┐
//!                  │ SubscriberRegistry │
//!                  └────────────────────┘
//! ```
//!
//! A pull refreshes the subscriber's heartbeat in the registry, then
//! drains every pending message that is broadcast or addressed to that
//! subscriber. Delivery is at-most-once: a dispatched message leaves the
//! store for good, and a broadcast goes to whichever subscriber pulls
//! first.

pub mod message;
pub mod registry;
pub mod service;
pub mod store;

pub use message::{Message, MessageId, MessageType, MAX_PRIORITY, MIN_PRIORITY};
pub use registry::{Subscriber, SubscriberRegistry};
pub use service::{DispatchError, DispatchService, ServiceConfig, ServiceStatus};
pub use store::MessageStore;
