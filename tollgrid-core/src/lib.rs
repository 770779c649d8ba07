//! Tollgrid Core Library
//!
//! Shared protocol types for the highway toll network: topic addressing,
//! wire messages with their legacy decoding rules, the in-process
//! publish/subscribe bus, and the mutable registries (crossing sessions,
//! correlation ids) the orchestrator shares across handler invocations.

pub mod bus;
pub mod correlation;
pub mod messages;
pub mod registry;
pub mod topics;

pub use bus::{Delivery, MessageBus, QOS_AT_LEAST_ONCE};
pub use correlation::{new_correlation_id, CorrelationTracker};
pub use registry::{CrossingState, Session, SessionRegistry};
pub use topics::{Channel, Direction, Leaf, TopicAddress, TopicError};
