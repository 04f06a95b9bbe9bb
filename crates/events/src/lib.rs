//! Event contracts and notification transport.
//!
//! - [`Event`]: domain-agnostic event metadata (type name, schema version, time).
//! - [`EventBus`]: publish/subscribe transport with at-least-once semantics.
//! - [`ObjectCreated`]: the blob store's per-object creation notification.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod object;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use object::ObjectCreated;
