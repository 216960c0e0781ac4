//! Run audit events: the `Event` contract, envelopes, and pub/sub mechanics.
//!
//! Run transitions are persisted first (see `gstflow-runs::RunStore`) and only
//! then published on an [`EventBus`] as [`EventEnvelope`]s for downstream
//! consumers such as dashboards or notification hooks.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
