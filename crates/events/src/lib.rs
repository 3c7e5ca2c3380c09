//! Published ledger facts and the mechanics to distribute them.
//!
//! The ledger store is the source of truth; everything here is for read-side
//! consumers (projections, analytics, dashboards) that may lag behind it.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionError, ProjectionRunner};
