use crate::{Event, EventEnvelope};

/// A projection builds a read model from the committed event log.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying the
/// log from the store. They are advisory and may be stale relative to in-flight
/// writes; nothing on the write side may consult them.
///
/// `apply` must be idempotent. Delivery is at-least-once, so the same envelope can
/// arrive twice; `ProjectionRunner` filters replays by sequence number but
/// projections should still tolerate duplicates.
pub trait Projection {
    type Ev: Event;

    /// Apply a single committed event to the read model.
    ///
    /// Events the projection does not care about are ignored.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
