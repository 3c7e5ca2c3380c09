//! Shared wiring of every ledger workflow: store, catalog, bus and configuration.

use tracing::warn;

use resinstock_core::Actor;
use resinstock_events::{EventBus, EventEnvelope};
use resinstock_inventory::Movement;

use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::store::{Committed, LedgerStore};
use crate::unit_of_work::{UnitOfWork, run_atomic};

/// Message type published for every committed movement.
pub type MovementEnvelope = EventEnvelope<Movement>;

/// Publish committed movements in sequence order.
///
/// Publication happens only after the commit succeeded. A failed publish is logged and
/// does not undo the commit; consumers can catch up from the movement log.
pub fn publish_committed<B>(bus: &B, committed: &Committed)
where
    B: EventBus<MovementEnvelope>,
{
    for logged in &committed.movements {
        let envelope = EventEnvelope::for_event(
            *logged.movement.id.as_uuid(),
            logged.sequence_number,
            logged.movement.clone(),
        );
        if let Err(err) = bus.publish(envelope) {
            warn!(
                sequence_number = logged.sequence_number,
                movement_id = %logged.movement.id,
                error = ?err,
                "failed to publish committed movement"
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerContext<S, C, B> {
    pub(crate) store: S,
    pub(crate) catalog: C,
    pub(crate) bus: B,
    pub(crate) config: LedgerConfig,
}

impl<S, C, B> LedgerContext<S, C, B> {
    pub fn new(store: S, catalog: C, bus: B, config: LedgerConfig) -> Self {
        Self {
            store,
            catalog,
            bus,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

impl<S, C, B> LedgerContext<S, C, B>
where
    S: LedgerStore,
    B: EventBus<MovementEnvelope>,
{
    /// Run `body` as one retried unit of work, then publish what it committed.
    pub(crate) fn atomically<T, F>(
        &self,
        actor: &Actor,
        operation: &'static str,
        body: F,
    ) -> LedgerResult<(T, Committed)>
    where
        F: FnMut(&mut UnitOfWork<'_, S>) -> LedgerResult<T>,
    {
        let (value, committed) = run_atomic(
            &self.store,
            self.config.max_conflict_retries,
            actor,
            operation,
            body,
        )?;
        publish_committed(&self.bus, &committed);
        Ok((value, committed))
    }
}
