//! Projection runner utilities.
//!
//! Deterministic replay and cursor tracking without storage assumptions.

use thiserror::Error;

use crate::{EventEnvelope, Projection};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("sequence number 0 is never assigned by the store")]
    ZeroSequence,
}

/// Runs envelopes through a projection and tracks the last applied position.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    last_sequence_number: u64,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            last_sequence_number: 0,
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Position of the last applied envelope (`0` before anything was applied).
    pub fn cursor(&self) -> u64 {
        self.last_sequence_number
    }

    /// Apply a single envelope.
    ///
    /// Returns `Ok(false)` for replays at or below the cursor (at-least-once delivery).
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<bool, ProjectionError> {
        let seq = envelope.sequence_number();
        if seq == 0 {
            return Err(ProjectionError::ZeroSequence);
        }
        if seq <= self.last_sequence_number {
            return Ok(false);
        }

        self.projection.apply(envelope);
        self.last_sequence_number = seq;
        Ok(true)
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<Self, ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok(runner)
    }
}
