use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Event;

/// Envelope for a committed event, carrying log position metadata.
///
/// Notes:
/// - `sequence_number` is the global position assigned by the store on commit; it is
///   strictly increasing across the whole log, which lets consumers deduplicate.
/// - `stream_key` groups events touching the same ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    stream_key: String,

    /// Monotonically increasing position in the committed log.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        stream_key: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            stream_key: stream_key.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a committed event, deriving type and stream key from the event itself.
    pub fn for_event(event_id: Uuid, sequence_number: u64, payload: E) -> Self {
        Self::new(
            event_id,
            payload.event_type(),
            payload.stream_key(),
            sequence_number,
            payload,
        )
    }
}
