use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gstflow_core::RunId;

use crate::event::Event;

/// A run event as published to subscribers.
///
/// `sequence_number` is the event's 1-based position in the run's stream, so
/// a subscriber that sees the same (run_id, sequence_number) twice is looking
/// at a republication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    run_id: RunId,
    aggregate_type: String,
    sequence_number: u64,
    event_type: String,
    schema_version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a stored event for publication. Routing fields are copied from
    /// the payload; the envelope gets a fresh time-ordered id.
    pub fn seal(aggregate_type: impl Into<String>, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            run_id: payload.run_id(),
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: payload.event_type().to_string(),
            schema_version: E::SCHEMA_VERSION,
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
