use chrono::{DateTime, Utc};

use gstflow_core::RunId;

/// A fact recorded on a run's stream.
///
/// Run events are append-only and never rewritten; a status change that
/// needs undoing is undone by a later event.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Payload schema version carried on every envelope.
    const SCHEMA_VERSION: u32 = 1;

    /// Run whose stream this event belongs to.
    fn run_id(&self) -> RunId;

    /// Routing name, `"runs.run.<transition>"`.
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;
}
