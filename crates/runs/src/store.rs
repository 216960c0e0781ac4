//! Persistence port for runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gstflow_aggregation::{Aggregation, ReconciliationReport};
use gstflow_core::{ExpectedVersion, NormalizedRecord, RunId, RunScope};
use gstflow_numbering::Invoice;

use crate::run::RunEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunStoreError {
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    #[error("run {0} already has a different input")]
    InputMismatch(RunId),

    #[error("outputs for run {0} are already finalized")]
    AlreadyFinalized(RunId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// The record stream a run was started with, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    pub scope: RunScope,
    pub records: Vec<NormalizedRecord>,
}

/// Released output of a successful run. Append-only once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub aggregation: Aggregation,
    pub invoices: Vec<Invoice>,
    pub reconciliation: ReconciliationReport,
    pub finalized_at: DateTime<Utc>,
}

/// Event stream plus input/output storage for runs.
pub trait RunStore: Send + Sync {
    /// Append events, checking the stream is at `expected` first.
    ///
    /// Returns the stream version after the append.
    fn append(
        &self,
        run_id: RunId,
        expected: ExpectedVersion,
        events: Vec<RunEvent>,
    ) -> Result<u64, RunStoreError>;

    /// Full event stream, oldest first. Empty for unknown runs.
    fn load(&self, run_id: RunId) -> Result<Vec<RunEvent>, RunStoreError>;

    /// Write-once: saving the identical input again is a no-op.
    fn save_input(&self, run_id: RunId, input: RunInput) -> Result<(), RunStoreError>;

    fn load_input(&self, run_id: RunId) -> Result<Option<RunInput>, RunStoreError>;

    /// Fails with [`RunStoreError::AlreadyFinalized`] on a second write.
    fn finalize_outputs(&self, run_id: RunId, output: RunOutput) -> Result<(), RunStoreError>;

    fn load_outputs(&self, run_id: RunId) -> Result<Option<RunOutput>, RunStoreError>;
}

impl<S> RunStore for Arc<S>
where
    S: RunStore + ?Sized,
{
    fn append(
        &self,
        run_id: RunId,
        expected: ExpectedVersion,
        events: Vec<RunEvent>,
    ) -> Result<u64, RunStoreError> {
        (**self).append(run_id, expected, events)
    }

    fn load(&self, run_id: RunId) -> Result<Vec<RunEvent>, RunStoreError> {
        (**self).load(run_id)
    }

    fn save_input(&self, run_id: RunId, input: RunInput) -> Result<(), RunStoreError> {
        (**self).save_input(run_id, input)
    }

    fn load_input(&self, run_id: RunId) -> Result<Option<RunInput>, RunStoreError> {
        (**self).load_input(run_id)
    }

    fn finalize_outputs(&self, run_id: RunId, output: RunOutput) -> Result<(), RunStoreError> {
        (**self).finalize_outputs(run_id, output)
    }

    fn load_outputs(&self, run_id: RunId) -> Result<Option<RunOutput>, RunStoreError> {
        (**self).load_outputs(run_id)
    }
}
