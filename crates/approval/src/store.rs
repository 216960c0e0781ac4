//! Decision store port: the durable record of exceptions and approvals.

use std::sync::Arc;

use thiserror::Error;

use gstflow_core::{DomainError, ExceptionId, RequestId, RunId};
use gstflow_exceptions::Exception;

use crate::request::{ApprovalRequest, Decision};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionStoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// The stored entity rejected the change (e.g. deciding a decided request).
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("decision store failure: {0}")]
    Storage(String),
}

/// Append-mostly store of exceptions and approval requests.
///
/// - Appends are idempotent by id: re-appending an existing id is a no-op that
///   returns `false`.
/// - `apply_decision` is the single serialization point for decisions: the
///   status check and the write happen atomically, so two concurrent
///   deciders cannot both close the same request.
/// - Reads return entities in insertion order.
pub trait DecisionStore: Send + Sync {
    fn append_exception(&self, exception: &Exception) -> Result<bool, DecisionStoreError>;

    /// Replace a stored exception (status sync after a decision).
    fn update_exception(&self, exception: &Exception) -> Result<(), DecisionStoreError>;

    fn exception(&self, id: &ExceptionId) -> Result<Option<Exception>, DecisionStoreError>;

    fn exceptions(&self, run_id: RunId) -> Result<Vec<Exception>, DecisionStoreError>;

    fn append_approval_request(&self, request: &ApprovalRequest) -> Result<bool, DecisionStoreError>;

    fn approval_request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, DecisionStoreError>;

    fn approval_requests(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, DecisionStoreError>;

    /// Requests still waiting on someone (pending or escalated).
    fn read_pending(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, DecisionStoreError>;

    fn apply_decision(
        &self,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<ApprovalRequest, DecisionStoreError>;
}

impl<S> DecisionStore for Arc<S>
where
    S: DecisionStore + ?Sized,
{
    fn append_exception(&self, exception: &Exception) -> Result<bool, DecisionStoreError> {
        (**self).append_exception(exception)
    }

    fn update_exception(&self, exception: &Exception) -> Result<(), DecisionStoreError> {
        (**self).update_exception(exception)
    }

    fn exception(&self, id: &ExceptionId) -> Result<Option<Exception>, DecisionStoreError> {
        (**self).exception(id)
    }

    fn exceptions(&self, run_id: RunId) -> Result<Vec<Exception>, DecisionStoreError> {
        (**self).exceptions(run_id)
    }

    fn append_approval_request(&self, request: &ApprovalRequest) -> Result<bool, DecisionStoreError> {
        (**self).append_approval_request(request)
    }

    fn approval_request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, DecisionStoreError> {
        (**self).approval_request(id)
    }

    fn approval_requests(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, DecisionStoreError> {
        (**self).approval_requests(run_id)
    }

    fn read_pending(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, DecisionStoreError> {
        (**self).read_pending(run_id)
    }

    fn apply_decision(
        &self,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<ApprovalRequest, DecisionStoreError> {
        (**self).apply_decision(request_id, decision)
    }
}
