//! Routing exceptions to decisions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gstflow_core::{DomainError, Entity, NormalizedRecord, RequestId, RunId};
use gstflow_exceptions::{Exception, ExceptionStatus};

use crate::request::{Actor, ApprovalRequest, ApprovalStatus, Decision, Outcome};
use crate::rules::RuleSet;
use crate::store::{DecisionStore, DecisionStoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] DecisionStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// What `submit` did with an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Already stored with its request (if any); nothing changed.
    Known,
    /// Stored; no approval needed.
    Recorded,
    /// Stored and routed; the request landed in this status.
    Routed(ApprovalStatus),
}

/// Per-run approval counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    pub total: usize,
    pub pending: usize,
    pub escalated: usize,
    pub approved: usize,
    pub rejected: usize,
    pub auto_decided: usize,
}

#[derive(Debug, Clone)]
pub struct ApprovalWorkflow<S> {
    store: S,
    rules: RuleSet,
}

impl<S> ApprovalWorkflow<S> {
    pub fn new(store: S, rules: RuleSet) -> Self {
        Self { store, rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> ApprovalWorkflow<S>
where
    S: DecisionStore,
{
    /// Persist an exception and, if it needs approval, open and pre-decide its
    /// request. Safe to repeat: known exceptions with a stored request are left
    /// alone, and a request missing after a crash is recreated.
    pub fn submit(
        &self,
        exception: Exception,
        record: Option<&NormalizedRecord>,
    ) -> Result<Submission, WorkflowError> {
        let inserted = self.store.append_exception(&exception)?;
        if !exception.requires_approval() {
            return Ok(if inserted { Submission::Recorded } else { Submission::Known });
        }

        let request_id = ApprovalRequest::id_for(exception.id());
        if !inserted && self.store.approval_request(&request_id)?.is_some() {
            return Ok(Submission::Known);
        }

        let mut request = ApprovalRequest::for_exception(&exception, record, Utc::now())?;
        self.pre_decide(&mut request)?;

        if self.store.append_approval_request(&request)? {
            tracing::info!(
                run_id = %request.run_id(),
                request_id = %request.id(),
                request_type = request.request_type().as_str(),
                status = ?request.status(),
                "approval request opened"
            );
        }
        self.sync_exceptions(&request)?;
        Ok(Submission::Routed(request.status()))
    }

    fn pre_decide(&self, request: &mut ApprovalRequest) -> Result<(), WorkflowError> {
        let facts = request.facts();
        let Some(rule) = self.rules.evaluate(&facts) else {
            request.mark_pending()?;
            return Ok(());
        };

        let notes = (!rule.description.is_empty()).then(|| rule.description.clone());
        let decision = Decision::new(rule.then.outcome(), Actor::rule(rule.id.clone()), notes);
        if let Err(err) = request.apply(decision) {
            tracing::warn!(
                request_id = %request.id(),
                rule_id = %rule.id,
                error = %err,
                "rule decision rejected; leaving request for a human"
            );
            request.mark_pending()?;
        }
        Ok(())
    }

    /// Record a decision on an open request.
    pub fn decide(
        &self,
        request_id: &RequestId,
        outcome: Outcome,
        actor: Actor,
        notes: Option<String>,
    ) -> Result<ApprovalRequest, WorkflowError> {
        let decision = Decision::new(outcome, actor, notes);
        let request = self.store.apply_decision(request_id, decision)?;
        tracing::info!(
            run_id = %request.run_id(),
            request_id = %request_id,
            status = ?request.status(),
            "approval decision recorded"
        );
        self.sync_exceptions(&request)?;
        Ok(request)
    }

    /// Bring the request's exceptions in line with its status.
    pub fn sync_exceptions(&self, request: &ApprovalRequest) -> Result<(), WorkflowError> {
        let target = match request.status() {
            ApprovalStatus::Approved => ExceptionStatus::Resolved,
            ApprovalStatus::Rejected => ExceptionStatus::Ignored,
            ApprovalStatus::Escalated => ExceptionStatus::Escalated,
            ApprovalStatus::New | ApprovalStatus::Pending => return Ok(()),
        };
        let (actor, notes, at) = match request.decisions().last() {
            Some(d) => (d.actor.to_string(), d.notes.clone(), d.decided_at),
            None => return Ok(()),
        };

        for exception_id in request.exception_ids() {
            let Some(mut exception) = self.store.exception(exception_id)? else {
                return Err(DecisionStoreError::NotFound(format!("exception {exception_id}")).into());
            };
            if exception.status() == target || !exception.status().can_transition_to(target) {
                continue;
            }
            exception.transition(target, actor.clone(), notes.clone(), at)?;
            self.store.update_exception(&exception)?;
        }
        Ok(())
    }

    /// Re-sync every request of a run; repairs a crash between deciding and syncing.
    pub fn reconcile(&self, run_id: RunId) -> Result<(), WorkflowError> {
        for request in self.store.approval_requests(run_id)? {
            self.sync_exceptions(&request)?;
        }
        Ok(())
    }

    pub fn pending(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, WorkflowError> {
        Ok(self.store.read_pending(run_id)?)
    }

    pub fn summary(&self, run_id: RunId) -> Result<ApprovalSummary, WorkflowError> {
        let mut summary = ApprovalSummary::default();
        for request in self.store.approval_requests(run_id)? {
            summary.total += 1;
            match request.status() {
                ApprovalStatus::New | ApprovalStatus::Pending => summary.pending += 1,
                ApprovalStatus::Escalated => summary.escalated += 1,
                ApprovalStatus::Approved => summary.approved += 1,
                ApprovalStatus::Rejected => summary.rejected += 1,
            }
            if request.status().is_decided() && request.auto_decided() {
                summary.auto_decided += 1;
            }
        }
        Ok(summary)
    }
}
