use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use gstflow_approval::{ApprovalRequest, Decision, DecisionStore, DecisionStoreError};
use gstflow_core::{Entity, ExceptionId, RequestId, RunId};
use gstflow_exceptions::Exception;

#[derive(Debug, Default)]
struct Tables {
    exceptions: HashMap<ExceptionId, Exception>,
    exception_order: Vec<ExceptionId>,
    requests: HashMap<RequestId, ApprovalRequest>,
    request_order: Vec<RequestId>,
}

/// In-memory exception and approval store.
///
/// Intended for tests/dev. `apply_decision` validates and writes under one
/// write lock, which is what serializes concurrent deciders.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    tables: RwLock<Tables>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, DecisionStoreError> {
        self.tables
            .read()
            .map_err(|_| DecisionStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, DecisionStoreError> {
        self.tables
            .write()
            .map_err(|_| DecisionStoreError::Storage("lock poisoned".to_string()))
    }
}

impl DecisionStore for InMemoryDecisionStore {
    fn append_exception(&self, exception: &Exception) -> Result<bool, DecisionStoreError> {
        let mut tables = self.write()?;
        let id = *exception.id();
        if tables.exceptions.contains_key(&id) {
            return Ok(false);
        }
        tables.exceptions.insert(id, exception.clone());
        tables.exception_order.push(id);
        Ok(true)
    }

    fn update_exception(&self, exception: &Exception) -> Result<(), DecisionStoreError> {
        let mut tables = self.write()?;
        match tables.exceptions.get_mut(exception.id()) {
            Some(stored) => {
                *stored = exception.clone();
                Ok(())
            }
            None => Err(DecisionStoreError::NotFound(format!("exception {}", exception.id()))),
        }
    }

    fn exception(&self, id: &ExceptionId) -> Result<Option<Exception>, DecisionStoreError> {
        Ok(self.read()?.exceptions.get(id).cloned())
    }

    fn exceptions(&self, run_id: RunId) -> Result<Vec<Exception>, DecisionStoreError> {
        let tables = self.read()?;
        Ok(tables
            .exception_order
            .iter()
            .filter_map(|id| tables.exceptions.get(id))
            .filter(|e| e.run_id() == run_id)
            .cloned()
            .collect())
    }

    fn append_approval_request(&self, request: &ApprovalRequest) -> Result<bool, DecisionStoreError> {
        let mut tables = self.write()?;
        let id = *request.id();
        if tables.requests.contains_key(&id) {
            return Ok(false);
        }
        tables.requests.insert(id, request.clone());
        tables.request_order.push(id);
        Ok(true)
    }

    fn approval_request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, DecisionStoreError> {
        Ok(self.read()?.requests.get(id).cloned())
    }

    fn approval_requests(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, DecisionStoreError> {
        let tables = self.read()?;
        Ok(tables
            .request_order
            .iter()
            .filter_map(|id| tables.requests.get(id))
            .filter(|r| r.run_id() == run_id)
            .cloned()
            .collect())
    }

    fn read_pending(&self, run_id: RunId) -> Result<Vec<ApprovalRequest>, DecisionStoreError> {
        Ok(self
            .approval_requests(run_id)?
            .into_iter()
            .filter(|r| r.status().is_open())
            .collect())
    }

    fn apply_decision(
        &self,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<ApprovalRequest, DecisionStoreError> {
        let mut tables = self.write()?;
        let stored = tables
            .requests
            .get_mut(request_id)
            .ok_or_else(|| DecisionStoreError::NotFound(format!("approval request {request_id}")))?;

        // Decide on a copy so a rejected decision leaves the stored request untouched.
        let mut updated = stored.clone();
        updated.apply(decision)?;
        *stored = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gstflow_approval::{Actor, ApprovalStatus, ApprovalWorkflow, Outcome, RuleSet, Submission};
    use gstflow_core::{Channel, DomainError, Gstin, Month, NormalizedRecord, TransactionId};
    use gstflow_exceptions::{ErrorCode, ExceptionStatus, Finding, RecordType};
    use std::sync::Arc;

    fn run_id() -> RunId {
        RunId::derive(&["decision-store-tests"])
    }

    fn record() -> NormalizedRecord {
        NormalizedRecord::new(
            TransactionId::new("404-1").unwrap(),
            Channel::AmazonMtr,
            Gstin::parse("33ABCDE1234F1Z5").unwrap(),
            Month::parse("2024-04").unwrap(),
        )
    }

    fn exception(code: ErrorCode) -> Exception {
        let finding = Finding::new(code, RecordType::Transaction, "404-1", "test finding");
        Exception::raise(run_id(), finding, Utc::now())
    }

    fn workflow(rules: RuleSet) -> ApprovalWorkflow<Arc<InMemoryDecisionStore>> {
        ApprovalWorkflow::new(Arc::new(InMemoryDecisionStore::new()), rules)
    }

    #[test]
    fn submit_is_idempotent() {
        let wf = workflow(RuleSet::empty(1));
        let exc = exception(ErrorCode::MissingLedger);

        assert_eq!(
            wf.submit(exc.clone(), Some(&record())).unwrap(),
            Submission::Routed(ApprovalStatus::Pending)
        );
        assert_eq!(wf.submit(exc, Some(&record())).unwrap(), Submission::Known);
        assert_eq!(wf.store().approval_requests(run_id()).unwrap().len(), 1);
        assert_eq!(wf.store().exceptions(run_id()).unwrap().len(), 1);
    }

    #[test]
    fn non_routed_exceptions_are_only_recorded() {
        let wf = workflow(RuleSet::default_rules());
        assert_eq!(
            wf.submit(exception(ErrorCode::MissingData), None).unwrap(),
            Submission::Recorded
        );
        assert!(wf.pending(run_id()).unwrap().is_empty());
    }

    #[test]
    fn rules_pre_decide_requests() {
        let wf = workflow(RuleSet::default_rules());
        let submission = wf.submit(exception(ErrorCode::InvalidGstRate), Some(&record())).unwrap();
        assert_eq!(submission, Submission::Routed(ApprovalStatus::Escalated));

        let stored = wf.store().exceptions(run_id()).unwrap();
        assert_eq!(stored[0].status(), ExceptionStatus::Escalated);
        assert_eq!(wf.pending(run_id()).unwrap().len(), 1);
    }

    #[test]
    fn human_decision_resolves_linked_exceptions() {
        let wf = workflow(RuleSet::empty(1));
        let exc = exception(ErrorCode::MissingLedger);
        wf.submit(exc.clone(), Some(&record())).unwrap();
        let request_id = ApprovalRequest::id_for(exc.id());

        let overrides = gstflow_core::RecordOverrides {
            ledger_name: Some("Amazon Sales TN".into()),
            ..Default::default()
        };
        let decided = wf
            .decide(&request_id, Outcome::approve_with(overrides), Actor::human("asha"), None)
            .unwrap();
        assert_eq!(decided.status(), ApprovalStatus::Approved);

        let stored = wf.store().exception(exc.id()).unwrap().unwrap();
        assert_eq!(stored.status(), ExceptionStatus::Resolved);
        assert_eq!(stored.resolution().unwrap().resolved_by, "asha");

        let summary = wf.summary(run_id()).unwrap();
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.auto_decided, 0);
    }

    #[test]
    fn decided_requests_cannot_be_decided_again() {
        let wf = workflow(RuleSet::empty(1));
        let exc = exception(ErrorCode::ZeroQuantity);
        wf.submit(exc.clone(), Some(&record())).unwrap();
        let request_id = ApprovalRequest::id_for(exc.id());

        wf.decide(&request_id, Outcome::Reject, Actor::human("asha"), None).unwrap();
        let err = wf
            .decide(&request_id, Outcome::approve(), Actor::human("ravi"), None)
            .unwrap_err();
        assert!(matches!(
            err,
            gstflow_approval::WorkflowError::Store(DecisionStoreError::Domain(
                DomainError::IllegalTransition { .. }
            ))
        ));

        let stored = wf.store().approval_request(&request_id).unwrap().unwrap();
        assert_eq!(stored.status(), ApprovalStatus::Rejected);
        assert_eq!(stored.decisions().len(), 1);
    }

    #[test]
    fn concurrent_deciders_close_a_request_once() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let wf = ApprovalWorkflow::new(store.clone(), RuleSet::empty(1));
        let exc = exception(ErrorCode::NegativeAmount);
        wf.submit(exc.clone(), Some(&record())).unwrap();
        let request_id = ApprovalRequest::id_for(exc.id());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let outcome = if i % 2 == 0 { Outcome::approve() } else { Outcome::Reject };
                    store
                        .apply_decision(&request_id, Decision::new(outcome, Actor::human(format!("r{i}")), None))
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);

        let stored = store.approval_request(&request_id).unwrap().unwrap();
        assert_eq!(stored.decisions().len(), 1);
    }
}
