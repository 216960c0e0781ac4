//! Approval requests and their decision lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use gstflow_core::{
    DomainError, DomainResult, Entity, ExceptionId, GstRate, NormalizedRecord, RecordOverrides,
    RequestId, RunId, StateCode,
};
use gstflow_exceptions::{Exception, RequestType, Severity};

/// Request lifecycle.
///
/// ```text
/// New ──rules──▶ Approved | Rejected | Escalated | Pending
/// Pending ──human──▶ Approved | Rejected | Escalated
/// Escalated ──human──▶ Approved | Rejected
/// ```
/// `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    New,
    Pending,
    Approved,
    Rejected,
    Escalated,
}

impl ApprovalStatus {
    pub fn can_transition_to(self, to: ApprovalStatus) -> bool {
        use ApprovalStatus::*;
        matches!(
            (self, to),
            (New, Pending)
                | (New, Approved)
                | (New, Rejected)
                | (New, Escalated)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Escalated)
                | (Escalated, Approved)
                | (Escalated, Rejected)
        )
    }

    pub fn is_decided(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }

    /// Waiting on someone: blocks the run.
    pub fn is_open(self) -> bool {
        matches!(self, ApprovalStatus::Pending | ApprovalStatus::Escalated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Info => Priority::Low,
            Severity::Warning => Priority::Medium,
            Severity::Error => Priority::High,
            Severity::Critical => Priority::Urgent,
        }
    }

    pub fn raised(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Urgent => Priority::Urgent,
        }
    }
}

/// Who made a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// An auto-resolution rule.
    System { rule_id: String },
    Human { name: String },
}

impl Actor {
    pub fn human(name: impl Into<String>) -> Self {
        Actor::Human { name: name.into() }
    }

    pub fn rule(rule_id: impl Into<String>) -> Self {
        Actor::System {
            rule_id: rule_id.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System { .. })
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::System { rule_id } => write!(f, "system:{rule_id}"),
            Actor::Human { name } => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Approve {
        #[serde(default)]
        overrides: RecordOverrides,
    },
    Reject,
    Escalate,
}

impl Outcome {
    pub fn approve() -> Self {
        Outcome::Approve {
            overrides: RecordOverrides::default(),
        }
    }

    pub fn approve_with(overrides: RecordOverrides) -> Self {
        Outcome::Approve { overrides }
    }

    fn target(&self) -> ApprovalStatus {
        match self {
            Outcome::Approve { .. } => ApprovalStatus::Approved,
            Outcome::Reject => ApprovalStatus::Rejected,
            Outcome::Escalate => ApprovalStatus::Escalated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub actor: Actor,
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(outcome: Outcome, actor: Actor, notes: Option<String>) -> Self {
        Self {
            outcome,
            actor,
            notes,
            decided_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    id: RequestId,
    run_id: RunId,
    request_type: RequestType,
    record_id: String,
    payload: JsonValue,
    context: JsonValue,
    priority: Priority,
    status: ApprovalStatus,
    exception_ids: Vec<ExceptionId>,
    decisions: Vec<Decision>,
    created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Identifier of the request raised for an exception.
    pub fn id_for(exception_id: &ExceptionId) -> RequestId {
        RequestId::derive(&[&exception_id.to_string()])
    }

    /// Open a `New` request for an approval-routed exception.
    ///
    /// The payload carries the exception details and, when known, the record
    /// as it stood when the exception was raised.
    pub fn for_exception(
        exception: &Exception,
        record: Option<&NormalizedRecord>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let request_type = exception.request_type().ok_or_else(|| {
            DomainError::validation(format!(
                "{} does not route to approval",
                exception.error_code()
            ))
        })?;

        let mut payload = serde_json::to_value(record)
            .map_err(|e| DomainError::invariant(format!("record is not serializable: {e}")))?;
        if let JsonValue::Object(map) = &mut payload {
            map.insert("details".into(), exception.details().clone());
        } else {
            payload = json!({ "details": exception.details() });
        }

        let context = json!({
            "error_code": exception.error_code(),
            "severity": exception.severity(),
            "message": exception.message(),
            "record_type": exception.record_type(),
        });

        Ok(Self {
            id: Self::id_for(exception.id()),
            run_id: exception.run_id(),
            request_type,
            record_id: exception.record_id().to_string(),
            payload,
            context,
            priority: Priority::from_severity(exception.severity()),
            status: ApprovalStatus::New,
            exception_ids: vec![*exception.id()],
            decisions: Vec::new(),
            created_at,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn context(&self) -> &JsonValue {
        &self.context
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn exception_ids(&self) -> &[ExceptionId] {
        &self.exception_ids
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The decision that closed the request, if any.
    pub fn final_decision(&self) -> Option<&Decision> {
        if self.status.is_decided() {
            self.decisions.last()
        } else {
            None
        }
    }

    /// Corrections to apply to the record once approved.
    pub fn approved_overrides(&self) -> Option<&RecordOverrides> {
        match self.final_decision().map(|d| &d.outcome) {
            Some(Outcome::Approve { overrides }) => Some(overrides),
            _ => None,
        }
    }

    /// Decided by a rule rather than a person.
    pub fn auto_decided(&self) -> bool {
        self.decisions.first().is_some_and(|d| d.actor.is_system())
            && self.decisions.iter().all(|d| d.actor.is_system())
            && self.status != ApprovalStatus::Pending
    }

    /// Rule facts: the flattened view conditions are evaluated against.
    pub fn facts(&self) -> JsonValue {
        json!({
            "request_type": self.request_type,
            "priority": self.priority,
            "record_id": self.record_id,
            "error_code": self.context.get("error_code"),
            "severity": self.context.get("severity"),
            "channel": self.payload.get("channel"),
            "payload": self.payload,
        })
    }

    /// Nobody decided; wait for a human.
    pub fn mark_pending(&mut self) -> DomainResult<()> {
        self.move_to(ApprovalStatus::Pending)
    }

    /// Apply a decision along the transition table.
    ///
    /// Approvals must carry the correction their request type needs, and any
    /// correction they carry must itself be valid.
    pub fn apply(&mut self, decision: Decision) -> DomainResult<()> {
        let target = decision.outcome.target();
        if !self.status.can_transition_to(target) {
            return Err(DomainError::illegal_transition("approval request", self.status, target));
        }
        if let Outcome::Approve { overrides } = &decision.outcome {
            validate_overrides(self.request_type, overrides)?;
        }
        if target == ApprovalStatus::Escalated {
            self.priority = self.priority.raised();
        }
        self.status = target;
        self.decisions.push(decision);
        Ok(())
    }

    fn move_to(&mut self, to: ApprovalStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::illegal_transition("approval request", self.status, to));
        }
        self.status = to;
        Ok(())
    }
}

impl Entity for ApprovalRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_overrides(request_type: RequestType, overrides: &RecordOverrides) -> DomainResult<()> {
    if let Some(rate) = overrides.gst_rate {
        GstRate::try_new(rate)?;
    }
    if let Some(state) = &overrides.state_code {
        if StateCode::classify(state).is_none() {
            return Err(DomainError::validation(format!("override state '{state}' is not classifiable")));
        }
    }

    let provided = match request_type {
        RequestType::ItemMapping => present(overrides.fg_name.as_deref()),
        RequestType::LedgerMapping => present(overrides.ledger_name.as_deref()),
        RequestType::JurisdictionMapping => overrides.state_code.is_some(),
        RequestType::GstRateOverride => overrides.gst_rate.is_some(),
        RequestType::DataCorrection => true,
    };
    if !provided {
        return Err(DomainError::validation(format!(
            "approving a {} request requires the corrected value",
            request_type.as_str()
        )));
    }
    Ok(())
}

fn present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gstflow_core::{Channel, Gstin, Month, TransactionId};
    use gstflow_exceptions::{ErrorCode, Finding, RecordType};
    use rust_decimal_macros::dec;

    fn record() -> NormalizedRecord {
        let mut r = NormalizedRecord::new(
            TransactionId::new("408-1").unwrap(),
            Channel::AmazonMtr,
            Gstin::parse("33ABCDE1234F1Z5").unwrap(),
            Month::parse("2024-04").unwrap(),
        );
        r.taxable_value = Some(dec!(250));
        r
    }

    fn request(code: ErrorCode) -> ApprovalRequest {
        let finding = Finding::new(code, RecordType::Transaction, "408-1", "test");
        let exception = Exception::raise(RunId::new(), finding, Utc::now());
        ApprovalRequest::for_exception(&exception, Some(&record()), Utc::now()).unwrap()
    }

    #[test]
    fn request_mirrors_its_exception() {
        let req = request(ErrorCode::MissingLedger);
        assert_eq!(req.status(), ApprovalStatus::New);
        assert_eq!(req.request_type(), RequestType::LedgerMapping);
        assert_eq!(req.priority(), Priority::Medium);
        assert_eq!(req.exception_ids().len(), 1);
        assert_eq!(req.id(), &ApprovalRequest::id_for(&req.exception_ids()[0]));
        assert_eq!(req.payload()["transaction_id"], "408-1");
        assert_eq!(req.facts()["error_code"], "LED-001");
        assert_eq!(req.facts()["channel"], "amazon_mtr");
    }

    #[test]
    fn non_routed_exceptions_cannot_open_requests() {
        let finding = Finding::new(ErrorCode::MissingData, RecordType::Transaction, "x", "gap");
        let exception = Exception::raise(RunId::new(), finding, Utc::now());
        assert!(ApprovalRequest::for_exception(&exception, None, Utc::now()).is_err());
    }

    #[test]
    fn decided_requests_are_immutable() {
        let mut req = request(ErrorCode::ZeroQuantity);
        req.mark_pending().unwrap();
        req.apply(Decision::new(Outcome::Reject, Actor::human("asha"), None))
            .unwrap();
        assert_eq!(req.status(), ApprovalStatus::Rejected);

        for outcome in [Outcome::approve(), Outcome::Reject, Outcome::Escalate] {
            let err = req
                .apply(Decision::new(outcome, Actor::human("ravi"), None))
                .unwrap_err();
            assert!(matches!(err, DomainError::IllegalTransition { .. }));
        }
        assert_eq!(req.decisions().len(), 1);
    }

    #[test]
    fn escalation_raises_priority_then_allows_a_decision() {
        let mut req = request(ErrorCode::ZeroQuantity);
        req.mark_pending().unwrap();
        req.apply(Decision::new(Outcome::Escalate, Actor::human("asha"), None))
            .unwrap();
        assert_eq!(req.priority(), Priority::High);
        assert!(req.status().is_open());

        assert!(req
            .apply(Decision::new(Outcome::Escalate, Actor::human("asha"), None))
            .is_err());
        req.apply(Decision::new(Outcome::approve(), Actor::human("cfo"), None))
            .unwrap();
        assert!(req.status().is_decided());
        assert_eq!(req.approved_overrides(), Some(&RecordOverrides::default()));
    }

    #[test]
    fn approvals_must_carry_the_needed_correction() {
        let mut req = request(ErrorCode::MissingLedger);
        req.mark_pending().unwrap();
        let err = req
            .apply(Decision::new(Outcome::approve(), Actor::human("asha"), None))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(req.status(), ApprovalStatus::Pending);

        let fix = RecordOverrides {
            ledger_name: Some("Amazon Sales TN".into()),
            ..RecordOverrides::default()
        };
        req.apply(Decision::new(Outcome::approve_with(fix.clone()), Actor::human("asha"), None))
            .unwrap();
        assert_eq!(req.approved_overrides(), Some(&fix));
    }

    #[test]
    fn rate_overrides_must_be_allowed_slabs() {
        let mut req = request(ErrorCode::InvalidGstRate);
        req.mark_pending().unwrap();
        let bad = RecordOverrides {
            gst_rate: Some(dec!(0.15)),
            ..RecordOverrides::default()
        };
        assert!(req
            .apply(Decision::new(Outcome::approve_with(bad), Actor::human("asha"), None))
            .is_err());
    }

    #[test]
    fn auto_decisions_are_attributed_to_rules() {
        let mut req = request(ErrorCode::ZeroQuantity);
        req.apply(Decision::new(Outcome::Reject, Actor::rule("reject-empty"), None))
            .unwrap();
        assert!(req.auto_decided());
        assert_eq!(req.final_decision().unwrap().actor.to_string(), "system:reject-empty");
    }
}
