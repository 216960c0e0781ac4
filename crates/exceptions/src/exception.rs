//! The exception entity and its status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use gstflow_core::{DomainError, DomainResult, Entity, ExceptionId, RunId};

use crate::catalog::{ErrorCode, RequestType, Severity};

/// What an exception is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Transaction,
    Invoice,
    Run,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Transaction => "transaction",
            RecordType::Invoice => "invoice",
            RecordType::Run => "run",
        }
    }
}

/// Exception lifecycle.
///
/// - `Pending`: awaiting an approval decision.
/// - `Escalated`: awaiting a senior decision, or needs code-level remediation
///   (critical exceptions start here).
/// - `Resolved`: corrected or accepted; the record may proceed.
/// - `Ignored`: closed without correction; the record stays excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionStatus {
    Pending,
    Resolved,
    Ignored,
    Escalated,
}

impl ExceptionStatus {
    pub fn can_transition_to(self, to: ExceptionStatus) -> bool {
        use ExceptionStatus::*;
        matches!(
            (self, to),
            (Pending, Resolved) | (Pending, Ignored) | (Pending, Escalated)
                | (Escalated, Resolved)
                | (Escalated, Ignored)
        )
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ExceptionStatus::Resolved | ExceptionStatus::Ignored)
    }
}

/// Who closed an exception, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_by: String,
    pub notes: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

/// A detector observation, before it is bound to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub code: ErrorCode,
    pub record_type: RecordType,
    pub record_id: String,
    pub message: String,
    pub details: JsonValue,
    /// The offending value(s); part of the exception identity, so a corrected
    /// value that is still wrong raises a new exception.
    pub fingerprint: String,
}

impl Finding {
    pub fn new(
        code: ErrorCode,
        record_type: RecordType,
        record_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            record_type,
            record_id: record_id.into(),
            message: message.into(),
            details: JsonValue::Null,
            fingerprint: String::new(),
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Deterministic identity of the exception this finding raises in a run.
    pub fn exception_id(&self, run_id: RunId) -> ExceptionId {
        ExceptionId::derive(&[
            &run_id.to_string(),
            self.code.as_str(),
            self.record_type.as_str(),
            &self.record_id,
            &self.fingerprint,
        ])
    }
}

/// A persisted anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    id: ExceptionId,
    run_id: RunId,
    record_type: RecordType,
    record_id: String,
    error_code: ErrorCode,
    severity: Severity,
    status: ExceptionStatus,
    requires_approval: bool,
    message: String,
    details: JsonValue,
    resolution: Option<Resolution>,
    created_at: DateTime<Utc>,
}

impl Exception {
    /// Bind a finding to a run.
    ///
    /// Approval-routed findings start `Pending`, critical ones `Escalated`.
    /// Everything else is closed on arrival as `Ignored`: informational ones
    /// never block, the rest exclude their record without blocking the run.
    pub fn raise(run_id: RunId, finding: Finding, created_at: DateTime<Utc>) -> Self {
        let severity = finding.severity();
        let requires_approval = finding.code.requires_approval();
        let status = if requires_approval {
            ExceptionStatus::Pending
        } else if severity == Severity::Critical {
            ExceptionStatus::Escalated
        } else {
            ExceptionStatus::Ignored
        };

        Self {
            id: finding.exception_id(run_id),
            run_id,
            record_type: finding.record_type,
            record_id: finding.record_id,
            error_code: finding.code,
            severity,
            status,
            requires_approval,
            message: finding.message,
            details: finding.details,
            resolution: None,
            created_at,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> ExceptionStatus {
        self.status
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn request_type(&self) -> Option<RequestType> {
        self.error_code.request_type()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &JsonValue {
        &self.details
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Whether this exception keeps its record out of aggregation.
    pub fn blocks_record(&self) -> bool {
        self.severity != Severity::Info && self.status != ExceptionStatus::Resolved
    }

    /// Move along the status table, recording who closed it.
    pub fn transition(
        &mut self,
        to: ExceptionStatus,
        actor: impl Into<String>,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::illegal_transition("exception", self.status, to));
        }
        self.status = to;
        if to.is_closed() {
            self.resolution = Some(Resolution {
                resolved_by: actor.into(),
                notes,
                resolved_at: at,
            });
        }
        Ok(())
    }
}

impl Entity for Exception {
    type Id = ExceptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
