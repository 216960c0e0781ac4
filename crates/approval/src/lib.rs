//! `gstflow-approval`: the system/human decision workflow.
//!
//! Approval-routed exceptions become [`ApprovalRequest`]s. A versioned
//! [`RuleSet`] gets the first word (approve, reject or escalate); anything no
//! rule matches waits for a human. Decided requests are immutable.

pub mod request;
pub mod rules;
pub mod store;
pub mod workflow;

pub use request::{Actor, ApprovalRequest, ApprovalStatus, Decision, Outcome, Priority};
pub use rules::{Condition, Rule, RuleAction, RuleSet, RuleSetError};
pub use store::{DecisionStore, DecisionStoreError};
pub use workflow::{ApprovalSummary, ApprovalWorkflow, Submission, WorkflowError};
