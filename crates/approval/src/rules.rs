//! Auto-resolution rules.
//!
//! A rule set is an ordered, versioned list of `when → then` rules loaded from
//! JSON once per run. The first matching rule decides; no match means the
//! request waits for a human.
//!
//! ```json
//! { "version": 1, "rules": [
//!   { "id": "escalate-rate-overrides",
//!     "when": { "op": "equals", "field": "request_type", "value": "gst_rate_override" },
//!     "then": { "action": "escalate" } }
//! ] }
//! ```
//!
//! Fields are dotted paths into [`crate::ApprovalRequest::facts`], e.g.
//! `payload.taxable_value`.

use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use gstflow_core::RecordOverrides;

use crate::request::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Always,
    Equals { field: String, value: JsonValue },
    GreaterThan { field: String, value: Decimal },
    InSet { field: String, values: Vec<JsonValue> },
    And { all: Vec<Condition> },
    Or { any: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn evaluate(&self, facts: &JsonValue) -> bool {
        match self {
            Condition::Always => true,
            Condition::Equals { field, value } => {
                lookup(facts, field).is_some_and(|actual| same_value(actual, value))
            }
            Condition::GreaterThan { field, value } => lookup(facts, field)
                .and_then(as_decimal)
                .is_some_and(|actual| actual > *value),
            Condition::InSet { field, values } => lookup(facts, field)
                .is_some_and(|actual| values.iter().any(|v| same_value(actual, v))),
            Condition::And { all } => all.iter().all(|c| c.evaluate(facts)),
            Condition::Or { any } => any.iter().any(|c| c.evaluate(facts)),
            Condition::Not { condition } => !condition.evaluate(facts),
        }
    }
}

fn lookup<'a>(facts: &'a JsonValue, field: &str) -> Option<&'a JsonValue> {
    field
        .split('.')
        .try_fold(facts, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}

/// Decimal view of a fact; amounts travel as strings.
fn as_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::String(s) => Decimal::from_str(s.trim()).ok(),
        JsonValue::Number(n) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok()
        }
        _ => None,
    }
}

fn same_value(actual: &JsonValue, expected: &JsonValue) -> bool {
    if actual == expected {
        return true;
    }
    match (as_decimal(actual), as_decimal(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleAction {
    Approve {
        #[serde(default)]
        overrides: RecordOverrides,
    },
    Reject,
    Escalate,
}

impl RuleAction {
    pub fn outcome(&self) -> Outcome {
        match self {
            RuleAction::Approve { overrides } => Outcome::approve_with(overrides.clone()),
            RuleAction::Reject => Outcome::Reject,
            RuleAction::Escalate => Outcome::Escalate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub when: Condition,
    pub then: RuleAction,
}

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("rule set is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rule ids must not be empty")]
    EmptyRuleId,

    #[error("duplicate rule id '{0}'")]
    DuplicateRuleId(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// A rule set that never decides anything.
    pub fn empty(version: u32) -> Self {
        Self {
            version,
            rules: Vec::new(),
        }
    }

    /// Built-in rules:
    /// GST rate changes always go to a senior reviewer, and zero-quantity
    /// lines with no positive taxable value are rejected as noise.
    pub fn default_rules() -> Self {
        Self {
            version: 1,
            rules: vec![
                Rule {
                    id: "escalate-rate-overrides".into(),
                    description: "GST rate changes need a senior reviewer".into(),
                    when: Condition::Equals {
                        field: "request_type".into(),
                        value: JsonValue::from("gst_rate_override"),
                    },
                    then: RuleAction::Escalate,
                },
                Rule {
                    id: "reject-empty-zero-quantity".into(),
                    description: "zero-quantity lines without value carry nothing to post".into(),
                    when: Condition::And {
                        all: vec![
                            Condition::Equals {
                                field: "error_code".into(),
                                value: JsonValue::from("DAT-002"),
                            },
                            Condition::Not {
                                condition: Box::new(Condition::GreaterThan {
                                    field: "payload.taxable_value".into(),
                                    value: Decimal::ZERO,
                                }),
                            },
                        ],
                    },
                    then: RuleAction::Reject,
                },
            ],
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RuleSetError> {
        let set: RuleSet = serde_json::from_str(raw)?;
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), RuleSetError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(RuleSetError::EmptyRuleId);
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleSetError::DuplicateRuleId(rule.id.clone()));
            }
        }
        Ok(())
    }

    /// First rule whose condition holds.
    pub fn evaluate(&self, facts: &JsonValue) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.when.evaluate(facts))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn facts() -> JsonValue {
        json!({
            "request_type": "data_correction",
            "error_code": "DAT-002",
            "severity": "warning",
            "channel": "flipkart",
            "payload": { "taxable_value": "0.00", "quantity": 0, "state_code": "KA" }
        })
    }

    #[test]
    fn conditions_walk_dotted_paths() {
        let f = facts();
        let eq = Condition::Equals {
            field: "payload.state_code".into(),
            value: json!("KA"),
        };
        assert!(eq.evaluate(&f));

        let missing = Condition::Equals {
            field: "payload.ledger_name".into(),
            value: JsonValue::Null,
        };
        assert!(!missing.evaluate(&f));
    }

    #[test]
    fn numeric_comparisons_accept_string_amounts() {
        let f = facts();
        let gt = |v| Condition::GreaterThan {
            field: "payload.taxable_value".into(),
            value: v,
        };
        assert!(!gt(dec!(0)).evaluate(&f));
        assert!(gt(dec!(-1)).evaluate(&f));

        let eq = Condition::Equals {
            field: "payload.taxable_value".into(),
            value: json!(0),
        };
        assert!(eq.evaluate(&f));
    }

    #[test]
    fn combinators_compose() {
        let f = facts();
        let in_set = Condition::InSet {
            field: "channel".into(),
            values: vec![json!("amazon_mtr"), json!("flipkart")],
        };
        let and = Condition::And {
            all: vec![in_set.clone(), Condition::Always],
        };
        let or = Condition::Or {
            any: vec![
                Condition::Not {
                    condition: Box::new(Condition::Always),
                },
                in_set,
            ],
        };
        assert!(and.evaluate(&f));
        assert!(or.evaluate(&f));
        assert!(Condition::And { all: vec![] }.evaluate(&f));
        assert!(!Condition::Or { any: vec![] }.evaluate(&f));
    }

    #[test]
    fn first_matching_rule_wins() {
        let set = RuleSet::from_json_str(
            r#"{
                "version": 3,
                "rules": [
                    { "id": "never", "when": { "op": "equals", "field": "channel", "value": "pepperfry" },
                      "then": { "action": "reject" } },
                    { "id": "zero-qty", "when": { "op": "equals", "field": "error_code", "value": "DAT-002" },
                      "then": { "action": "approve" } },
                    { "id": "catch-all", "when": { "op": "always" }, "then": { "action": "escalate" } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(set.version, 3);
        let rule = set.evaluate(&facts()).unwrap();
        assert_eq!(rule.id, "zero-qty");
        assert_eq!(rule.then.outcome(), Outcome::approve());
    }

    #[test]
    fn approve_rules_can_carry_corrections() {
        let set = RuleSet::from_json_str(
            r#"{ "version": 1, "rules": [
                { "id": "ka-ledger", "when": { "op": "equals", "field": "payload.state_code", "value": "KA" },
                  "then": { "action": "approve", "overrides": { "ledger_name": "Flipkart Sales KA" } } }
            ] }"#,
        )
        .unwrap();
        let Some(Rule { then: RuleAction::Approve { overrides }, .. }) = set.evaluate(&facts()) else {
            panic!("expected an approve rule");
        };
        assert_eq!(overrides.ledger_name.as_deref(), Some("Flipkart Sales KA"));
    }

    #[test]
    fn malformed_rule_sets_are_rejected() {
        assert!(matches!(RuleSet::from_json_str("{"), Err(RuleSetError::Parse(_))));
        let dup = r#"{ "version": 1, "rules": [
            { "id": "a", "when": { "op": "always" }, "then": { "action": "reject" } },
            { "id": "a", "when": { "op": "always" }, "then": { "action": "reject" } }
        ] }"#;
        assert!(matches!(RuleSet::from_json_str(dup), Err(RuleSetError::DuplicateRuleId(id)) if id == "a"));
    }

    #[test]
    fn default_rules_escalate_rates_and_reject_empty_lines() {
        let set = RuleSet::default_rules();
        let rate = json!({ "request_type": "gst_rate_override", "error_code": "GST-001" });
        assert_eq!(set.evaluate(&rate).unwrap().then, RuleAction::Escalate);

        assert_eq!(set.evaluate(&facts()).unwrap().then, RuleAction::Reject);

        let valued = json!({ "request_type": "data_correction", "error_code": "DAT-002",
                             "payload": { "taxable_value": "120.00" } });
        assert!(set.evaluate(&valued).is_none());
    }

    #[test]
    fn default_rules_survive_serialization() {
        let raw = serde_json::to_string(&RuleSet::default_rules()).unwrap();
        assert_eq!(RuleSet::from_json_str(&raw).unwrap(), RuleSet::default_rules());
    }
}
