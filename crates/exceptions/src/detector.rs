//! Detection rules.
//!
//! Rule families, in evaluation order for a record:
//! scope, data completeness, mapping completeness, rate validity, jurisdiction,
//! data quality/range, then computation consistency once a split exists.
//! Run-level and invoice-level families are separate entry points.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde_json::json;

use gstflow_core::{GstRate, Gstin, NormalizedRecord, RunScope, StateCode, round_money};
use gstflow_numbering::{Invoice, InvoiceNo, ScopeKey};
use gstflow_tax::{TaxComputation, TaxEngine, TaxError};

use crate::catalog::ErrorCode;
use crate::exception::{Finding, RecordType};

/// Tunables for range checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Taxable values above this are flagged for review.
    pub max_taxable_value: Decimal,
    /// Tolerated gap between the computed tax and `base × rate`.
    pub computation_tolerance: Decimal,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_taxable_value: Decimal::new(10_000_000_00, 2),
            computation_tolerance: Decimal::new(1, 2),
        }
    }
}

/// Result of inspecting one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInspection {
    pub findings: Vec<Finding>,
    /// Present when every input the tax engine needs was valid.
    pub computation: Option<TaxComputation>,
}

#[derive(Debug, Clone, Default)]
pub struct ExceptionDetector {
    config: DetectorConfig,
    engine: TaxEngine,
}

impl ExceptionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            engine: TaxEngine::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run-level checks: can this filing entity be classified at all?
    pub fn inspect_run(&self, run_id: &str, gstin: &Gstin) -> Vec<Finding> {
        if gstin.home_state().is_some() {
            return Vec::new();
        }
        vec![Finding::new(
            ErrorCode::UnknownHomeState,
            RecordType::Run,
            run_id,
            format!("gstin {gstin} does not start with a known state code"),
        )
        .with_details(json!({ "gstin": gstin.as_str() }))
        .with_fingerprint(gstin.as_str())]
    }

    /// Indices of records whose transaction id already appeared earlier.
    pub fn duplicate_transactions(&self, records: &[NormalizedRecord]) -> HashMap<usize, Finding> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut duplicates = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            let txn = record.transaction_id.as_str();
            let occurrence = seen.entry(txn).or_insert(0);
            *occurrence += 1;
            if *occurrence > 1 {
                duplicates.insert(
                    idx,
                    Finding::new(
                        ErrorCode::DuplicateTransaction,
                        RecordType::Transaction,
                        txn,
                        format!("transaction {txn} appears again at position {idx}"),
                    )
                    .with_details(json!({ "position": idx, "occurrence": *occurrence }))
                    .with_fingerprint(format!("occurrence-{occurrence}")),
                );
            }
        }
        duplicates
    }

    /// Record-level checks, plus the tax split when the record is computable.
    pub fn inspect_record(&self, scope: &RunScope, record: &NormalizedRecord) -> RecordInspection {
        let txn = record.transaction_id.as_str();
        let mut findings = Vec::new();
        let finding = |code: ErrorCode, message: String| {
            Finding::new(code, RecordType::Transaction, txn, message)
        };

        if !scope.contains(record) {
            findings.push(
                finding(
                    ErrorCode::OutOfScopeRecord,
                    format!("record belongs to {}/{}/{}, run is {scope}", record.channel, record.gstin, record.month),
                )
                .with_details(json!({
                    "channel": record.channel,
                    "gstin": record.gstin,
                    "month": record.month,
                }))
                .with_fingerprint(format!("{}/{}/{}", record.channel, record.gstin, record.month)),
            );
            return RecordInspection {
                findings,
                computation: None,
            };
        }

        let mut computable = true;

        match record.taxable_value {
            None => {
                computable = false;
                findings.push(finding(ErrorCode::MissingData, "taxable value is missing".into()));
            }
            Some(value) if value < Decimal::ZERO => findings.push(
                finding(ErrorCode::NegativeAmount, format!("taxable value {value} is negative"))
                    .with_details(json!({ "field": "taxable_value", "value": value }))
                    .with_fingerprint(format!("taxable:{value}")),
            ),
            Some(value) if value > self.config.max_taxable_value => findings.push(
                finding(
                    ErrorCode::ValueOutOfRange,
                    format!("taxable value {value} exceeds {}", self.config.max_taxable_value),
                )
                .with_details(json!({ "value": value, "ceiling": self.config.max_taxable_value }))
                .with_fingerprint(value.to_string()),
            ),
            Some(_) => {}
        }

        if record.shipping_value < Decimal::ZERO {
            findings.push(
                finding(
                    ErrorCode::NegativeAmount,
                    format!("shipping value {} is negative", record.shipping_value),
                )
                .with_details(json!({ "field": "shipping_value", "value": record.shipping_value }))
                .with_fingerprint(format!("shipping:{}", record.shipping_value)),
            );
        }

        if is_blank(record.fg_name.as_deref()) {
            findings.push(finding(ErrorCode::MissingFgMapping, "final-goods name is not mapped".into()));
        }
        if is_blank(record.ledger_name.as_deref()) {
            findings.push(finding(ErrorCode::MissingLedger, "ledger name is not mapped".into()));
        }

        match record.gst_rate {
            None => {
                computable = false;
                findings.push(finding(ErrorCode::MissingGstRate, "gst rate is missing".into()));
            }
            Some(raw) if GstRate::try_new(raw).is_err() => {
                computable = false;
                findings.push(
                    finding(ErrorCode::InvalidGstRate, format!("gst rate {raw} is not an allowed slab"))
                        .with_details(json!({ "gst_rate": raw }))
                        .with_fingerprint(raw.normalize().to_string()),
                );
            }
            Some(_) => {}
        }

        let raw_state = record.state_code.as_deref().unwrap_or("");
        if StateCode::classify(raw_state).is_none() {
            computable = false;
            findings.push(
                finding(
                    ErrorCode::UnclassifiedState,
                    format!("destination state '{raw_state}' cannot be classified"),
                )
                .with_details(json!({ "state_code": record.state_code }))
                .with_fingerprint(raw_state.trim().to_uppercase()),
            );
        }

        if record.quantity == 0 {
            findings.push(finding(ErrorCode::ZeroQuantity, "quantity is zero".into()));
        } else if record.quantity < 0 || record.returned_qty < 0 || record.returned_qty > record.quantity {
            findings.push(
                finding(
                    ErrorCode::DataInconsistency,
                    format!("quantity {} with {} returned", record.quantity, record.returned_qty),
                )
                .with_details(json!({ "quantity": record.quantity, "returned_qty": record.returned_qty }))
                .with_fingerprint(format!("{}/{}", record.quantity, record.returned_qty)),
            );
        }

        if !computable || record.gstin.home_state().is_none() {
            return RecordInspection {
                findings,
                computation: None,
            };
        }

        match self.engine.compute_record(record) {
            Ok(computation) => {
                findings.extend(self.inspect_computation(txn, &computation));
                RecordInspection {
                    findings,
                    computation: Some(computation),
                }
            }
            Err(err) => {
                findings.push(self.tax_error_finding(txn, &err));
                RecordInspection {
                    findings,
                    computation: None,
                }
            }
        }
    }

    /// Consistency guard over a finished split.
    pub fn inspect_computation(&self, record_id: &str, computation: &TaxComputation) -> Vec<Finding> {
        let expected = round_money(computation.tax_base() * computation.gst_rate.value());
        let drift = (computation.total_tax() - expected).abs();
        if computation.legs_consistent() && drift <= self.config.computation_tolerance {
            return Vec::new();
        }
        vec![Finding::new(
            ErrorCode::ComputationMismatch,
            RecordType::Transaction,
            record_id,
            format!("computed tax {} differs from expected {expected}", computation.total_tax()),
        )
        .with_details(json!({
            "cgst": computation.cgst,
            "sgst": computation.sgst,
            "igst": computation.igst,
            "expected_total": expected,
            "is_interstate": computation.is_interstate,
        }))
        .with_fingerprint(format!(
            "{}/{}/{}",
            computation.cgst, computation.sgst, computation.igst
        ))]
    }

    /// Invoice-number collisions and malformed numbers.
    ///
    /// Each invoice is paired with the scope it was requested for; a number
    /// that does not parse back to that scope is malformed even when it
    /// matches the scope stored on the invoice.
    pub fn inspect_invoices(&self, allocations: &[(ScopeKey, Invoice)]) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut owners: HashMap<&InvoiceNo, HashSet<(&ScopeKey, &str)>> = HashMap::new();

        for (scope, invoice) in allocations {
            let entry = owners.entry(invoice.invoice_no()).or_default();
            entry.extend(invoice.transaction_ids().iter().map(|t| (scope, t.as_str())));

            let well_formed = invoice.scope() == scope
                && InvoiceNo::parse(invoice.invoice_no().as_str()).is_ok_and(|parsed| {
                    parsed.channel == scope.channel
                        && parsed.state_code == scope.state_code
                        && parsed.month == scope.month
                        && parsed.sequence_no == invoice.sequence_no()
                });
            if !well_formed {
                findings.push(
                    Finding::new(
                        ErrorCode::InvalidInvoiceFormat,
                        RecordType::Invoice,
                        invoice.invoice_no().as_str(),
                        format!("invoice {} does not match scope {scope}", invoice.invoice_no()),
                    )
                    .with_fingerprint(scope.to_string()),
                );
            }
        }

        let mut collisions: Vec<(&InvoiceNo, Vec<&str>)> = owners
            .into_iter()
            .filter(|(_, txns)| txns.len() > 1)
            .map(|(no, owners)| {
                let mut txns: Vec<&str> = owners.into_iter().map(|(_, txn)| txn).collect();
                txns.sort_unstable();
                (no, txns)
            })
            .collect();
        collisions.sort();

        for (invoice_no, txns) in collisions {
            findings.push(
                Finding::new(
                    ErrorCode::DuplicateInvoice,
                    RecordType::Invoice,
                    invoice_no.as_str(),
                    format!("invoice {invoice_no} issued to {} transactions", txns.len()),
                )
                .with_details(json!({ "transaction_ids": txns }))
                .with_fingerprint(txns.join(",")),
            );
        }
        findings
    }

    fn tax_error_finding(&self, record_id: &str, err: &TaxError) -> Finding {
        let (code, fingerprint) = match err {
            TaxError::RateInvalid(raw) => (ErrorCode::InvalidGstRate, raw.normalize().to_string()),
            TaxError::MissingRate => (ErrorCode::MissingGstRate, String::new()),
            TaxError::MissingTaxableValue => (ErrorCode::MissingData, String::new()),
            TaxError::MissingState => (ErrorCode::UnclassifiedState, String::new()),
            TaxError::UnclassifiedState(raw) => (ErrorCode::UnclassifiedState, raw.trim().to_uppercase()),
            TaxError::UnknownHomeState(gstin) => (ErrorCode::UnknownHomeState, gstin.clone()),
        };
        Finding::new(code, RecordType::Transaction, record_id, err.to_string()).with_fingerprint(fingerprint)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
