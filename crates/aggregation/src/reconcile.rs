//! Conservation check between eligible lines and batch output.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pivot::{Aggregation, EligibleLine, Totals};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("reconciliation mismatch on {metric}: expected {expected}, got {actual}")]
    ReconciliationMismatch {
        metric: &'static str,
        expected: Decimal,
        actual: Decimal,
    },
}

/// What was compared, for the run audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub expected: Totals,
    pub actual: Totals,
    pub epsilon: Decimal,
}

/// Verify the batches carry exactly what went in.
///
/// Counts and quantities must match exactly; money may differ by at most
/// `epsilon`.
pub fn reconcile(
    lines: &[EligibleLine],
    aggregation: &Aggregation,
    epsilon: Decimal,
) -> Result<ReconciliationReport, AggregationError> {
    let expected = Totals::of_lines(lines);
    let mut actual = Totals::default();
    for batch in &aggregation.batch_files {
        actual.add(&batch.totals);
    }

    let counts = [
        (
            "transaction_count",
            Decimal::from(expected.transaction_count),
            Decimal::from(actual.transaction_count),
        ),
        ("quantity", Decimal::from(expected.quantity), Decimal::from(actual.quantity)),
    ];
    for (metric, expected, actual) in counts {
        if expected != actual {
            return Err(AggregationError::ReconciliationMismatch { metric, expected, actual });
        }
    }

    let money = [
        ("taxable", expected.taxable, actual.taxable),
        ("shipping", expected.shipping, actual.shipping),
        ("cgst", expected.cgst, actual.cgst),
        ("sgst", expected.sgst, actual.sgst),
        ("igst", expected.igst, actual.igst),
        ("tax", expected.tax(), actual.tax()),
    ];
    for (metric, expected, actual) in money {
        if (expected - actual).abs() > epsilon {
            return Err(AggregationError::ReconciliationMismatch { metric, expected, actual });
        }
    }

    Ok(ReconciliationReport {
        expected,
        actual,
        epsilon,
    })
}
