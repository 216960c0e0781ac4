use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstflow_aggregation::{BatchFile, PivotGroup};
use gstflow_approval::ApprovalRequest;
use gstflow_core::RunId;
use gstflow_exceptions::Exception;
use gstflow_numbering::Invoice;

use crate::run::RunStatus;

/// Headline counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_records: usize,
    /// Records that cleared every gate and reached the aggregator.
    pub eligible_records: usize,
    pub excluded_records: usize,
    /// Records excluded by a validation exception (missing data, out of scope,
    /// duplicate).
    pub validation_failures: usize,
    pub invoices_allocated: usize,
    pub batch_count: usize,
    pub total_taxable: Decimal,
    pub total_tax: Decimal,
}

/// Everything a caller can observe about a run.
///
/// Pivot groups, batches and invoices are only populated once the run has
/// reached `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub pivot_groups: Vec<PivotGroup>,
    pub batch_files: Vec<BatchFile>,
    pub exceptions: Vec<Exception>,
    pub pending_approvals: Vec<ApprovalRequest>,
    pub invoices: Vec<Invoice>,
    pub summary: RunSummary,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn critical_exceptions(&self) -> impl Iterator<Item = &Exception> {
        self.exceptions.iter().filter(|e| e.is_critical())
    }
}
