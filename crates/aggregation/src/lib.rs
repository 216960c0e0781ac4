//! `gstflow-aggregation`: pivot, GST-rate batch split and reconciliation.
//!
//! Grouping sums the raw, already-rounded per-record amounts exactly; nothing
//! is re-rounded. Every distinct rate observed in a run gets a batch, even one
//! whose records were all gated out, so "no eligible rows" can be told apart
//! from "rate never processed".

pub mod batch;
pub mod pivot;
pub mod reconcile;

pub use batch::{BATCH_COLUMNS, BatchFile};
pub use pivot::{Aggregation, EligibleLine, PivotGroup, PivotKey, Totals, aggregate};
pub use reconcile::{AggregationError, ReconciliationReport, reconcile};
