//! `gstflow-numbering`: invoice-number allocation.
//!
//! Numbers have the shape `{PREFIX}-{STATE}-{YYYYMM}-{SEQ}`. The sequence runs
//! per (channel, state, month) series, shared by every GSTIN filing into it,
//! and numbers stay unique across every run, including reruns.
//! Sequence reservation is delegated to a [`NumberingPort`] so that uniqueness
//! holds across processes, not only within one.

pub mod invoice;
pub mod numberer;
pub mod port;

pub use invoice::{Invoice, InvoiceNo, NumberSeries, ParsedInvoiceNo, ScopeKey};
pub use numberer::{AllocationError, InvoiceNumberer, RetryPolicy};
pub use port::{NumberingError, NumberingPort};
