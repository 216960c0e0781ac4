//! Structured logging for gstflow binaries and tests.
//!
//! Call [`init`] once near the top of `main`. Every coordinator pass then
//! runs inside a [`run_span`], so each JSON log line carries the run id and
//! the (channel, GSTIN, month) scope it belongs to.

pub mod span;
pub mod tracing;

pub use self::span::run_span;
pub use self::tracing::{DEFAULT_FILTER, init, init_with_default};
