//! `gstflow-exceptions`: anomaly catalog, exception entity and detection rules.
//!
//! The detector is pure: it turns records, tax computations and allocated
//! invoices into [`Finding`]s. Findings become [`Exception`]s with identifiers
//! derived from their content, so detection can be repeated on resume without
//! duplicating anything.

pub mod catalog;
pub mod detector;
pub mod exception;

pub use catalog::{Category, ErrorCode, ErrorDefinition, RequestType, Severity};
pub use detector::{DetectorConfig, ExceptionDetector, RecordInspection};
pub use exception::{Exception, ExceptionStatus, Finding, RecordType, Resolution};
