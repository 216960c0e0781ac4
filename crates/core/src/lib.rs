//! `gstflow-core`: domain foundation for the GST reconciliation engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error model, aggregate traits, money rounding, Indian state
//! jurisdiction lookup and the normalized transaction record every other crate
//! consumes.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod jurisdiction;
pub mod money;
pub mod record;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ExceptionId, RequestId, RunId};
pub use jurisdiction::{Gstin, StateCode};
pub use money::{format_money, round_money};
pub use record::{Channel, NormalizedRecord, RecordOverrides, RunScope, TransactionId};
pub use value_object::{GstRate, Month, ValueObject};
