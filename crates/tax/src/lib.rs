//! `gstflow-tax`: GST split computation.
//!
//! A pure function from (taxable amount, rate, origin state, destination state)
//! to a CGST/SGST or IGST split, plus the per-channel supply rules that decide
//! what origin and taxable amount to feed it.

pub mod engine;
pub mod supply;

pub use engine::{TaxComputation, TaxEngine, TaxError};
pub use supply::SupplyRule;
