//! The numbering registry port.

use std::sync::Arc;

use thiserror::Error;

use gstflow_core::TransactionId;

use crate::invoice::{Invoice, ScopeKey};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NumberingError {
    /// Lost a race for a sequence or invoice number; safe to retry.
    #[error("numbering conflict: {0}")]
    Conflict(String),

    /// Registry storage failed; not retryable here.
    #[error("numbering storage failure: {0}")]
    Storage(String),
}

/// Durable invoice-number registry.
///
/// - `reserve_next` counts per [`ScopeKey::series`], not per scope: two GSTINs
///   filing the same channel, state and month draw from one counter. It must
///   be atomic across every process sharing the registry. A
///   reserved-but-never-registered sequence becomes a gap; gaps are allowed,
///   duplicates are not.
/// - Transaction ids are only unique within a channel, so the transaction →
///   invoice mapping is keyed by (scope, transaction id). `register` on a pair
///   that is already registered returns the existing invoice. Registering a
///   number already held by another pair is a `Conflict`.
pub trait NumberingPort: Send + Sync {
    fn reserve_next(&self, scope: &ScopeKey) -> Result<u64, NumberingError>;

    fn lookup_existing(
        &self,
        scope: &ScopeKey,
        transaction_id: &TransactionId,
    ) -> Result<Option<Invoice>, NumberingError>;

    fn register(&self, invoice: &Invoice) -> Result<Invoice, NumberingError>;
}

impl<P> NumberingPort for Arc<P>
where
    P: NumberingPort + ?Sized,
{
    fn reserve_next(&self, scope: &ScopeKey) -> Result<u64, NumberingError> {
        (**self).reserve_next(scope)
    }

    fn lookup_existing(
        &self,
        scope: &ScopeKey,
        transaction_id: &TransactionId,
    ) -> Result<Option<Invoice>, NumberingError> {
        (**self).lookup_existing(scope, transaction_id)
    }

    fn register(&self, invoice: &Invoice) -> Result<Invoice, NumberingError> {
        (**self).register(invoice)
    }
}
