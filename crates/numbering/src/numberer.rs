//! Bounded-retry invoice allocation on top of a [`NumberingPort`].

use chrono::Utc;
use thiserror::Error;

use gstflow_core::TransactionId;

use crate::invoice::{Invoice, ScopeKey};
use crate::port::{NumberingError, NumberingPort};

/// Retry bound for conflicting reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Every attempt lost a race. Fatal for this record only.
    #[error("numbering conflict for {transaction_id} in {scope} after {attempts} attempts")]
    Conflict {
        transaction_id: TransactionId,
        scope: String,
        attempts: u32,
    },

    /// The scope has no sequence numbers left.
    #[error("sequence exhausted for {scope}")]
    Exhausted { scope: String },

    #[error(transparent)]
    Port(NumberingError),
}

/// Allocates invoices, idempotently per transaction.
#[derive(Debug, Clone)]
pub struct InvoiceNumberer<P> {
    port: P,
    retry: RetryPolicy,
}

impl<P> InvoiceNumberer<P> {
    pub fn new(port: P) -> Self {
        Self::with_policy(port, RetryPolicy::default())
    }

    pub fn with_policy(port: P, retry: RetryPolicy) -> Self {
        Self { port, retry }
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

impl<P> InvoiceNumberer<P>
where
    P: NumberingPort,
{
    /// Return the invoice for `transaction_id`, allocating one if needed.
    ///
    /// A transaction that already holds an invoice in `scope` gets the same
    /// invoice back, which is what makes re-running an allocation after a
    /// crash safe. The same id in another scope is a different transaction.
    pub fn allocate(
        &self,
        scope: &ScopeKey,
        transaction_id: &TransactionId,
    ) -> Result<Invoice, AllocationError> {
        if let Some(existing) = self
            .port
            .lookup_existing(scope, transaction_id)
            .map_err(AllocationError::Port)?
            .filter(|existing| existing.scope() == scope)
        {
            tracing::debug!(
                transaction_id = %transaction_id,
                invoice_no = %existing.invoice_no(),
                "reusing existing invoice"
            );
            return Ok(existing);
        }

        for attempt in 1..=self.retry.max_attempts {
            let sequence_no = match self.port.reserve_next(scope) {
                Ok(seq) => seq,
                Err(NumberingError::Conflict(reason)) => {
                    tracing::debug!(%scope, attempt, %reason, "sequence reservation conflict");
                    continue;
                }
                Err(err) => return Err(AllocationError::Port(err)),
            };

            let invoice = Invoice::new(scope.clone(), sequence_no, transaction_id.clone(), Utc::now())
                .map_err(|_| AllocationError::Exhausted {
                    scope: scope.to_string(),
                })?;

            match self.port.register(&invoice) {
                Ok(registered) if registered.scope() != scope => {
                    tracing::warn!(
                        %scope,
                        attempt,
                        invoice_no = %registered.invoice_no(),
                        "registry answered with an invoice from another scope"
                    );
                }
                Ok(registered) => {
                    tracing::info!(
                        transaction_id = %transaction_id,
                        invoice_no = %registered.invoice_no(),
                        attempt,
                        "invoice allocated"
                    );
                    return Ok(registered);
                }
                Err(NumberingError::Conflict(reason)) => {
                    tracing::debug!(%scope, attempt, %reason, "invoice registration conflict");
                }
                Err(err) => return Err(AllocationError::Port(err)),
            }
        }

        tracing::warn!(
            transaction_id = %transaction_id,
            %scope,
            attempts = self.retry.max_attempts,
            "numbering retries exhausted"
        );
        Err(AllocationError::Conflict {
            transaction_id: transaction_id.clone(),
            scope: scope.to_string(),
            attempts: self.retry.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use gstflow_core::{Channel, Gstin, Month, StateCode};

    use crate::invoice::InvoiceNo;

    /// Registry double that loses the first `conflicts` races.
    #[derive(Default)]
    struct ScriptedPort {
        conflicts: Mutex<u32>,
        next: Mutex<u64>,
        by_txn: Mutex<HashMap<(Option<ScopeKey>, TransactionId), Invoice>>,
        ignore_scope: bool,
        reserve_calls: Mutex<u32>,
    }

    impl ScriptedPort {
        fn losing(conflicts: u32) -> Self {
            Self {
                conflicts: Mutex::new(conflicts),
                ..Self::default()
            }
        }

        /// A registry that forgot transaction ids repeat across channels.
        fn keyed_by_transaction_only() -> Self {
            Self {
                ignore_scope: true,
                ..Self::default()
            }
        }

        fn key(&self, scope: &ScopeKey, txn: &TransactionId) -> (Option<ScopeKey>, TransactionId) {
            let scope = (!self.ignore_scope).then(|| scope.clone());
            (scope, txn.clone())
        }
    }

    impl NumberingPort for ScriptedPort {
        fn reserve_next(&self, _scope: &ScopeKey) -> Result<u64, NumberingError> {
            *self.reserve_calls.lock().unwrap() += 1;
            let mut left = self.conflicts.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(NumberingError::Conflict("lost race".into()));
            }
            let mut next = self.next.lock().unwrap();
            *next += 1;
            Ok(*next)
        }

        fn lookup_existing(
            &self,
            scope: &ScopeKey,
            transaction_id: &TransactionId,
        ) -> Result<Option<Invoice>, NumberingError> {
            let key = self.key(scope, transaction_id);
            Ok(self.by_txn.lock().unwrap().get(&key).cloned())
        }

        fn register(&self, invoice: &Invoice) -> Result<Invoice, NumberingError> {
            let key = self.key(invoice.scope(), &invoice.transaction_ids()[0]);
            let mut by_txn = self.by_txn.lock().unwrap();
            Ok(by_txn.entry(key).or_insert_with(|| invoice.clone()).clone())
        }
    }

    fn scope() -> ScopeKey {
        ScopeKey {
            channel: Channel::AmazonMtr,
            gstin: Gstin::parse("33ABCDE1234F1Z5").unwrap(),
            state_code: StateCode::classify("TN").unwrap(),
            month: Month::parse("2024-04").unwrap(),
        }
    }

    fn txn(id: &str) -> TransactionId {
        TransactionId::new(id).unwrap()
    }

    #[test]
    fn allocation_is_idempotent_per_transaction() {
        let numberer = InvoiceNumberer::new(ScriptedPort::default());
        let first = numberer.allocate(&scope(), &txn("A")).unwrap();
        let again = numberer.allocate(&scope(), &txn("A")).unwrap();
        let other = numberer.allocate(&scope(), &txn("B")).unwrap();

        assert_eq!(first, again);
        assert_eq!(first.invoice_no().as_str(), "AMZ-TN-202404-00001");
        assert_eq!(other.invoice_no().as_str(), "AMZ-TN-202404-00002");
        assert_eq!(*numberer.port().reserve_calls.lock().unwrap(), 2);
    }

    #[test]
    fn the_same_transaction_id_in_another_channel_gets_its_own_invoice() {
        let mut flipkart = scope();
        flipkart.channel = Channel::Flipkart;

        let numberer = InvoiceNumberer::new(ScriptedPort::default());
        let amazon = numberer.allocate(&scope(), &txn("1001")).unwrap();
        let other = numberer.allocate(&flipkart, &txn("1001")).unwrap();

        assert_eq!(amazon.invoice_no().as_str(), "AMZ-TN-202404-00001");
        assert_eq!(other.scope(), &flipkart);
        assert_eq!(other.invoice_no().as_str(), "FLIP-TN-202404-00002");
        assert_eq!(numberer.allocate(&flipkart, &txn("1001")).unwrap(), other);
    }

    #[test]
    fn a_wrong_scope_invoice_from_the_registry_is_never_handed_out() {
        let mut flipkart = scope();
        flipkart.channel = Channel::Flipkart;

        let numberer = InvoiceNumberer::new(ScriptedPort::keyed_by_transaction_only());
        numberer.allocate(&scope(), &txn("1001")).unwrap();
        match numberer.allocate(&flipkart, &txn("1001")) {
            Err(AllocationError::Conflict { attempts, transaction_id, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(transaction_id, txn("1001"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn conflicts_are_retried_within_the_bound() {
        let numberer = InvoiceNumberer::new(ScriptedPort::losing(4));
        let invoice = numberer.allocate(&scope(), &txn("A")).unwrap();
        assert_eq!(invoice.sequence_no(), 1);
        assert_eq!(*numberer.port().reserve_calls.lock().unwrap(), 5);
    }

    #[test]
    fn exhausting_retries_is_a_numbering_conflict() {
        let numberer = InvoiceNumberer::new(ScriptedPort::losing(5));
        match numberer.allocate(&scope(), &txn("A")) {
            Err(AllocationError::Conflict { attempts, transaction_id, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(transaction_id, txn("A"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn custom_policy_changes_the_bound() {
        let numberer = InvoiceNumberer::with_policy(ScriptedPort::losing(2), RetryPolicy::attempts(2));
        assert!(matches!(
            numberer.allocate(&scope(), &txn("A")),
            Err(AllocationError::Conflict { attempts: 2, .. })
        ));
    }

    #[test]
    fn allocated_numbers_parse_back_to_their_scope() {
        let numberer = InvoiceNumberer::new(ScriptedPort::default());
        let invoice = numberer.allocate(&scope(), &txn("A")).unwrap();
        let parsed = InvoiceNo::parse(invoice.invoice_no().as_str()).unwrap();
        assert_eq!(parsed.channel, Channel::AmazonMtr);
        assert_eq!(parsed.month, scope().month);
        assert_eq!(parsed.sequence_no, invoice.sequence_no());
    }
}
