use std::collections::HashMap;
use std::sync::Mutex;

use gstflow_core::TransactionId;
use gstflow_numbering::{Invoice, InvoiceNo, NumberSeries, NumberingError, NumberingPort, ScopeKey};

#[derive(Debug, Default)]
struct Registry {
    sequences: HashMap<NumberSeries, u64>,
    by_number: HashMap<InvoiceNo, Invoice>,
    by_transaction: HashMap<(ScopeKey, TransactionId), InvoiceNo>,
}

/// In-memory numbering registry.
///
/// One mutex guards the counters and both indexes, so a reservation is atomic
/// for every thread sharing the registry. Intended for tests/dev; a durable
/// adapter would do the same with a row lock or compare-and-set.
#[derive(Debug, Default)]
pub struct InMemoryNumberingRegistry {
    inner: Mutex<Registry>,
}

impl InMemoryNumberingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registered invoice, ordered by invoice number.
    pub fn issued(&self) -> Result<Vec<Invoice>, NumberingError> {
        let inner = self.lock()?;
        let mut invoices: Vec<Invoice> = inner.by_number.values().cloned().collect();
        invoices.sort_by(|a, b| a.invoice_no().cmp(b.invoice_no()));
        Ok(invoices)
    }

    /// Last sequence reserved in the series `scope` draws from (0 if none).
    pub fn high_water_mark(&self, scope: &ScopeKey) -> Result<u64, NumberingError> {
        Ok(self.lock()?.sequences.get(&scope.series()).copied().unwrap_or(0))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Registry>, NumberingError> {
        self.inner
            .lock()
            .map_err(|_| NumberingError::Storage("lock poisoned".to_string()))
    }
}

impl NumberingPort for InMemoryNumberingRegistry {
    fn reserve_next(&self, scope: &ScopeKey) -> Result<u64, NumberingError> {
        let mut inner = self.lock()?;
        let next = inner.sequences.entry(scope.series()).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn lookup_existing(
        &self,
        scope: &ScopeKey,
        transaction_id: &TransactionId,
    ) -> Result<Option<Invoice>, NumberingError> {
        let inner = self.lock()?;
        Ok(inner
            .by_transaction
            .get(&(scope.clone(), transaction_id.clone()))
            .and_then(|no| inner.by_number.get(no))
            .cloned())
    }

    fn register(&self, invoice: &Invoice) -> Result<Invoice, NumberingError> {
        let mut inner = self.lock()?;

        for txn in invoice.transaction_ids() {
            let key = (invoice.scope().clone(), txn.clone());
            if let Some(existing) = inner.by_transaction.get(&key).and_then(|no| inner.by_number.get(no)) {
                return Ok(existing.clone());
            }
        }
        if inner.by_number.contains_key(invoice.invoice_no()) {
            return Err(NumberingError::Conflict(format!(
                "invoice {} is already registered",
                invoice.invoice_no()
            )));
        }

        for txn in invoice.transaction_ids() {
            inner.by_transaction.insert(
                (invoice.scope().clone(), txn.clone()),
                invoice.invoice_no().clone(),
            );
        }
        inner
            .by_number
            .insert(invoice.invoice_no().clone(), invoice.clone());
        Ok(invoice.clone())
    }
}
