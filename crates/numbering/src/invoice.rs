//! Invoice numbers and the invoice entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gstflow_core::{
    Channel, DomainError, DomainResult, Entity, Gstin, Month, StateCode, TransactionId,
};

/// Zero-padded width of the sequence component.
pub const SEQUENCE_WIDTH: usize = 5;

/// Largest sequence number that fits the format.
pub const MAX_SEQUENCE: u64 = 99_999;

/// Uniqueness scope of an invoice sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    pub channel: Channel,
    pub gstin: Gstin,
    pub state_code: StateCode,
    pub month: Month,
}

impl ScopeKey {
    /// The sequence this scope draws from. The number carries no GSTIN, so
    /// every GSTIN filing the same channel, state and month shares one series.
    pub fn series(&self) -> NumberSeries {
        NumberSeries {
            channel: self.channel,
            state_code: self.state_code.clone(),
            month: self.month,
        }
    }
}

impl core::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.channel, self.gstin, self.state_code, self.month)
    }
}

/// The part of a scope that appears in the invoice number, e.g. `AMZ-TN-202404`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NumberSeries {
    pub channel: Channel,
    pub state_code: StateCode,
    pub month: Month,
}

impl core::fmt::Display for NumberSeries {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.channel.invoice_prefix(),
            self.state_code,
            self.month.compact()
        )
    }
}

/// A formatted invoice number, e.g. `AMZ-TN-202404-00001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNo(String);

/// Components recovered from an invoice number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInvoiceNo {
    pub channel: Channel,
    pub state_code: StateCode,
    pub month: Month,
    pub sequence_no: u64,
}

impl InvoiceNo {
    pub fn format(scope: &ScopeKey, sequence_no: u64) -> DomainResult<Self> {
        if sequence_no == 0 || sequence_no > MAX_SEQUENCE {
            return Err(DomainError::validation(format!(
                "sequence {sequence_no} outside 1..={MAX_SEQUENCE} for scope {scope}"
            )));
        }
        Ok(Self(format!(
            "{}-{:0width$}",
            scope.series(),
            sequence_no,
            width = SEQUENCE_WIDTH
        )))
    }

    /// Parse and validate an invoice number against the channel patterns.
    pub fn parse(raw: &str) -> DomainResult<ParsedInvoiceNo> {
        let invalid = |why: &str| DomainError::validation(format!("invoice number '{raw}': {why}"));

        let parts: Vec<&str> = raw.split('-').collect();
        let [prefix, state, period, seq] = parts.as_slice() else {
            return Err(invalid("expected PREFIX-STATE-YYYYMM-SEQ"));
        };

        let channel = Channel::from_invoice_prefix(prefix).ok_or_else(|| invalid("unknown prefix"))?;
        let state_code = StateCode::classify(state)
            .filter(|s| s.as_str() == *state)
            .ok_or_else(|| invalid("unknown state code"))?;

        if period.len() != 6 || !period.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("period must be YYYYMM"));
        }
        let year: i32 = period[..4].parse().map_err(|_| invalid("bad year"))?;
        let month_no: u32 = period[4..].parse().map_err(|_| invalid("bad month"))?;
        let month = Month::new(year, month_no).map_err(|_| invalid("bad month"))?;

        if seq.len() != SEQUENCE_WIDTH || !seq.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("sequence must be five digits"));
        }
        let sequence_no: u64 = seq.parse().map_err(|_| invalid("bad sequence"))?;
        if sequence_no == 0 {
            return Err(invalid("sequence starts at 1"));
        }

        Ok(ParsedInvoiceNo {
            channel,
            state_code,
            month,
            sequence_no,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for InvoiceNo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An allocated invoice. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    invoice_no: InvoiceNo,
    scope: ScopeKey,
    sequence_no: u64,
    transaction_ids: Vec<TransactionId>,
    issued_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        scope: ScopeKey,
        sequence_no: u64,
        transaction_id: TransactionId,
        issued_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let invoice_no = InvoiceNo::format(&scope, sequence_no)?;
        Ok(Self {
            invoice_no,
            scope,
            sequence_no,
            transaction_ids: vec![transaction_id],
            issued_at,
        })
    }

    pub fn invoice_no(&self) -> &InvoiceNo {
        &self.invoice_no
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    pub fn transaction_ids(&self) -> &[TransactionId] {
        &self.transaction_ids
    }

    pub fn covers(&self, transaction_id: &TransactionId) -> bool {
        self.transaction_ids.contains(transaction_id)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl Entity for Invoice {
    type Id = InvoiceNo;

    fn id(&self) -> &Self::Id {
        &self.invoice_no
    }
}
