//! The normalized transaction record consumed by the engine.
//!
//! Records arrive already parsed and mapped by upstream collaborators. They are
//! immutable: an approved correction produces a new *effective* record through
//! [`NormalizedRecord::with_overrides`], the input is never edited in place.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::jurisdiction::Gstin;
use crate::value_object::Month;

/// Sales channel a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Amazon merchant tax report (B2C marketplace sales).
    AmazonMtr,
    /// Amazon stock transfer report (inter-warehouse movements).
    AmazonStr,
    Flipkart,
    Pepperfry,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::AmazonMtr,
        Channel::AmazonStr,
        Channel::Flipkart,
        Channel::Pepperfry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::AmazonMtr => "amazon_mtr",
            Channel::AmazonStr => "amazon_str",
            Channel::Flipkart => "flipkart",
            Channel::Pepperfry => "pepperfry",
        }
    }

    /// Invoice-number prefix for the channel.
    pub fn invoice_prefix(&self) -> &'static str {
        match self {
            Channel::AmazonMtr => "AMZ",
            Channel::AmazonStr => "AMZST",
            Channel::Flipkart => "FLIP",
            Channel::Pepperfry => "PEPP",
        }
    }

    pub fn from_invoice_prefix(prefix: &str) -> Option<Channel> {
        Self::ALL.into_iter().find(|c| c.invoice_prefix() == prefix)
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown channel '{s}'")))
    }
}

/// The (channel, GSTIN, month) batch a run processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunScope {
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
}

impl RunScope {
    pub fn new(channel: Channel, gstin: Gstin, month: Month) -> Self {
        Self {
            channel,
            gstin,
            month,
        }
    }

    /// True when the record belongs to this batch.
    pub fn contains(&self, record: &NormalizedRecord) -> bool {
        record.channel == self.channel && record.gstin == self.gstin && record.month == self.month
    }
}

impl core::fmt::Display for RunScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}_{}_{}", self.channel, self.gstin, self.month)
    }
}

/// Upstream transaction identifier (marketplace order item id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DomainError::invalid_id("transaction id must not be empty"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One normalized, mapped marketplace transaction.
///
/// Optional fields are optional because upstream mapping may have failed; the
/// exception detector turns each gap into a typed exception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub transaction_id: TransactionId,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    /// Destination state as delivered upstream (abbreviation or full name).
    pub state_code: Option<String>,
    pub ledger_name: Option<String>,
    pub fg_name: Option<String>,
    pub quantity: i64,
    pub taxable_value: Option<Decimal>,
    /// Raw rate; validated against the allowed slabs downstream.
    pub gst_rate: Option<Decimal>,
    #[serde(default)]
    pub shipping_value: Decimal,
    #[serde(default)]
    pub returned_qty: i64,
    /// Shipping-origin state, when the channel reports one.
    #[serde(default)]
    pub seller_state: Option<String>,
}

impl NormalizedRecord {
    /// Start a record with the identifying fields; everything else empty.
    pub fn new(transaction_id: TransactionId, channel: Channel, gstin: Gstin, month: Month) -> Self {
        Self {
            transaction_id,
            channel,
            gstin,
            month,
            state_code: None,
            ledger_name: None,
            fg_name: None,
            quantity: 0,
            taxable_value: None,
            gst_rate: None,
            shipping_value: Decimal::ZERO,
            returned_qty: 0,
            seller_state: None,
        }
    }

    /// The effective record after applying approved corrections.
    pub fn with_overrides(&self, overrides: &RecordOverrides) -> NormalizedRecord {
        let mut effective = self.clone();
        if let Some(ledger) = &overrides.ledger_name {
            effective.ledger_name = Some(ledger.clone());
        }
        if let Some(fg) = &overrides.fg_name {
            effective.fg_name = Some(fg.clone());
        }
        if let Some(rate) = overrides.gst_rate {
            effective.gst_rate = Some(rate);
        }
        if let Some(state) = &overrides.state_code {
            effective.state_code = Some(state.clone());
        }
        effective
    }

    /// Quantity net of returns.
    pub fn net_quantity(&self) -> i64 {
        self.quantity - self.returned_qty
    }
}

/// Field corrections carried by an approval decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fg_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gst_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
}

impl RecordOverrides {
    pub fn is_empty(&self) -> bool {
        self.ledger_name.is_none()
            && self.fg_name.is_none()
            && self.gst_rate.is_none()
            && self.state_code.is_none()
    }

    /// Layer `later` on top of `self`; later values win field by field.
    pub fn merge(&mut self, later: &RecordOverrides) {
        if later.ledger_name.is_some() {
            self.ledger_name = later.ledger_name.clone();
        }
        if later.fg_name.is_some() {
            self.fg_name = later.fg_name.clone();
        }
        if later.gst_rate.is_some() {
            self.gst_rate = later.gst_rate;
        }
        if later.state_code.is_some() {
            self.state_code = later.state_code.clone();
        }
    }
}
