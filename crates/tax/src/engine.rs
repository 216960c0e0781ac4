//! The tax split itself.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gstflow_core::{GstRate, NormalizedRecord, StateCode, round_money};

use crate::supply::SupplyRule;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaxError {
    #[error("gst rate {0} is not an allowed slab")]
    RateInvalid(Decimal),

    #[error("gst rate is missing")]
    MissingRate,

    #[error("taxable value is missing")]
    MissingTaxableValue,

    #[error("destination state is missing")]
    MissingState,

    #[error("state '{0}' cannot be classified")]
    UnclassifiedState(String),

    #[error("home state cannot be derived from gstin {0}")]
    UnknownHomeState(String),
}

/// CGST/SGST/IGST split for one record.
///
/// Invariant: either both central/state legs carry the tax and IGST is zero, or
/// IGST carries it and both other legs are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComputation {
    pub taxable_value: Decimal,
    pub shipping_value: Decimal,
    pub gst_rate: GstRate,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub is_interstate: bool,
}

impl TaxComputation {
    pub fn total_tax(&self) -> Decimal {
        self.cgst + self.sgst + self.igst
    }

    pub fn total_amount(&self) -> Decimal {
        self.taxable_value + self.shipping_value + self.total_tax()
    }

    /// Amount the rate applies to (goods plus shipping).
    pub fn tax_base(&self) -> Decimal {
        self.taxable_value + self.shipping_value
    }

    /// True when the legs satisfy the intra/interstate exclusivity rule.
    pub fn legs_consistent(&self) -> bool {
        if self.is_interstate {
            self.cgst.is_zero() && self.sgst.is_zero()
        } else {
            self.igst.is_zero() && self.cgst == self.sgst
        }
    }
}

/// Stateless GST calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxEngine;

impl TaxEngine {
    pub fn new() -> Self {
        Self
    }

    /// Split tax on `taxable_value` between origin and destination.
    pub fn compute(
        &self,
        taxable_value: Decimal,
        gst_rate: Decimal,
        home_state: &StateCode,
        destination_state: &StateCode,
    ) -> Result<TaxComputation, TaxError> {
        let rate = GstRate::try_new(gst_rate).map_err(|_| TaxError::RateInvalid(gst_rate))?;
        Ok(self.split(taxable_value, Decimal::ZERO, rate, home_state != destination_state))
    }

    /// Compute the split for a record, applying its channel's supply rule.
    pub fn compute_record(&self, record: &NormalizedRecord) -> Result<TaxComputation, TaxError> {
        let raw_rate = record.gst_rate.ok_or(TaxError::MissingRate)?;
        let rate = GstRate::try_new(raw_rate).map_err(|_| TaxError::RateInvalid(raw_rate))?;
        let taxable = record.taxable_value.ok_or(TaxError::MissingTaxableValue)?;
        let home = record
            .gstin
            .home_state()
            .ok_or_else(|| TaxError::UnknownHomeState(record.gstin.to_string()))?;
        let destination = classify(record.state_code.as_deref())?;

        let rule = SupplyRule::for_channel(record.channel);
        let origin = match (rule, record.seller_state.as_deref()) {
            (SupplyRule::SellerOrigin, Some(seller)) => classify(Some(seller))?,
            _ => home,
        };
        let interstate = match rule {
            SupplyRule::StockTransfer => true,
            _ => origin != destination,
        };
        let taxable = rule.adjusted_taxable(taxable, record.quantity, record.returned_qty);

        Ok(self.split(taxable, record.shipping_value, rate, interstate))
    }

    fn split(
        &self,
        taxable_value: Decimal,
        shipping_value: Decimal,
        rate: GstRate,
        is_interstate: bool,
    ) -> TaxComputation {
        let base = taxable_value + shipping_value;
        let (cgst, sgst, igst) = if is_interstate {
            (Decimal::ZERO, Decimal::ZERO, round_money(base * rate.value()))
        } else {
            let half = round_money(base * rate.value() / Decimal::TWO);
            (half, half, Decimal::ZERO)
        };

        TaxComputation {
            taxable_value,
            shipping_value,
            gst_rate: rate,
            cgst,
            sgst,
            igst,
            is_interstate,
        }
    }
}

fn classify(raw: Option<&str>) -> Result<StateCode, TaxError> {
    let raw = raw.filter(|s| !s.trim().is_empty()).ok_or(TaxError::MissingState)?;
    StateCode::classify(raw).ok_or_else(|| TaxError::UnclassifiedState(raw.to_string()))
}
