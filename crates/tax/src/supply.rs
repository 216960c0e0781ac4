//! Per-channel place-of-supply rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstflow_core::{Channel, round_money};

/// How a channel's records are classified as intra- or interstate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyRule {
    /// Registration (home) state vs destination state.
    Marketplace,
    /// Inter-warehouse stock transfer: always interstate.
    StockTransfer,
    /// Reported seller/shipping state vs destination, falling back to home state.
    SellerOrigin,
    /// Marketplace rule with taxable value scaled to the net (unreturned) quantity.
    ReturnsAdjusted,
}

impl SupplyRule {
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::AmazonMtr => SupplyRule::Marketplace,
            Channel::AmazonStr => SupplyRule::StockTransfer,
            Channel::Flipkart => SupplyRule::SellerOrigin,
            Channel::Pepperfry => SupplyRule::ReturnsAdjusted,
        }
    }

    /// Taxable value after any return adjustment.
    ///
    /// Net quantity is clamped to `0..=quantity`; a non-positive quantity
    /// leaves the value untouched.
    pub fn adjusted_taxable(&self, taxable: Decimal, quantity: i64, returned_qty: i64) -> Decimal {
        match self {
            SupplyRule::ReturnsAdjusted if quantity > 0 && returned_qty != 0 => {
                let net = (quantity - returned_qty).clamp(0, quantity);
                round_money(taxable * Decimal::from(net) / Decimal::from(quantity))
            }
            _ => taxable,
        }
    }
}
