//! Monetary rounding.
//!
//! All amounts are `rust_decimal::Decimal`. Rounding happens exactly once per
//! computed tax leg, half-up (midpoint away from zero) to two decimal places.
//! Aggregates sum already-rounded per-record values and never re-round.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places carried by every monetary amount.
pub const MONEY_SCALE: u32 = 2;

/// Round half-up to two decimal places.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Render an amount with exactly two decimals (`"1200.00"`, `"-0.50"`).
pub fn format_money(value: Decimal) -> String {
    let mut rounded = round_money(value);
    rounded.rescale(MONEY_SCALE);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn midpoints_round_away_from_zero() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
        assert_eq!(round_money(dec!(-10.005)), dec!(-10.01));
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
    }

    #[test]
    fn formatting_always_has_two_decimals() {
        assert_eq!(format_money(dec!(1200)), "1200.00");
        assert_eq!(format_money(dec!(3.5)), "3.50");
        assert_eq!(format_money(dec!(-0.5)), "-0.50");
        assert_eq!(format_money(dec!(7.456)), "7.46");
    }
}
