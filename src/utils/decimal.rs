//! Decimal helpers shared by the executor and the monitor.

use crate::position::Side;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round to two decimal places, away from zero at the midpoint. The
/// exchange rejects prices and sizes with more precision than this.
pub fn round_2dp(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Percentage move of the current exit price relative to the entry
/// price, signed so that positive is favorable for the position.
///
/// A LAY position profits when the price drifts up (the runner's
/// chances fade); a BACK position profits when it shortens. This is a
/// price-decay measure, not settlement P/L.
pub fn decay_profit_pct(side: Side, entry_price: Decimal, current_price: Decimal) -> Decimal {
    let hundred = Decimal::new(100, 0);
    match side {
        Side::Lay => (current_price - entry_price) / entry_price * hundred,
        Side::Back => (entry_price - current_price) / entry_price * hundred,
    }
}
