//! Order execution: turns an [`EntrySignal`] into a placed exchange
//! order and a persisted position.
//!
//! The executor owns the last line of defence before money moves:
//! price/size normalization, sanity bounds, and a fresh-book
//! re-validation immediately before submission. A placement that the
//! exchange rejects is logged and dropped; the market is simply
//! reconsidered on a later cycle.

use crate::config::ExitParams;
use crate::exchange::{
    ExchangeApi, InstructionStatus, LimitOrder, MarketStatus, OrderType, PersistenceType,
    PlaceInstruction, PriceSize,
};
use crate::position::{Position, PositionStatus};
use crate::store::PositionStore;
use crate::strategy::evaluator::{EntrySignal, MIN_PRICE};
use crate::utils::decimal::round_2dp;
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

const MAX_PRICE: Decimal = dec!(1000);
/// Hard cap on a single order; a stake above this is a config error.
const MAX_STAKE: Decimal = dec!(10000);
/// How far the live price may drift from the evaluated price before we
/// submit at the live price instead.
const PRICE_TOLERANCE: Decimal = dec!(0.05);

pub struct OrderExecutor<'a> {
    exchange: &'a dyn ExchangeApi,
    store: &'a PositionStore,
}

impl<'a> OrderExecutor<'a> {
    pub fn new(exchange: &'a dyn ExchangeApi, store: &'a PositionStore) -> Self {
        Self { exchange, store }
    }

    /// Place the order described by `signal` and persist the resulting
    /// position. Returns None when the order was not placed, for any
    /// reason short of an exchange transport failure.
    pub async fn execute(
        &self,
        signal: &EntrySignal,
        exit: ExitParams,
    ) -> Result<Option<Position>> {
        let price = round_2dp(signal.price);
        let stake = round_2dp(signal.stake);

        if let Err(problem) = validate_order(signal.selection_id, price, stake) {
            warn!(market_id = %signal.market_id, %problem, "Order rejected by validation");
            return Ok(None);
        }

        // Re-check the book the moment before money moves; the
        // evaluated price may be a whole cycle old.
        let fresh_quote = self.fresh_quote(signal).await?;
        if let Some(quote) = fresh_quote {
            if quote.size < stake {
                warn!(
                    market_id = %signal.market_id,
                    offered = %quote.size,
                    stake = %stake,
                    "Liquidity dried up before submission, dropping entry"
                );
                return Ok(None);
            }
        }
        let price = match fresh_quote.map(|quote| quote.price) {
            Some(fresh) if (fresh - price).abs() > PRICE_TOLERANCE => {
                let fresh = round_2dp(fresh);
                if let Err(problem) = validate_order(signal.selection_id, fresh, stake) {
                    warn!(market_id = %signal.market_id, %problem, "Moved price rejected by validation");
                    return Ok(None);
                }
                info!(
                    market_id = %signal.market_id,
                    evaluated = %price,
                    live = %fresh,
                    "Price moved past tolerance, submitting at live price"
                );
                fresh
            }
            Some(_) => price,
            None => {
                warn!(market_id = %signal.market_id, "Market no longer quotable, dropping entry");
                return Ok(None);
            }
        };

        let instruction = PlaceInstruction {
            order_type: OrderType::Limit,
            selection_id: signal.selection_id,
            handicap: signal.market_kind.handicap(),
            side: signal.side,
            limit_order: LimitOrder {
                size: stake,
                price,
                persistence_type: PersistenceType::Lapse,
            },
        };

        let customer_ref = format!("bdb{}", Utc::now().timestamp_millis());
        let report = self
            .exchange
            .place_order(&signal.market_id, instruction, &customer_ref)
            .await?;

        let accepted = report
            .instruction_reports
            .first()
            .filter(|r| report.status == InstructionStatus::Success
                && r.status == InstructionStatus::Success)
            .and_then(|r| r.bet_id.clone());

        let bet_id = match accepted {
            Some(bet_id) => bet_id,
            None => {
                warn!(
                    market_id = %signal.market_id,
                    error_code = report
                        .instruction_reports
                        .first()
                        .and_then(|r| r.error_code.as_deref())
                        .or(report.error_code.as_deref())
                        .unwrap_or("unknown"),
                    "Placement rejected by exchange"
                );
                return Ok(None);
            }
        };

        let position = Position {
            id: bet_id,
            market_id: signal.market_id.clone(),
            selection_id: signal.selection_id,
            event_id: signal.event_id.clone(),
            event_name: signal.event_name.clone(),
            sport: signal.sport,
            strategy: signal.strategy.to_string(),
            side: signal.side,
            entry_price: price,
            entry_time: Utc::now(),
            stake,
            liability: Position::liability_for(signal.side, price, stake),
            take_profit_pct: exit.take_profit_pct,
            stop_loss_pct: exit.stop_loss_pct,
            status: PositionStatus::Active,
            current_price: None,
            profit_pct: None,
            close_reason: None,
            close_time: None,
        };

        self.store.insert_position(&position)?;
        info!(
            position_id = %position.id,
            market_id = %position.market_id,
            event = %position.event_name,
            strategy = %position.strategy,
            side = %position.side,
            price = %position.entry_price,
            stake = %position.stake,
            "Position opened"
        );
        Ok(Some(position))
    }

    /// Best live quote for the signal's runner and side, if the market
    /// is still open and quoting.
    async fn fresh_quote(&self, signal: &EntrySignal) -> Result<Option<PriceSize>> {
        let books = self
            .exchange
            .list_market_book(&[signal.market_id.clone()])
            .await?;
        Ok(books
            .iter()
            .find(|b| b.market_id == signal.market_id && b.status == MarketStatus::Open)
            .and_then(|b| b.runner(signal.selection_id))
            .and_then(|r| r.best_for(signal.side)))
    }
}

fn validate_order(selection_id: i64, price: Decimal, stake: Decimal) -> Result<(), String> {
    if selection_id <= 0 {
        return Err(format!("invalid selection id {selection_id}"));
    }
    if price < MIN_PRICE || price > MAX_PRICE {
        return Err(format!("price {price} outside [{MIN_PRICE}, {MAX_PRICE}]"));
    }
    if stake <= Decimal::ZERO || stake > MAX_STAKE {
        return Err(format!("stake {stake} outside (0, {MAX_STAKE}]"));
    }
    Ok(())
}
