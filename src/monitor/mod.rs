//! Position monitoring and exit management.
//!
//! Once per cycle every ACTIVE position is marked against the live
//! book and closed when a take-profit, stop-loss, or timeout threshold
//! fires. Closing cancels the unmatched exchange order; a failed
//! cancellation leaves the position ACTIVE for the next cycle rather
//! than recording an exit that never happened.

use crate::config::Config;
use crate::exchange::{ExchangeApi, InstructionStatus, MarketBook, MarketStatus};
use crate::position::{Position, PositionStatus};
use crate::store::PositionStore;
use crate::utils::decimal::{decay_profit_pct, round_2dp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Exit decision for one position on one cycle.
#[derive(Debug, Clone, PartialEq)]
enum ExitDecision {
    Hold,
    Close {
        status: PositionStatus,
        reason: String,
    },
}

/// What one monitoring pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: usize,
    /// Positions skipped because their market stopped quoting.
    pub unreadable: usize,
    pub closed: usize,
}

pub struct PositionMonitor<'a> {
    exchange: &'a dyn ExchangeApi,
    store: &'a PositionStore,
    config: &'a Config,
}

impl<'a> PositionMonitor<'a> {
    pub fn new(exchange: &'a dyn ExchangeApi, store: &'a PositionStore, config: &'a Config) -> Self {
        Self {
            exchange,
            store,
            config,
        }
    }

    /// Mark all ACTIVE positions and close those whose exit fires.
    pub async fn check_positions(&self) -> Result<MonitorReport> {
        let positions = self.store.active_positions()?;
        if positions.is_empty() {
            return Ok(MonitorReport::default());
        }

        let market_ids: Vec<String> = positions.iter().map(|p| p.market_id.clone()).collect();
        let books: HashMap<String, MarketBook> = self
            .exchange
            .list_market_book(&market_ids)
            .await?
            .into_iter()
            .map(|b| (b.market_id.clone(), b))
            .collect();

        let now = Utc::now();
        let mut report = MonitorReport {
            checked: positions.len(),
            ..Default::default()
        };

        for position in &positions {
            let current = books
                .get(&position.market_id)
                .filter(|b| b.status == MarketStatus::Open)
                .and_then(|b| b.runner(position.selection_id))
                .and_then(|r| r.best_for(position.side))
                .map(|quote| quote.price);

            let current = match current {
                Some(price) => price,
                None => {
                    // No readable exit price; hold and retry next cycle.
                    debug!(
                        position_id = %position.id,
                        market_id = %position.market_id,
                        "Market not quotable, holding"
                    );
                    report.unreadable += 1;
                    continue;
                }
            };

            let profit_pct = round_2dp(decay_profit_pct(position.side, position.entry_price, current));
            self.store.update_monitoring(&position.id, current, profit_pct)?;
            debug!(
                position_id = %position.id,
                price = %current,
                profit_pct = %profit_pct,
                "Position marked"
            );

            match self.decide_exit(position, profit_pct, now) {
                ExitDecision::Hold => {}
                ExitDecision::Close { status, reason } => {
                    if self.close(position, status, profit_pct, &reason, current, now).await? {
                        report.closed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Exit rules in priority order: take-profit, stop-loss, then the
    /// timeout harvest for sports that use it.
    fn decide_exit(
        &self,
        position: &Position,
        profit_pct: Decimal,
        now: DateTime<Utc>,
    ) -> ExitDecision {
        if profit_pct >= position.take_profit_pct {
            return ExitDecision::Close {
                status: PositionStatus::ClosedProfit,
                reason: format!("Take Profit: {profit_pct}%"),
            };
        }

        if profit_pct <= -position.stop_loss_pct {
            return ExitDecision::Close {
                status: PositionStatus::ClosedLoss,
                reason: format!("Stop Loss: {profit_pct}%"),
            };
        }

        if position.sport.uses_timeout_exit() {
            let timeout = self
                .config
                .exit_params(position.sport)
                .timeout_minutes
                .unwrap_or(i64::MAX);
            let minutes = position.minutes_open(now);
            // The timeout only harvests gains; a losing position rides
            // until its stop fires.
            if minutes >= timeout && profit_pct > Decimal::ZERO {
                return ExitDecision::Close {
                    status: PositionStatus::ClosedTimeout,
                    reason: format!("Timeout after {minutes}m: {profit_pct}%"),
                };
            }
        }

        ExitDecision::Hold
    }

    /// Cancel the order and record the terminal state. Returns false
    /// when the cancellation failed and the position stays ACTIVE.
    async fn close(
        &self,
        position: &Position,
        status: PositionStatus,
        profit_pct: Decimal,
        reason: &str,
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let report = self
            .exchange
            .cancel_orders(&position.market_id, &[position.id.clone()])
            .await?;

        if report.status != InstructionStatus::Success {
            warn!(
                position_id = %position.id,
                error_code = report.error_code.as_deref().unwrap_or("unknown"),
                "Cancellation failed, position stays active"
            );
            return Ok(false);
        }

        self.store
            .close_position(&position.id, status, profit_pct, reason, current_price, now)?;
        info!(
            position_id = %position.id,
            event = %position.event_name,
            status = %status,
            profit_pct = %profit_pct,
            reason,
            "Position closed"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::{fixtures, MockExchange};
    use crate::position::{Side, Sport};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn position(
        id: &str,
        sport: Sport,
        side: Side,
        entry_price: Decimal,
        take_profit_pct: Decimal,
        stop_loss_pct: Decimal,
        minutes_ago: i64,
    ) -> Position {
        Position {
            id: id.to_string(),
            market_id: format!("1.{id}"),
            selection_id: 101,
            event_id: "ev-1".to_string(),
            event_name: "Team A v Team B".to_string(),
            sport,
            strategy: "test".to_string(),
            side,
            entry_price,
            entry_time: Utc::now() - Duration::minutes(minutes_ago),
            stake: dec!(50),
            liability: Position::liability_for(side, entry_price, dec!(50)),
            take_profit_pct,
            stop_loss_pct,
            status: PositionStatus::Active,
            current_price: None,
            profit_pct: None,
            close_reason: None,
            close_time: None,
        }
    }

    fn quote(market_id: &str, side: Side, price: Decimal) -> crate::exchange::MarketBook {
        fixtures::quoted_book(market_id, 101, "Under 4.5 Goals", side, price, dec!(100))
    }

    #[tokio::test]
    async fn back_take_profit_closes_the_position() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();

        // BACK 1.25 -> 1.20 is +4%, past the 1.5% take-profit.
        let p = position("p1", Sport::Soccer, Side::Back, dec!(1.25), dec!(1.5), dec!(10), 2);
        store.insert_position(&p).unwrap();
        exchange.set_book(quote(&p.market_id, Side::Back, dec!(1.20)));

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.closed, 1);

        assert!(store.active_positions().unwrap().is_empty());
        let summary = store.summary().unwrap();
        assert_eq!(summary.closed_profit, 1);
        assert_eq!(exchange.cancelled.lock().unwrap().as_slice(), ["p1"]);
    }

    #[tokio::test]
    async fn lay_stop_loss_closes_the_position() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();

        // LAY 2.00 -> 1.80 is -10%, at the stop.
        let p = position("p1", Sport::IceHockey, Side::Lay, dec!(2.00), dec!(2), dec!(10), 1);
        store.insert_position(&p).unwrap();
        exchange.set_book(quote(&p.market_id, Side::Lay, dec!(1.80)));

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(store.summary().unwrap().closed_loss, 1);
    }

    #[tokio::test]
    async fn timeout_harvests_only_profitable_positions() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();

        // +0.8%: below take-profit but positive, held past the 10m timeout.
        let winner = position("p1", Sport::Soccer, Side::Back, dec!(1.25), dec!(1.5), dec!(10), 12);
        store.insert_position(&winner).unwrap();
        exchange.set_book(quote(&winner.market_id, Side::Back, dec!(1.24)));

        // -0.8%: also past the timeout but losing, so it rides.
        let loser = position("p2", Sport::Soccer, Side::Back, dec!(1.25), dec!(1.5), dec!(10), 12);
        store.insert_position(&loser).unwrap();
        exchange.set_book(quote(&loser.market_id, Side::Back, dec!(1.26)));

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.closed, 1);

        let summary = store.summary().unwrap();
        assert_eq!(summary.closed_timeout, 1);
        assert_eq!(summary.active, 1);
        assert_eq!(store.active_positions().unwrap()[0].id, "p2");
    }

    #[tokio::test]
    async fn tennis_has_no_timeout_exit() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();

        // Small profit, open for hours; tennis holds until a threshold.
        let p = position("p1", Sport::Tennis, Side::Back, dec!(1.30), dec!(3), dec!(10), 180);
        store.insert_position(&p).unwrap();
        exchange.set_book(quote(&p.market_id, Side::Back, dec!(1.29)));

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.closed, 0);
        assert_eq!(store.active_positions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_cancellation_keeps_the_position_active() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();
        exchange.fail_cancellations(true);

        let p = position("p1", Sport::Soccer, Side::Back, dec!(1.25), dec!(1.5), dec!(10), 2);
        store.insert_position(&p).unwrap();
        exchange.set_book(quote(&p.market_id, Side::Back, dec!(1.20)));

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.closed, 0);

        let active = store.active_positions().unwrap();
        assert_eq!(active.len(), 1);
        // The mark still happened even though the close failed.
        assert_eq!(active[0].profit_pct, Some(dec!(4.00)));
    }

    #[tokio::test]
    async fn suspended_market_is_held_not_marked() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();

        let p = position("p1", Sport::Soccer, Side::Back, dec!(1.25), dec!(1.5), dec!(10), 2);
        store.insert_position(&p).unwrap();
        exchange.set_book(fixtures::book_with_status(
            &p.market_id,
            MarketStatus::Suspended,
            vec![fixtures::runner(101, "Under 4.5 Goals", Some((dec!(1.20), dec!(100))), None)],
        ));

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.unreadable, 1);
        assert_eq!(report.closed, 0);
        assert!(store.active_positions().unwrap()[0].profit_pct.is_none());
    }

    #[tokio::test]
    async fn missing_book_is_held() {
        let config = Config::default();
        let store = PositionStore::in_memory().unwrap();
        let exchange = MockExchange::new();

        let p = position("p1", Sport::Soccer, Side::Back, dec!(1.25), dec!(1.5), dec!(10), 2);
        store.insert_position(&p).unwrap();
        // No book set: the market vanished from the feed.

        let monitor = PositionMonitor::new(&exchange, &store, &config);
        let report = monitor.check_positions().await.unwrap();
        assert_eq!(report.unreadable, 1);
        assert_eq!(store.active_positions().unwrap().len(), 1);
    }
}
