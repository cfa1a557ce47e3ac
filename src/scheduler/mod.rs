//! Single-threaded cycle scheduler.
//!
//! One polling cycle runs the position monitor first (exits before
//! entries), then each enabled sport pipeline: discover in-play
//! markets, fetch their books, run the entry gate chain, and hand
//! accepted signals to the executor. A cycle that fails is logged and
//! abandoned; the loop itself never dies short of ctrl-c.

use crate::config::Config;
use crate::exchange::{ExchangeApi, MarketBook};
use crate::monitor::PositionMonitor;
use crate::position::BalanceSnapshot;
use crate::store::PositionStore;
use crate::strategy::{
    EntryEvaluator, EntryOutcome, EntryStrategy, HockeyUnderLay, OrderExecutor, SoccerUnderBack,
    TennisFavoriteBack,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Catalogue page size per sport per cycle.
const MAX_MARKETS: u32 = 50;

pub struct TradingBot {
    config: Config,
    exchange: Arc<dyn ExchangeApi>,
    store: PositionStore,
    strategies: Vec<Box<dyn EntryStrategy>>,
    cycle: u64,
}

impl TradingBot {
    pub fn new(config: Config, exchange: Arc<dyn ExchangeApi>, store: PositionStore) -> Self {
        let mut strategies: Vec<Box<dyn EntryStrategy>> = Vec::new();
        if config.soccer.enabled {
            strategies.push(Box::new(SoccerUnderBack::new(
                config.soccer.clone(),
                config.bot.on_unknown_match_time,
            )));
        }
        if config.hockey.enabled {
            strategies.push(Box::new(HockeyUnderLay::new()));
        }
        if config.tennis.enabled {
            strategies.push(Box::new(TennisFavoriteBack::new(config.tennis.clone())));
        }

        Self {
            config,
            exchange,
            store,
            strategies,
            cycle: 0,
        }
    }

    /// Run until ctrl-c. Cycles are strictly sequential; the interval
    /// is a pause between cycles, not a fixed-rate tick.
    pub async fn run(&mut self) -> Result<()> {
        self.ensure_session().await?;

        let restored = self.store.active_positions()?;
        if !restored.is_empty() {
            info!(count = restored.len(), "Restored active positions from store");
        }
        info!(
            strategies = self.strategies.len(),
            interval_secs = self.config.bot.check_interval_secs,
            "Trading bot started"
        );

        loop {
            if let Err(e) = self.run_cycle().await {
                error!(cycle = self.cycle, error = ?e, "Cycle failed");
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping after current cycle");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.bot.check_interval_secs)) => {}
            }
        }

        info!("Trading bot stopped");
        Ok(())
    }

    /// One full polling cycle: session, exits, entries, stats.
    pub async fn run_cycle(&mut self) -> Result<()> {
        self.cycle += 1;
        debug!(cycle = self.cycle, "Cycle started");

        self.ensure_session().await?;

        let monitor = PositionMonitor::new(self.exchange.as_ref(), &self.store, &self.config);
        let report = monitor.check_positions().await?;
        if report.checked > 0 {
            debug!(
                checked = report.checked,
                closed = report.closed,
                unreadable = report.unreadable,
                "Monitor pass complete"
            );
        }

        // Entries need a funds figure; without one, only exits run.
        let balance = match self.exchange.account_funds().await {
            Ok(funds) => BalanceSnapshot {
                available: funds.available(),
                total: funds.total(),
                exposure: funds.exposure_abs(),
            },
            Err(e) => {
                warn!(error = ?e, "Account funds unavailable, skipping entries this cycle");
                self.emit_stats(None)?;
                return Ok(());
            }
        };

        for strategy in &self.strategies {
            if let Err(e) = self.run_pipeline(strategy.as_ref(), &balance).await {
                warn!(
                    sport = %strategy.sport(),
                    strategy = strategy.name(),
                    error = ?e,
                    "Sport pipeline failed"
                );
            }
        }

        self.emit_stats(Some(&balance))?;
        Ok(())
    }

    async fn ensure_session(&self) -> Result<()> {
        if !self.exchange.is_authenticated().await {
            self.exchange.login().await.context("Exchange login failed")?;
            info!("Exchange session established");
        }
        Ok(())
    }

    /// Discover, evaluate, and enter markets for one sport.
    async fn run_pipeline(
        &self,
        strategy: &dyn EntryStrategy,
        balance: &BalanceSnapshot,
    ) -> Result<()> {
        let filter = strategy.discovery_filter();
        let catalogues = self
            .exchange
            .list_market_catalogue(&filter, MAX_MARKETS)
            .await?;
        if catalogues.is_empty() {
            return Ok(());
        }

        let market_ids: Vec<String> = catalogues.iter().map(|c| c.market_id.clone()).collect();
        let books: HashMap<String, MarketBook> = self
            .exchange
            .list_market_book(&market_ids)
            .await?
            .into_iter()
            .map(|b| (b.market_id.clone(), b))
            .collect();

        let evaluator = EntryEvaluator::new(&self.config, &self.store);
        let executor = OrderExecutor::new(self.exchange.as_ref(), &self.store);
        let now = Utc::now();

        for catalogue in &catalogues {
            let book = match books.get(&catalogue.market_id) {
                Some(book) => book,
                None => continue,
            };

            match evaluator.evaluate(strategy, catalogue, book, balance, now)? {
                EntryOutcome::Enter(signal) => {
                    let exit = self.config.exit_params(strategy.sport());
                    executor.execute(&signal, exit).await?;
                }
                EntryOutcome::Skip(reason) => {
                    debug!(
                        market_id = %catalogue.market_id,
                        strategy = strategy.name(),
                        %reason,
                        "Market skipped"
                    );
                }
            }
        }

        Ok(())
    }

    /// Periodic aggregate logging and a balance snapshot row. A zero
    /// interval means never; it must not divide the cycle counter.
    fn emit_stats(&self, balance: Option<&BalanceSnapshot>) -> Result<()> {
        let every = self.config.bot.stats_every_cycles;
        if every == 0 || self.cycle % every != 0 {
            return Ok(());
        }

        let summary = self.store.summary()?;
        info!(
            cycle = self.cycle,
            active = summary.active,
            closed_profit = summary.closed_profit,
            closed_loss = summary.closed_loss,
            closed_timeout = summary.closed_timeout,
            realized_profit = %summary.realized_profit,
            available = balance.map(|b| b.available.to_string()).unwrap_or_else(|| "?".into()),
            "Session statistics"
        );

        if let Some(balance) = balance {
            self.store.record_balance_snapshot(balance)?;
        }
        Ok(())
    }
}
