//! Entry evaluation: the ordered gate chain every candidate market
//! passes before an order is placed.
//!
//! Each gate either lets the candidate through or yields a typed
//! [`SkipReason`]; a skipped market is simply reconsidered on the next
//! polling cycle. The chain is short-circuiting, so cheap structural
//! checks run before any persistence or balance lookups.

use crate::config::Config;
use crate::exchange::{MarketBook, MarketCatalogue, MarketFilter, MarketKind, MarketStatus, RunnerBook};
use crate::position::{BalanceSnapshot, Position, Side, Sport};
use crate::store::PositionStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use tracing::debug;

/// Minimum valid exchange price.
pub const MIN_PRICE: Decimal = dec!(1.01);

/// Why a candidate market was not entered this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MarketNotOpen(MarketStatus),
    RunnerNotFound,
    NoPriceAvailable,
    PriceOutOfRange(Decimal),
    InsufficientLiquidity { offered: Decimal, needed: Decimal },
    DuplicatePosition,
    SportLimitReached(u32),
    InsufficientFunds { available: Decimal, required: Decimal },
    TooEarly(i64),
    TooLate(i64),
    MatchTimeUnknown,
    FavoriteTooExpensive(Decimal),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MarketNotOpen(status) => write!(f, "market not open ({status:?})"),
            SkipReason::RunnerNotFound => write!(f, "target runner not found"),
            SkipReason::NoPriceAvailable => write!(f, "no price offered"),
            SkipReason::PriceOutOfRange(p) => write!(f, "price {p} below minimum"),
            SkipReason::InsufficientLiquidity { offered, needed } => {
                write!(f, "liquidity {offered} below stake {needed}")
            }
            SkipReason::DuplicatePosition => write!(f, "active position already in market"),
            SkipReason::SportLimitReached(limit) => {
                write!(f, "sport position limit {limit} reached")
            }
            SkipReason::InsufficientFunds { available, required } => {
                write!(f, "available {available} below required {required}")
            }
            SkipReason::TooEarly(minute) => write!(f, "match minute {minute} before window"),
            SkipReason::TooLate(minute) => write!(f, "match minute {minute} past window"),
            SkipReason::MatchTimeUnknown => write!(f, "elapsed match time unknown"),
            SkipReason::FavoriteTooExpensive(p) => write!(f, "favorite priced at {p}"),
        }
    }
}

/// A fully vetted entry, ready for the executor.
#[derive(Debug, Clone)]
pub struct EntrySignal {
    pub market_id: String,
    pub selection_id: i64,
    pub runner_name: String,
    pub event_id: String,
    pub event_name: String,
    pub sport: Sport,
    pub strategy: &'static str,
    pub side: Side,
    pub market_kind: MarketKind,
    pub price: Decimal,
    pub stake: Decimal,
}

/// Outcome of evaluating one candidate market.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Enter(EntrySignal),
    Skip(SkipReason),
}

/// One sport's entry rule: how to find candidate markets, which runner
/// to act on, and any sport-specific admission gate.
pub trait EntryStrategy: Send + Sync {
    fn sport(&self) -> Sport;

    /// Audit label recorded on every position this rule opens.
    fn name(&self) -> &'static str;

    fn side(&self) -> Side;

    fn market_kind(&self) -> MarketKind;

    /// Catalogue filter used for market discovery each cycle.
    fn discovery_filter(&self) -> MarketFilter;

    /// Pick the runner this rule acts on, or None when the market does
    /// not carry it.
    fn pick_runner<'a>(
        &self,
        catalogue: &MarketCatalogue,
        book: &'a MarketBook,
    ) -> Option<&'a RunnerBook>;

    /// Sport-specific admission gate, run after the shared checks.
    fn gate(
        &self,
        catalogue: &MarketCatalogue,
        book: &MarketBook,
        runner: &RunnerBook,
        now: DateTime<Utc>,
    ) -> Result<(), SkipReason>;
}

/// Runs the shared gate chain for any [`EntryStrategy`].
pub struct EntryEvaluator<'a> {
    config: &'a Config,
    store: &'a PositionStore,
}

impl<'a> EntryEvaluator<'a> {
    pub fn new(config: &'a Config, store: &'a PositionStore) -> Self {
        Self { config, store }
    }

    /// Evaluate one candidate market against the full gate chain.
    pub fn evaluate(
        &self,
        strategy: &dyn EntryStrategy,
        catalogue: &MarketCatalogue,
        book: &MarketBook,
        balance: &BalanceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<EntryOutcome> {
        if book.status != MarketStatus::Open {
            return Ok(EntryOutcome::Skip(SkipReason::MarketNotOpen(book.status)));
        }

        let runner = match strategy.pick_runner(catalogue, book) {
            Some(runner) => runner,
            None => return Ok(EntryOutcome::Skip(SkipReason::RunnerNotFound)),
        };

        let side = strategy.side();
        let quote = match runner.best_for(side) {
            Some(quote) => quote,
            None => return Ok(EntryOutcome::Skip(SkipReason::NoPriceAvailable)),
        };

        if quote.price < MIN_PRICE {
            return Ok(EntryOutcome::Skip(SkipReason::PriceOutOfRange(quote.price)));
        }

        let stake = self.config.bot.stake;
        if quote.size < stake {
            return Ok(EntryOutcome::Skip(SkipReason::InsufficientLiquidity {
                offered: quote.size,
                needed: stake,
            }));
        }

        if self.store.has_active_in_market(&catalogue.market_id)? {
            return Ok(EntryOutcome::Skip(SkipReason::DuplicatePosition));
        }

        let limit = self.config.bot.max_positions_per_sport;
        if self.store.active_count_for_sport(strategy.sport())? >= limit {
            return Ok(EntryOutcome::Skip(SkipReason::SportLimitReached(limit)));
        }

        let required = Position::capital_required(side, quote.price, stake);
        if balance.available < required {
            return Ok(EntryOutcome::Skip(SkipReason::InsufficientFunds {
                available: balance.available,
                required,
            }));
        }

        if let Err(reason) = strategy.gate(catalogue, book, runner, now) {
            return Ok(EntryOutcome::Skip(reason));
        }

        debug!(
            market_id = %catalogue.market_id,
            selection_id = runner.selection_id,
            price = %quote.price,
            strategy = strategy.name(),
            "Entry candidate accepted"
        );

        Ok(EntryOutcome::Enter(EntrySignal {
            market_id: catalogue.market_id.clone(),
            selection_id: runner.selection_id,
            runner_name: runner
                .runner_name
                .clone()
                .unwrap_or_else(|| catalogue.market_name.clone()),
            event_id: catalogue.event.as_ref().map(|e| e.id.clone()).unwrap_or_default(),
            event_name: catalogue
                .event
                .as_ref()
                .map(|e| e.name.clone())
                .unwrap_or_default(),
            sport: strategy.sport(),
            strategy: strategy.name(),
            side,
            market_kind: strategy.market_kind(),
            price: quote.price,
            stake,
        }))
    }
}

/// Find the book runner for a catalogue runner matched by name, falling
/// back to a name match on the book itself when the catalogue ids and
/// the book ids disagree.
pub fn runner_by_name<'a>(
    catalogue: &MarketCatalogue,
    book: &'a MarketBook,
    matches: impl Fn(&str) -> bool,
) -> Option<&'a RunnerBook> {
    if let Some(entry) = catalogue.runners.iter().find(|r| matches(&r.runner_name)) {
        if let Some(runner) = book.runner(entry.selection_id) {
            return Some(runner);
        }
    }
    book.runners
        .iter()
        .find(|r| r.runner_name.as_deref().is_some_and(&matches))
}
