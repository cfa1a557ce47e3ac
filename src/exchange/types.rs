//! Type definitions for Betfair Sports/Accounts API payloads.
//!
//! Responses are parsed into these structures once at the client
//! boundary; strategy code never inspects raw JSON maps.

use crate::position::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Filter for `listMarketCatalogue`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_type_codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_play_only: Option<bool>,
}

impl MarketFilter {
    /// Filter for in-play markets of one event type and market type.
    pub fn in_play(event_type_id: &str, market_type_code: &str) -> Self {
        Self {
            event_type_ids: Some(vec![event_type_id.to_string()]),
            market_type_codes: Some(vec![market_type_code.to_string()]),
            in_play_only: Some(true),
            ..Default::default()
        }
    }

    /// Filter for a single known market.
    pub fn by_market_id(market_id: &str) -> Self {
        Self {
            market_ids: Some(vec![market_id.to_string()]),
            ..Default::default()
        }
    }
}

/// Event attached to a catalogued market.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Static runner metadata from the market catalogue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerCatalogue {
    pub selection_id: i64,
    #[serde(default)]
    pub runner_name: String,
}

/// A market as listed in the catalogue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCatalogue {
    pub market_id: String,
    #[serde(default)]
    pub market_name: String,
    pub market_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event: Option<Event>,
    #[serde(default)]
    pub runners: Vec<RunnerCatalogue>,
}

/// Market lifecycle state in the exchange's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Inactive,
    Open,
    Suspended,
    Closed,
}

/// One price level on the offer ladder.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PriceSize {
    pub price: Decimal,
    pub size: Decimal,
}

/// Best offered prices for a runner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePrices {
    #[serde(default)]
    pub available_to_back: Vec<PriceSize>,
    #[serde(default)]
    pub available_to_lay: Vec<PriceSize>,
}

/// Live runner data from the market book.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerBook {
    pub selection_id: i64,
    #[serde(default)]
    pub runner_name: Option<String>,
    #[serde(default)]
    pub ex: Option<ExchangePrices>,
}

impl RunnerBook {
    /// Best price offered to BACK this runner, if any.
    pub fn best_back(&self) -> Option<PriceSize> {
        self.ex
            .as_ref()
            .and_then(|ex| ex.available_to_back.first())
            .copied()
    }

    /// Best price offered to LAY this runner, if any.
    pub fn best_lay(&self) -> Option<PriceSize> {
        self.ex
            .as_ref()
            .and_then(|ex| ex.available_to_lay.first())
            .copied()
    }

    /// Best price on the ladder used when acting on the given side.
    pub fn best_for(&self, side: Side) -> Option<PriceSize> {
        match side {
            Side::Back => self.best_back(),
            Side::Lay => self.best_lay(),
        }
    }
}

/// Live snapshot of a market.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketBook {
    pub market_id: String,
    pub status: MarketStatus,
    #[serde(default)]
    pub runners: Vec<RunnerBook>,
}

impl MarketBook {
    /// Find a runner by selection id.
    pub fn runner(&self, selection_id: i64) -> Option<&RunnerBook> {
        self.runners.iter().find(|r| r.selection_id == selection_id)
    }
}

/// Kind of market being traded. Determines whether the exchange expects
/// a handicap field on placement instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    /// Head-to-head odds (tennis match winner). The handicap field must
    /// be omitted entirely; sending 0.0 is rejected for these markets.
    MatchOdds,
    /// Goal line markets (soccer Over/Under). Takes handicap 0.0.
    OverUnder,
    /// Period total-goals markets (ice hockey). Takes handicap 0.0.
    TotalGoals,
}

impl MarketKind {
    /// Handicap value the instruction must carry, or None when the
    /// field has to be left out.
    pub fn handicap(&self) -> Option<Decimal> {
        match self {
            MarketKind::MatchOdds => None,
            MarketKind::OverUnder | MarketKind::TotalGoals => Some(Decimal::ZERO),
        }
    }
}

/// Order type. Only limit orders are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
}

/// What the exchange does with an unmatched remainder when the market
/// turns in-play. Fixed to Lapse: cancel rather than persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceType {
    Lapse,
    Persist,
}

/// Limit order component of a placement instruction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrder {
    pub size: Decimal,
    pub price: Decimal,
    pub persistence_type: PersistenceType,
}

/// A single order placement instruction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceInstruction {
    pub order_type: OrderType,
    pub selection_id: i64,
    /// Omitted from the wire entirely when None.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handicap: Option<Decimal>,
    pub side: Side,
    pub limit_order: LimitOrder,
}

/// Status of an execution report or a single instruction within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionStatus {
    Success,
    Failure,
    Timeout,
    ProcessedWithErrors,
}

/// Per-instruction result of a placement call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceInstructionReport {
    pub status: InstructionStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub bet_id: Option<String>,
    #[serde(default)]
    pub average_price_matched: Option<Decimal>,
    #[serde(default)]
    pub size_matched: Option<Decimal>,
}

/// Result of a `placeOrders` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceExecutionReport {
    pub status: InstructionStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub instruction_reports: Vec<PlaceInstructionReport>,
}

/// Per-instruction result of a cancellation call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInstructionReport {
    pub status: InstructionStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub size_cancelled: Option<Decimal>,
}

/// Result of a `cancelOrders` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelExecutionReport {
    pub status: InstructionStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub instruction_reports: Vec<CancelInstructionReport>,
}

/// Account funds from the accounts API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFunds {
    pub available_to_bet_balance: Decimal,
    #[serde(default)]
    pub exposure: Decimal,
    #[serde(default)]
    pub retained_commission: Decimal,
}

impl AccountFunds {
    /// Funds available to stake right now.
    pub fn available(&self) -> Decimal {
        self.available_to_bet_balance
    }

    /// Exposure reported as a magnitude (the API reports it negative).
    pub fn exposure_abs(&self) -> Decimal {
        self.exposure.abs()
    }

    /// Total of available funds plus committed exposure.
    pub fn total(&self) -> Decimal {
        self.available_to_bet_balance + self.exposure.abs()
    }
}
