//! Core position entity and lifecycle types.
//!
//! A [`Position`] is created by the order executor on a confirmed
//! placement and mutated only by the position monitor afterwards. The
//! lifecycle is `Active -> {ClosedProfit, ClosedLoss, ClosedTimeout}`;
//! every closed state is terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sports the bot trades. The set is fixed; each sport carries its own
/// entry strategy and exit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Soccer,
    IceHockey,
    Tennis,
}

impl Sport {
    /// Stable short code used in persistence. Never reorder or reuse.
    pub fn code(&self) -> &'static str {
        match self {
            Sport::Soccer => "SOC",
            Sport::IceHockey => "ICE",
            Sport::Tennis => "TEN",
        }
    }

    /// Parse a persisted short code. Unknown codes are an error, not a
    /// silent default.
    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "SOC" => Ok(Sport::Soccer),
            "ICE" => Ok(Sport::IceHockey),
            "TEN" => Ok(Sport::Tennis),
            other => anyhow::bail!("unknown sport code in store: {other:?}"),
        }
    }

    /// Betfair event type id for market discovery.
    pub fn event_type_id(&self) -> &'static str {
        match self {
            Sport::Soccer => "1",
            Sport::IceHockey => "7524",
            Sport::Tennis => "2",
        }
    }

    /// Sports whose positions are closed on a timeout window rather than
    /// held until an explicit take-profit/stop-loss.
    pub fn uses_timeout_exit(&self) -> bool {
        matches!(self, Sport::Soccer | Sport::IceHockey)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sport::Soccer => write!(f, "Soccer"),
            Sport::IceHockey => write!(f, "Ice Hockey"),
            Sport::Tennis => write!(f, "Tennis"),
        }
    }
}

/// Bet side. Determines both the price ladder used for entries/exits and
/// the sign convention of the profit calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Back,
    Lay,
}

impl Side {
    pub fn code(&self) -> &'static str {
        match self {
            Side::Back => "BACK",
            Side::Lay => "LAY",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "BACK" => Ok(Side::Back),
            "LAY" => Ok(Side::Lay),
            other => anyhow::bail!("unknown side code in store: {other:?}"),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Position lifecycle state. `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    ClosedProfit,
    ClosedLoss,
    ClosedTimeout,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Active)
    }

    /// Stable short code used in persistence.
    pub fn code(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACT",
            PositionStatus::ClosedProfit => "CLP",
            PositionStatus::ClosedLoss => "CLL",
            PositionStatus::ClosedTimeout => "CLT",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "ACT" => Ok(PositionStatus::Active),
            "CLP" => Ok(PositionStatus::ClosedProfit),
            "CLL" => Ok(PositionStatus::ClosedLoss),
            "CLT" => Ok(PositionStatus::ClosedTimeout),
            other => anyhow::bail!("unknown status code in store: {other:?}"),
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An open or closed trading position, keyed by the exchange bet id.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    /// Bet id assigned by the exchange on placement.
    pub id: String,
    pub market_id: String,
    pub selection_id: i64,
    pub event_id: String,
    pub event_name: String,
    pub sport: Sport,
    /// Audit label for the rule that opened the position.
    pub strategy: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub stake: Decimal,
    /// stake * (price - 1) for LAY; zero for BACK.
    pub liability: Decimal,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub status: PositionStatus,
    // Monitor-owned fields, updated once per poll cycle.
    pub current_price: Option<Decimal>,
    pub profit_pct: Option<Decimal>,
    pub close_reason: Option<String>,
    pub close_time: Option<DateTime<Utc>>,
}

impl Position {
    /// Liability required to hold a position of `side` at `price` for
    /// `stake`. BACK risks only the stake itself.
    pub fn liability_for(side: Side, price: Decimal, stake: Decimal) -> Decimal {
        match side {
            Side::Back => Decimal::ZERO,
            Side::Lay => stake * (price - Decimal::ONE),
        }
    }

    /// Capital that must be available to open the position: the stake
    /// for BACK, the liability for LAY.
    pub fn capital_required(side: Side, price: Decimal, stake: Decimal) -> Decimal {
        match side {
            Side::Back => stake,
            Side::Lay => Self::liability_for(side, price, stake),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Minutes elapsed since the position was opened.
    pub fn minutes_open(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_minutes()
    }
}

/// Account funds snapshot, read-only input to risk checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub available: Decimal,
    pub total: Decimal,
    pub exposure: Decimal,
}
