//! Abstract exchange contract consumed by the trading core.
//!
//! The strategy, executor, monitor, and scheduler all talk to the
//! exchange through this trait so tests can substitute a scripted
//! in-memory implementation for the live JSON-RPC client.

use crate::exchange::error::ExchangeError;
use crate::exchange::types::{
    AccountFunds, CancelExecutionReport, MarketBook, MarketCatalogue, MarketFilter,
    PlaceExecutionReport, PlaceInstruction,
};
use async_trait::async_trait;

/// The narrow exchange surface the trading core depends on.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Establish a fresh session.
    async fn login(&self) -> Result<(), ExchangeError>;

    /// Whether a session token is currently held. Says nothing about
    /// server-side validity; expiry is detected reactively per call.
    async fn is_authenticated(&self) -> bool;

    /// List markets matching a filter, with catalogue metadata.
    async fn list_market_catalogue(
        &self,
        filter: &MarketFilter,
        max_results: u32,
    ) -> Result<Vec<MarketCatalogue>, ExchangeError>;

    /// Fetch live books (status, runners, best offers) for markets.
    async fn list_market_book(
        &self,
        market_ids: &[String],
    ) -> Result<Vec<MarketBook>, ExchangeError>;

    /// Submit a single placement instruction.
    async fn place_order(
        &self,
        market_id: &str,
        instruction: PlaceInstruction,
        customer_ref: &str,
    ) -> Result<PlaceExecutionReport, ExchangeError>;

    /// Cancel unmatched orders (the bot's cash-out path).
    async fn cancel_orders(
        &self,
        market_id: &str,
        bet_ids: &[String],
    ) -> Result<CancelExecutionReport, ExchangeError>;

    /// Current account funds.
    async fn account_funds(&self) -> Result<AccountFunds, ExchangeError>;
}
