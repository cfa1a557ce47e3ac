//! Betfair exchange integration.
//!
//! The trading core consumes the exchange through the [`ExchangeApi`]
//! trait. The live implementation speaks JSON-RPC to the Sports and
//! Accounts APIs with session-token authentication; the mock keeps
//! everything in memory for tests.

mod client;
mod error;
pub mod mock;
mod traits;
mod types;

pub use client::BetfairClient;
pub use error::ExchangeError;
pub use mock::MockExchange;
pub use traits::ExchangeApi;
pub use types::*;
