//! # Betfair Decay Bot
//!
//! An automated trading bot for the Betfair exchange built around
//! time-decay strategies on in-play sports markets.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Betfair JSON-RPC client (REST, session-token auth)
//! - `position`: Core position entity and lifecycle types
//! - `store`: SQLite-backed position and balance persistence
//! - `strategy`: Per-sport entry evaluators and order execution
//! - `monitor`: Open-position monitoring and exit rules
//! - `scheduler`: The polling cycle that sequences everything
//! - `utils`: Shared decimal arithmetic helpers

pub mod config;
pub mod exchange;
pub mod monitor;
pub mod position;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod utils;

pub use config::Config;
