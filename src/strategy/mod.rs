//! Entry strategies and order execution.
//!
//! One [`EntryStrategy`] per sport, a shared [`EntryEvaluator`] gate
//! chain, and the [`OrderExecutor`] that turns accepted signals into
//! exchange orders.

mod evaluator;
mod executor;
pub mod hockey;
pub mod soccer;
pub mod tennis;

pub use evaluator::{EntryEvaluator, EntryOutcome, EntrySignal, EntryStrategy, SkipReason};
pub use executor::OrderExecutor;
pub use hockey::HockeyUnderLay;
pub use soccer::SoccerUnderBack;
pub use tennis::TennisFavoriteBack;
