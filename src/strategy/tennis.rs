//! Tennis "Back Favorite" entry rule.
//!
//! Backs the lower-priced player of in-play MATCH_ODDS markets when
//! that favorite is short enough, betting on the price continuing to
//! shorten as the favorite consolidates.

use crate::config::TennisConfig;
use crate::exchange::{MarketBook, MarketCatalogue, MarketFilter, MarketKind, RunnerBook};
use crate::position::{Side, Sport};
use crate::strategy::evaluator::{EntryStrategy, SkipReason};
use chrono::{DateTime, Utc};

const MARKET_TYPE: &str = "MATCH_ODDS";

pub struct TennisFavoriteBack {
    config: TennisConfig,
}

impl TennisFavoriteBack {
    pub fn new(config: TennisConfig) -> Self {
        Self { config }
    }

    /// The runner with the lowest best back price. Runners without a
    /// quoted back price cannot be the favorite.
    fn favorite<'a>(book: &'a MarketBook) -> Option<&'a RunnerBook> {
        book.runners
            .iter()
            .filter_map(|r| r.best_back().map(|quote| (r, quote.price)))
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(runner, _)| runner)
    }
}

impl EntryStrategy for TennisFavoriteBack {
    fn sport(&self) -> Sport {
        Sport::Tennis
    }

    fn name(&self) -> &'static str {
        "Back Favorite"
    }

    fn side(&self) -> Side {
        Side::Back
    }

    fn market_kind(&self) -> MarketKind {
        MarketKind::MatchOdds
    }

    fn discovery_filter(&self) -> MarketFilter {
        MarketFilter::in_play(self.sport().event_type_id(), MARKET_TYPE)
    }

    fn pick_runner<'a>(
        &self,
        _catalogue: &MarketCatalogue,
        book: &'a MarketBook,
    ) -> Option<&'a RunnerBook> {
        Self::favorite(book)
    }

    fn gate(
        &self,
        _catalogue: &MarketCatalogue,
        _book: &MarketBook,
        runner: &RunnerBook,
        _now: DateTime<Utc>,
    ) -> Result<(), SkipReason> {
        match runner.best_back() {
            Some(quote) if quote.price <= self.config.favorite_max_odd => Ok(()),
            Some(quote) => Err(SkipReason::FavoriteTooExpensive(quote.price)),
            None => Err(SkipReason::NoPriceAvailable),
        }
    }
}
