//! Ice hockey "Lay Under Period" entry rule.
//!
//! Lays the Under 1.5 or Under 2.5 runner of in-play TOTAL_GOALS
//! markets, betting that goals keep coming and the under price drifts
//! out. No timing gate; any open in-play market qualifies.

use crate::exchange::{MarketBook, MarketCatalogue, MarketFilter, MarketKind, RunnerBook};
use crate::position::{Side, Sport};
use crate::strategy::evaluator::{runner_by_name, EntryStrategy, SkipReason};
use chrono::{DateTime, Utc};

const MARKET_TYPE: &str = "TOTAL_GOALS";

/// Stateless: exit parameters are resolved from config at close time,
/// and the entry rule itself has no tunables.
#[derive(Default)]
pub struct HockeyUnderLay;

impl HockeyUnderLay {
    pub fn new() -> Self {
        Self
    }

    fn is_under_runner(name: &str) -> bool {
        let upper = name.to_uppercase();
        upper.contains("UNDER") && (upper.contains("1.5") || upper.contains("2.5"))
    }
}

impl EntryStrategy for HockeyUnderLay {
    fn sport(&self) -> Sport {
        Sport::IceHockey
    }

    fn name(&self) -> &'static str {
        "Lay Under Period"
    }

    fn side(&self) -> Side {
        Side::Lay
    }

    fn market_kind(&self) -> MarketKind {
        MarketKind::TotalGoals
    }

    fn discovery_filter(&self) -> MarketFilter {
        MarketFilter::in_play(self.sport().event_type_id(), MARKET_TYPE)
    }

    fn pick_runner<'a>(
        &self,
        catalogue: &MarketCatalogue,
        book: &'a MarketBook,
    ) -> Option<&'a RunnerBook> {
        runner_by_name(catalogue, book, Self::is_under_runner)
    }

    fn gate(
        &self,
        _catalogue: &MarketCatalogue,
        _book: &MarketBook,
        _runner: &RunnerBook,
        _now: DateTime<Utc>,
    ) -> Result<(), SkipReason> {
        Ok(())
    }
}
