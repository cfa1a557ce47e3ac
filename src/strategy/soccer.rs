//! Soccer "Back Under 4.5" entry rule.
//!
//! Backs the Under 4.5 Goals runner of in-play OVER_UNDER_45 markets
//! during an early-match window, betting on the price decaying while
//! the goal count stays low.

use crate::config::{MatchTimePolicy, SoccerConfig};
use crate::exchange::{MarketBook, MarketCatalogue, MarketFilter, MarketKind, RunnerBook};
use crate::position::{Side, Sport};
use crate::strategy::evaluator::{runner_by_name, EntryStrategy, SkipReason};
use chrono::{DateTime, Utc};

const MARKET_TYPE: &str = "OVER_UNDER_45";

pub struct SoccerUnderBack {
    config: SoccerConfig,
    time_policy: MatchTimePolicy,
}

impl SoccerUnderBack {
    pub fn new(config: SoccerConfig, time_policy: MatchTimePolicy) -> Self {
        Self {
            config,
            time_policy,
        }
    }

    /// Minutes since kickoff, derived from the market start time. None
    /// when the start time is missing or still in the future.
    fn elapsed_minutes(catalogue: &MarketCatalogue, now: DateTime<Utc>) -> Option<i64> {
        let start = catalogue.market_start_time?;
        let minutes = (now - start).num_minutes();
        (minutes >= 0).then_some(minutes)
    }

    fn is_under_runner(name: &str) -> bool {
        let upper = name.to_uppercase();
        upper.contains("UNDER") && upper.contains("4.5")
    }
}

impl EntryStrategy for SoccerUnderBack {
    fn sport(&self) -> Sport {
        Sport::Soccer
    }

    fn name(&self) -> &'static str {
        "Back Under 4.5"
    }

    fn side(&self) -> Side {
        Side::Back
    }

    fn market_kind(&self) -> MarketKind {
        MarketKind::OverUnder
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
        catalogue: &MarketCatalogue,
        _book: &MarketBook,
        _runner: &RunnerBook,
        now: DateTime<Utc>,
    ) -> Result<(), SkipReason> {
        let minutes = match Self::elapsed_minutes(catalogue, now) {
            Some(minutes) => minutes,
            None => {
                return match self.time_policy {
                    MatchTimePolicy::Proceed => Ok(()),
                    MatchTimePolicy::Abstain => Err(SkipReason::MatchTimeUnknown),
                }
            }
        };

        if minutes < self.config.entry_min_minute {
            return Err(SkipReason::TooEarly(minutes));
        }
        if minutes > self.config.entry_max_minute {
            return Err(SkipReason::TooLate(minutes));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::fixtures;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn catalogue(start_offset_min: Option<i64>) -> MarketCatalogue {
        MarketCatalogue {
            market_id: "1.234".to_string(),
            market_name: "Over/Under 4.5 Goals".to_string(),
            market_start_time: start_offset_min.map(|m| Utc::now() - Duration::minutes(m)),
            event: None,
            runners: vec![
                crate::exchange::RunnerCatalogue {
                    selection_id: 100,
                    runner_name: "Over 4.5 Goals".to_string(),
                },
                crate::exchange::RunnerCatalogue {
                    selection_id: 101,
                    runner_name: "Under 4.5 Goals".to_string(),
                },
            ],
        }
    }

    #[test]
    fn picks_the_under_runner_by_name() {
        let strategy = SoccerUnderBack::new(SoccerConfig::default(), MatchTimePolicy::Proceed);
        let catalogue = catalogue(Some(8));
        let book = fixtures::open_book(
            "1.234",
            vec![
                fixtures::runner(100, "Over 4.5 Goals", Some((dec!(12.0), dec!(50))), None),
                fixtures::runner(101, "Under 4.5 Goals", Some((dec!(1.25), dec!(100))), None),
            ],
        );

        let runner = strategy.pick_runner(&catalogue, &book).unwrap();
        assert_eq!(runner.selection_id, 101);
    }

    #[test]
    fn falls_back_to_book_names_when_catalogue_ids_disagree() {
        let strategy = SoccerUnderBack::new(SoccerConfig::default(), MatchTimePolicy::Proceed);
        let mut catalogue = catalogue(Some(8));
        catalogue.runners[1].selection_id = 999; // stale catalogue
        let book = fixtures::open_book(
            "1.234",
            vec![fixtures::runner(101, "Under 4.5 Goals", Some((dec!(1.25), dec!(100))), None)],
        );

        let runner = strategy.pick_runner(&catalogue, &book).unwrap();
        assert_eq!(runner.selection_id, 101);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let strategy = SoccerUnderBack::new(SoccerConfig::default(), MatchTimePolicy::Proceed);
        let book = fixtures::open_book("1.234", vec![]);
        let runner = fixtures::runner(101, "Under 4.5 Goals", None, None);
        let now = Utc::now();

        assert!(strategy.gate(&catalogue(Some(5)), &book, &runner, now).is_ok());
        assert!(strategy.gate(&catalogue(Some(15)), &book, &runner, now).is_ok());
        assert_eq!(
            strategy.gate(&catalogue(Some(4)), &book, &runner, now),
            Err(SkipReason::TooEarly(4))
        );
        assert_eq!(
            strategy.gate(&catalogue(Some(16)), &book, &runner, now),
            Err(SkipReason::TooLate(16))
        );
    }

    #[test]
    fn unknown_match_time_follows_policy() {
        let book = fixtures::open_book("1.234", vec![]);
        let runner = fixtures::runner(101, "Under 4.5 Goals", None, None);
        let now = Utc::now();

        let proceed = SoccerUnderBack::new(SoccerConfig::default(), MatchTimePolicy::Proceed);
        assert!(proceed.gate(&catalogue(None), &book, &runner, now).is_ok());

        let abstain = SoccerUnderBack::new(SoccerConfig::default(), MatchTimePolicy::Abstain);
        assert_eq!(
            abstain.gate(&catalogue(None), &book, &runner, now),
            Err(SkipReason::MatchTimeUnknown)
        );
    }

    #[test]
    fn future_kickoff_counts_as_unknown() {
        let abstain = SoccerUnderBack::new(SoccerConfig::default(), MatchTimePolicy::Abstain);
        let book = fixtures::open_book("1.234", vec![]);
        let runner = fixtures::runner(101, "Under 4.5 Goals", None, None);
        assert_eq!(
            abstain.gate(&catalogue(Some(-30)), &book, &runner, Utc::now()),
            Err(SkipReason::MatchTimeUnknown)
        );
    }
}
