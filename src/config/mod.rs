//! Configuration management for the decay bot.
//!
//! Loads settings from a `config` file and environment variables
//! (prefix `BDB`, `__` separator).

use crate::position::Sport;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Betfair API credentials
    #[serde(default)]
    pub betfair: BetfairConfig,
    /// Bot-wide trading parameters
    #[serde(default)]
    pub bot: BotConfig,
    /// Soccer strategy parameters
    #[serde(default)]
    pub soccer: SoccerConfig,
    /// Ice hockey strategy parameters
    #[serde(default)]
    pub hockey: HockeyConfig,
    /// Tennis strategy parameters
    #[serde(default)]
    pub tennis: TennisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetfairConfig {
    /// Application key sent with every API call
    #[serde(default)]
    pub app_key: String,
    /// Account username for interactive login
    #[serde(default)]
    pub username: String,
    /// Account password for interactive login
    #[serde(default)]
    pub password: String,
}

/// Policy for soccer entries when the elapsed match time cannot be
/// derived from the market start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTimePolicy {
    /// Enter anyway, skipping the timing gate.
    Proceed,
    /// Reject the candidate for this cycle.
    Abstain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Stake per order in account currency
    #[serde(default = "default_stake")]
    pub stake: Decimal,
    /// Maximum concurrent ACTIVE positions per sport
    #[serde(default = "default_max_positions_per_sport")]
    pub max_positions_per_sport: u32,
    /// Seconds between polling cycles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Emit aggregate statistics every N cycles
    #[serde(default = "default_stats_every_cycles")]
    pub stats_every_cycles: u64,
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// What to do when a soccer market's elapsed time is unknown
    #[serde(default = "default_match_time_policy")]
    pub on_unknown_match_time: MatchTimePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoccerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Earliest match minute at which an entry is allowed
    #[serde(default = "default_soccer_entry_min")]
    pub entry_min_minute: i64,
    /// Latest match minute at which an entry is allowed
    #[serde(default = "default_soccer_entry_max")]
    pub entry_max_minute: i64,
    #[serde(default = "default_soccer_take_profit")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_soccer_stop_loss")]
    pub stop_loss_pct: Decimal,
    /// Minutes after entry at which a profitable position is closed
    #[serde(default = "default_soccer_timeout")]
    pub timeout_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HockeyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hockey_take_profit")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_hockey_stop_loss")]
    pub stop_loss_pct: Decimal,
    /// Minutes after entry at which a profitable position is closed
    #[serde(default = "default_hockey_timeout")]
    pub timeout_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TennisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum best-back odd for the favorite to qualify
    #[serde(default = "default_favorite_max_odd")]
    pub favorite_max_odd: Decimal,
    #[serde(default = "default_tennis_take_profit")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_tennis_stop_loss")]
    pub stop_loss_pct: Decimal,
}

/// Exit parameters for one sport, resolved from the per-sport sections.
#[derive(Debug, Clone, Copy)]
pub struct ExitParams {
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    /// None for sports without a timeout exit.
    pub timeout_minutes: Option<i64>,
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_stake() -> Decimal {
    Decimal::new(50, 0) // 50.00
}

fn default_max_positions_per_sport() -> u32 {
    10
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_stats_every_cycles() -> u64 {
    10
}

fn default_db_path() -> String {
    "data/bets.db".to_string()
}

fn default_match_time_policy() -> MatchTimePolicy {
    MatchTimePolicy::Proceed
}

fn default_soccer_entry_min() -> i64 {
    5
}

fn default_soccer_entry_max() -> i64 {
    15
}

fn default_soccer_take_profit() -> Decimal {
    Decimal::new(15, 1) // 1.5%
}

fn default_soccer_stop_loss() -> Decimal {
    Decimal::new(10, 0) // 10%
}

fn default_soccer_timeout() -> i64 {
    10
}

fn default_hockey_take_profit() -> Decimal {
    Decimal::new(2, 0) // 2%
}

fn default_hockey_stop_loss() -> Decimal {
    Decimal::new(15, 0) // 15%
}

fn default_hockey_timeout() -> i64 {
    5
}

fn default_favorite_max_odd() -> Decimal {
    Decimal::new(140, 2) // 1.40
}

fn default_tennis_take_profit() -> Decimal {
    Decimal::new(3, 0) // 3%
}

fn default_tennis_stop_loss() -> Decimal {
    Decimal::new(10, 0) // 10%
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("BDB"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.bot.stake > Decimal::ZERO, "stake must be positive");

        anyhow::ensure!(
            self.bot.max_positions_per_sport > 0,
            "max_positions_per_sport must be at least 1"
        );

        anyhow::ensure!(
            self.bot.stats_every_cycles > 0,
            "stats_every_cycles must be at least 1"
        );

        anyhow::ensure!(
            self.soccer.entry_min_minute <= self.soccer.entry_max_minute,
            "soccer entry_min_minute must not exceed entry_max_minute"
        );

        anyhow::ensure!(
            self.tennis.favorite_max_odd > Decimal::ONE,
            "tennis favorite_max_odd must exceed 1.0"
        );

        Ok(())
    }

    /// Whether the given sport's pipeline is enabled.
    pub fn sport_enabled(&self, sport: Sport) -> bool {
        match sport {
            Sport::Soccer => self.soccer.enabled,
            Sport::IceHockey => self.hockey.enabled,
            Sport::Tennis => self.tennis.enabled,
        }
    }

    /// Exit thresholds for the given sport.
    pub fn exit_params(&self, sport: Sport) -> ExitParams {
        match sport {
            Sport::Soccer => ExitParams {
                take_profit_pct: self.soccer.take_profit_pct,
                stop_loss_pct: self.soccer.stop_loss_pct,
                timeout_minutes: Some(self.soccer.timeout_minutes),
            },
            Sport::IceHockey => ExitParams {
                take_profit_pct: self.hockey.take_profit_pct,
                stop_loss_pct: self.hockey.stop_loss_pct,
                timeout_minutes: Some(self.hockey.timeout_minutes),
            },
            Sport::Tennis => ExitParams {
                take_profit_pct: self.tennis.take_profit_pct,
                stop_loss_pct: self.tennis.stop_loss_pct,
                timeout_minutes: None,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            betfair: BetfairConfig::default(),
            bot: BotConfig::default(),
            soccer: SoccerConfig::default(),
            hockey: HockeyConfig::default(),
            tennis: TennisConfig::default(),
        }
    }
}

impl Default for BetfairConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            stake: default_stake(),
            max_positions_per_sport: default_max_positions_per_sport(),
            check_interval_secs: default_check_interval_secs(),
            stats_every_cycles: default_stats_every_cycles(),
            db_path: default_db_path(),
            on_unknown_match_time: default_match_time_policy(),
        }
    }
}

impl Default for SoccerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_min_minute: default_soccer_entry_min(),
            entry_max_minute: default_soccer_entry_max(),
            take_profit_pct: default_soccer_take_profit(),
            stop_loss_pct: default_soccer_stop_loss(),
            timeout_minutes: default_soccer_timeout(),
        }
    }
}

impl Default for HockeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            take_profit_pct: default_hockey_take_profit(),
            stop_loss_pct: default_hockey_stop_loss(),
            timeout_minutes: default_hockey_timeout(),
        }
    }
}

impl Default for TennisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            favorite_max_odd: default_favorite_max_odd(),
            take_profit_pct: default_tennis_take_profit(),
            stop_loss_pct: default_tennis_stop_loss(),
        }
    }
}
