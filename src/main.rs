use anyhow::Result;
use betfair_decay_bot::config::Config;
use betfair_decay_bot::exchange::BetfairClient;
use betfair_decay_bot::scheduler::TradingBot;
use betfair_decay_bot::store::PositionStore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "betfair-decay-bot", version, about = "Automated time-decay trading on the Betfair exchange")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trading loop (default)
    Run,
    /// Print position statistics from the local store
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing();

    let config = Config::load()?;
    config.validate()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Status => status(&config),
    }
}

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("logs", "bot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    guard
}

async fn run(config: Config) -> Result<()> {
    anyhow::ensure!(
        !config.betfair.app_key.is_empty()
            && !config.betfair.username.is_empty()
            && !config.betfair.password.is_empty(),
        "Betfair credentials missing: set betfair.app_key, betfair.username, betfair.password"
    );

    let store = PositionStore::new(&config.bot.db_path)?;
    let client = BetfairClient::new(&config.betfair)?;
    let mut bot = TradingBot::new(config, Arc::new(client), store);
    bot.run().await
}

fn status(config: &Config) -> Result<()> {
    let store = PositionStore::new(&config.bot.db_path)?;
    let summary = store.summary()?;

    info!(
        active = summary.active,
        closed_profit = summary.closed_profit,
        closed_loss = summary.closed_loss,
        closed_timeout = summary.closed_timeout,
        realized_profit = %summary.realized_profit,
        "Store summary"
    );

    for position in store.active_positions()? {
        info!(
            position_id = %position.id,
            event = %position.event_name,
            sport = %position.sport,
            strategy = %position.strategy,
            side = %position.side,
            entry_price = %position.entry_price,
            current_price = position.current_price.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
            profit_pct = position.profit_pct.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
            "Active position"
        );
    }

    Ok(())
}
