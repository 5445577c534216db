//! Delta Pair Cycler - Main Entry Point
//!
//! Paper trading unless `LIVE_TRADING=true`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use delta_pair_cycler::config::{Config, MarketList};
use delta_pair_cycler::exchange::{Account, ExchangeClient, GatewayClient, PaperExchangeClient};
use delta_pair_cycler::persistence::{PositionStatus, StatusStore};
use delta_pair_cycler::strategy::{close_all_positions, CycleController, CycleOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Delta Pair Cycler CLI
#[derive(Parser)]
#[command(name = "delta-pair-cycler")]
#[command(version, about = "Delta-neutral long/short pair cycling on leveraged perpetuals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop (default)
    Run,

    /// Close every open position and mark the status record closed
    CloseAll,

    /// Show balance, open positions and the persisted status record
    Status,
}

/// Trading mode: Live (real money) or Paper (in-memory ledger).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Paper,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let trading_mode = if std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
        warn!("LIVE TRADING MODE - real money at risk");
        TradingMode::Live
    } else {
        info!("PAPER TRADING MODE - in-memory ledger");
        TradingMode::Paper
    };

    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;

    let account = Account::new(config.account.address.clone());
    let store = StatusStore::new(&config.paths.status_file);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, trading_mode, account, store).await,
        Commands::CloseAll => {
            let client = build_client(&config, trading_mode, &[])?;
            close_all(client.as_ref(), &account, &store).await
        }
        Commands::Status => {
            let client = build_client(&config, trading_mode, &[])?;
            show_status(client.as_ref(), &account, &store).await
        }
    }
}

async fn run(config: &Config, mode: TradingMode, account: Account, store: StatusStore) -> Result<()> {
    info!(
        "Delta Pair Cycler v{} starting ({:?})",
        env!("CARGO_PKG_VERSION"),
        mode
    );
    log_config(config);

    let markets = MarketList::load(&config.paths.markets_file)?.active_symbols();
    info!(count = markets.len(), markets = ?markets, "Active markets loaded");

    let client = build_client(config, mode, &markets)?;
    let controller = CycleController::new(
        client,
        account,
        config.trading.clone(),
        config.timing.clone(),
        markets,
    )
    .with_status_store(store);

    tokio::select! {
        outcome = controller.run() => {
            if outcome == CycleOutcome::Halted {
                let breaker = controller.state().breaker();
                anyhow::bail!(
                    "halted after {}/{} consecutive open failures",
                    breaker.failures(),
                    breaker.ceiling()
                );
            }
            info!(?outcome, "Trading loop finished");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received - leftover positions are closed on next start");
        }
    }

    info!(cycles = controller.state().cycle(), "Delta Pair Cycler shutdown complete");
    Ok(())
}

fn build_client(
    config: &Config,
    mode: TradingMode,
    markets: &[String],
) -> Result<Arc<dyn ExchangeClient>> {
    match mode {
        TradingMode::Live => {
            if config.gateway.api_key.is_empty() {
                warn!("No gateway API key configured");
            }
            let client = GatewayClient::new(&config.gateway, config.trading.retries)
                .context("Failed to create gateway client")?;
            Ok(Arc::new(client))
        }
        TradingMode::Paper => {
            let client = PaperExchangeClient::new(config.paper.initial_balance)
                .with_markets(markets.iter().cloned())
                .with_registration_lag(Duration::from_secs(config.paper.registration_lag_secs));
            Ok(Arc::new(client))
        }
    }
}

async fn close_all(client: &dyn ExchangeClient, account: &Account, store: &StatusStore) -> Result<()> {
    let summary = close_all_positions(client, account)
        .await
        .context("Failed to list open positions")?;

    if let Err(e) = store.update(account, PositionStatus::Closed) {
        warn!(error = %e, "Failed to write status record");
    }

    println!(
        "Closed {}/{} positions",
        summary.closed, summary.attempted
    );
    if !summary.is_complete() {
        error!(failed = summary.failed(), "Some positions are still open");
        anyhow::bail!("{} positions failed to close", summary.failed());
    }
    Ok(())
}

async fn show_status(client: &dyn ExchangeClient, account: &Account, store: &StatusStore) -> Result<()> {
    println!("Account: {}", account);

    let balance = client
        .get_balance(account)
        .await
        .context("Failed to query balance")?;
    println!("\nBalance: ${:.2}", balance);

    let positions = client
        .list_open_positions(account)
        .await
        .context("Failed to query open positions")?;

    if positions.is_empty() {
        println!("\nNo open positions");
    } else {
        println!("\nOpen positions ({})", positions.len());
        for position in &positions {
            println!(
                "   ├─ {:<5} #{} | pair {} | collateral ${:.2} | {}x | open {} | liq {}",
                position.direction.as_str(),
                position.trade_index,
                position.pair_index,
                position.collateral,
                position.leverage,
                position.open_price,
                position.liquidation_price,
            );
        }
    }

    let record = store.load()?;
    println!("\nStatus record ({})", store.path().display());
    if record.is_empty() {
        println!("   (empty)");
    }
    for (address, entry) in &record {
        println!(
            "   ├─ {} {} (updated {})",
            address,
            entry.position,
            entry.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}

/// Initialize logging to stdout and a daily rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "delta-pair-cycler.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("delta_pair_cycler=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let trading = &config.trading;
    info!("Configuration:");
    info!("   Account: {}", Account::new(config.account.address.clone()).prefix());
    info!(
        "   Order Value: ${}-${}",
        trading.order_value_usd.min, trading.order_value_usd.max
    );
    info!("   Max Leverage: {}x", trading.max_leverage);
    info!(
        "   Hold Duration: {}-{} min",
        trading.order_duration_min.min, trading.order_duration_min.max
    );
    info!(
        "   Cycle Delay: {}-{} min",
        trading.delay_between_trading_cycles_min.min, trading.delay_between_trading_cycles_min.max
    );
    info!("   Distribution Noise: {}", trading.orders_distribution_noise);
    info!("   Min Leg Size: ${}", trading.min_position_usd);
    info!("   Max Consecutive Failures: {}", trading.max_consecutive_failures);
    info!("   Read Retries: {}", trading.retries);
    info!("   Markets File: {}", config.paths.markets_file);
}
