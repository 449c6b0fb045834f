use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use futuresbot::auth::RequestSigner;
use futuresbot::exchange::KrakenFuturesClient;
use futuresbot::oracle::LlmOracle;
use futuresbot::persistence::MemoryStore;
use futuresbot::settings::{credentials_from_env, oracle_key_from_env, AppConfig};
use futuresbot::{CycleOptions, CycleReport, TradingCycle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};

/// Seconds to wait after a candle closes so the exchange has published it
const CANDLE_SETTLE_SECS: u64 = 15;

#[derive(Debug, Parser)]
#[command(name = "futuresbot", version, about = "Oracle-driven futures trading loop")]
struct Cli {
    /// Optional TOML settings file, overridden by BOT__* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a cycle after every candle close until Ctrl+C
    Run,
    /// Run a single cycle and print its report
    Once,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// When the next candle of `interval_minutes` closes, plus the settle delay
fn next_candle_boundary(interval_minutes: u32) -> Instant {
    let period = i64::from(interval_minutes.max(1)) * 60;
    let now = Utc::now().timestamp();
    let seconds_until_next = period - now.rem_euclid(period);

    Instant::now() + Duration::from_secs(seconds_until_next as u64 + CANDLE_SETTLE_SECS)
}

fn print_report(report: &CycleReport) {
    println!("cycle {}", report.id);
    println!("  action: {:?}", report.action);
    if let Some(outcome) = &report.outcome {
        println!("  state: {:?} -> {:?}", outcome.initial_state, outcome.final_state);
        for ack in &outcome.submitted {
            println!("  submitted: {} ({})", ack.order_id, ack.status);
        }
        for order_id in &outcome.cancelled {
            println!("  cancelled: {}", order_id);
        }
    }
    for note in &report.notes {
        println!("  note: {}", note);
    }
    println!("  memory saved: {}", report.memory_saved);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    tracing::info!("🚀 futuresbot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!(
        "  Trading: {} (priced from {})",
        config.exchange.trading_symbol,
        config.exchange.pricing_symbol
    );
    tracing::info!("  Candles: {} min", config.exchange.candle_interval_minutes);
    tracing::info!(
        "  Leverage: {}x (safety {}), risk {}%, stop {}%",
        config.risk.leverage,
        config.risk.leverage_safety_factor,
        config.risk.risk_percent,
        config.risk.stop_loss_percent
    );
    if config.exchange.live_trading {
        tracing::warn!("⚠️  LIVE trading enabled, orders will reach the exchange");
    } else {
        tracing::info!("📝 Paper mode, orders are simulated");
    }

    let cycle = build_cycle(&config)?;

    match cli.command {
        Command::Once => {
            let report = cycle.run_once().await;
            print_report(&report);
        }
        Command::Run => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                }
                _ = trading_loop(&cycle, config.exchange.candle_interval_minutes) => {}
            }
        }
    }

    tracing::info!("👋 futuresbot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("futuresbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_cycle(config: &AppConfig) -> anyhow::Result<TradingCycle> {
    let credentials = credentials_from_env().context("exchange credentials")?;
    let signer = RequestSigner::new(&credentials).context("exchange credentials")?;
    let exchange =
        KrakenFuturesClient::new(signer, &config.exchange).context("building exchange client")?;
    let oracle = LlmOracle::new(
        oracle_key_from_env().context("oracle credentials")?,
        config.oracle.api_url.clone(),
        config.oracle.model.clone(),
    );

    Ok(TradingCycle::new(
        Arc::new(exchange),
        Arc::new(oracle),
        MemoryStore::new(config.cycle.memory_path.clone()),
        CycleOptions::from_config(config),
    ))
}

// ============================================================================
// Trading Loop
// ============================================================================

async fn trading_loop(cycle: &TradingCycle, interval_minutes: u32) {
    let start = next_candle_boundary(interval_minutes);
    let wait = start.saturating_duration_since(Instant::now());
    tracing::info!("⏰ First cycle in {}s, then every {} min", wait.as_secs(), interval_minutes);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut ticker = interval_at(start, Duration::from_secs(u64::from(interval_minutes) * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        tracing::info!("💹 [TRADING] Tick at {}", Utc::now().format("%H:%M:%S"));

        let report = cycle.run_once().await;
        if report.is_degraded() {
            tracing::error!("🚨 Cycle {} left the account degraded: {:?}", report.id, report.notes);
        }
    }
}
