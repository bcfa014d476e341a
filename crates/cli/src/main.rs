//! Command Line Interface for the CLMM cycle strategy.
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clmm_cycle_data::{
    Database, ExecutionClient, FileOutbox, FileStateStore, MarketDataProvider, MarketSnapshot,
    SnapshotMarketData, StateStore,
};
use clmm_cycle_domain::config::StrategyConfig;
use clmm_cycle_execution::prelude::*;
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "clmm-cycle")]
#[command(about = "Cyclical concentrated-liquidity strategy runner", long_about = None)]
struct Cli {
    /// Strategy configuration file (JSON)
    #[arg(short, long, env = "CLMM_CYCLE_CONFIG")]
    config: PathBuf,

    /// Directory holding the state documents (ignored when DATABASE_URL is set)
    #[arg(long, default_value = "state")]
    state_dir: PathBuf,

    /// Postgres connection string for the state store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Market snapshot file (JSON), re-read on every tick
    #[arg(short, long)]
    market: Option<PathBuf>,

    /// Outbox directory shared with the executor
    #[arg(long, default_value = "outbox")]
    outbox: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single invocation of the state machine
    Tick,
    /// Tick on a fixed interval until interrupted or a fatal error occurs
    Watch {
        /// Seconds between ticks
        #[arg(short, long, default_value_t = 60)]
        every: u64,
    },
    /// Print the persisted state
    Status,
    /// Start a new cycle after the current one was marked complete
    Restart,
    /// Mark the current cycle complete
    Complete,
    /// Validate the configuration file and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Arc::new(
        StrategyConfig::from_path(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?,
    );

    match &cli.command {
        Commands::CheckConfig => {
            println!("✅ Configuration {} is valid", config.id);
            println!("   Pool:      {}", config.pool_address);
            println!(
                "   Pair:      {}/{}",
                config.base_token.symbol, config.quote_token.symbol
            );
            println!("   Policy:    {:?}", config.trigger_policy);
            println!("   Interval:  {}s", config.rebalance_interval);
            if config.pause_strategy {
                println!("⏸️  pause_strategy is set");
            }
            if config.initiate_teardown {
                println!("🛑 initiate_teardown is set");
            }
        }
        Commands::Tick => {
            let runner = build_runner(&cli, config.clone(), true).await?;
            let report = runner.tick().await?;
            print_report(&report);
        }
        Commands::Watch { every } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(*every));
            info!(strategy_id = %config.id, every_secs = every, "Watching strategy");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let runner = build_runner(&cli, config.clone(), true).await?;
                        match runner.tick().await {
                            Ok(report) => print_report(&report),
                            Err(e) => {
                                error!(error = %e, "Tick failed, stopping");
                                return Err(e.into());
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, stopping");
                        break;
                    }
                }
            }
        }
        Commands::Status => {
            let runner = build_runner(&cli, config.clone(), false).await?;
            match runner.status().await? {
                Some(stored) => {
                    println!("📄 {} (version {})", config.id, stored.version);
                    println!("{}", serde_json::to_string_pretty(&stored.state)?);
                }
                None => println!("No state persisted for {}", config.id),
            }
        }
        Commands::Restart => {
            let runner = build_runner(&cli, config.clone(), false).await?;
            let state = runner.restart().await?;
            println!("🔄 {} is at {}", config.id, state.current_state);
        }
        Commands::Complete => {
            let runner = build_runner(&cli, config.clone(), false).await?;
            let state = runner.mark_complete().await?;
            println!("🏁 {} is at {}", config.id, state.current_state);
        }
    }

    Ok(())
}

async fn build_runner(
    cli: &Cli,
    config: Arc<StrategyConfig>,
    needs_market: bool,
) -> Result<StrategyRunner> {
    let market: Arc<dyn MarketDataProvider> = match &cli.market {
        Some(path) => Arc::new(SnapshotMarketData::from_path(path).await?),
        None if needs_market => bail!("--market is required for this command"),
        None => Arc::new(SnapshotMarketData::new(MarketSnapshot::default())),
    };

    let store: Arc<dyn StateStore> = match &cli.database_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("failed to connect to the state database")?;
            db.migrate().await?;
            Arc::new(db.states())
        }
        None => Arc::new(FileStateStore::new(&cli.state_dir)),
    };

    let execution: Arc<dyn ExecutionClient> = Arc::new(FileOutbox::new(&cli.outbox));
    Ok(StrategyRunner::new(config, market, store, execution)?)
}

fn print_report(report: &TickReport) {
    let marker = match report.kind {
        TransitionKind::Emitted | TransitionKind::Retried => "📤",
        TransitionKind::Waiting => "⏳",
        TransitionKind::Paused => "⏸️",
        TransitionKind::Updated | TransitionKind::Idle => "✅",
    };
    print!(
        "{marker} {} -> {} ({:?}, version {})",
        report.kind, report.state, report.flow, report.version
    );
    match report.submitted {
        Some(id) => println!(", submitted batch {id}"),
        None => println!(),
    }
}
