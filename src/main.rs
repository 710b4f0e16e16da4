use clap::Parser;
use tradeloop::cli::{Cli, Commands};
use tradeloop::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    let _telemetry = tradeloop::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(mode = ?config.execution.mode, "starting decision loop");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Watchlist: {}", config.engine.watchlist.join(", "));
            println!("  Interval: {}", config.engine.interval);
            println!("  Account: {}", config.engine.account_id);
            println!("  Execution: {:?}", config.execution.mode);
            println!(
                "  Risk: ceiling={}/day, pause after {} losses",
                config.risk.daily_trade_ceiling, config.risk.pause_threshold
            );
            println!(
                "  Strategy threshold: {} (scalp below, swing at or above)",
                config.strategy.capital_threshold
            );
        }
    }

    Ok(())
}
