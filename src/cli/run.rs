//! Run command implementation
//!
//! Wires the engine to its collaborators and drives `tick()` on a fixed
//! cadence. The engine itself does not own wall-clock scheduling; this loop
//! (or an external cron) does. Ctrl-C lets the in-flight cycle finish, then
//! exits with open positions persisted for re-attachment on restart.

use crate::config::{Config, ExecutionMode};
use crate::engine::Engine;
use crate::execution::{ExecutionGateway, PaperGateway};
use crate::providers::{
    JsonFileStore, MarketDataProvider, NotificationSink, SentimentProvider, SimulatedMarketData,
    StateStore, StaticSentimentProvider, TracingSink,
};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between decision cycles
    #[arg(long, default_value_t = 60)]
    pub cycle_secs: u64,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let gateway: Arc<dyn ExecutionGateway> = match config.execution.mode {
            ExecutionMode::Paper => {
                Arc::new(PaperGateway::new(config.execution.slippage_estimate))
            }
            ExecutionMode::Live => {
                anyhow::bail!("live mode needs an exchange gateway wired in; running paper is the default")
            }
        };

        let market: Arc<dyn MarketDataProvider> = Arc::new(SimulatedMarketData::new(65_000.0));
        let sentiment: Arc<dyn SentimentProvider> = Arc::new(StaticSentimentProvider::neutral());
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.execution.state_path));
        let sink: Arc<dyn NotificationSink> = Arc::new(TracingSink);

        let engine = Engine::new(config, market, sentiment, gateway, store, sink).await?;

        let mut interval = tokio::time::interval(Duration::from_secs(self.cycle_secs.max(1)));
        let watchlist = engine.watchlist().await;
        tracing::info!(
            cycle_secs = self.cycle_secs,
            ?watchlist,
            "decision loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    engine.tick().await;
                    if self.once {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested; open positions persist for restart");
                    break;
                }
            }
        }

        Ok(())
    }
}
