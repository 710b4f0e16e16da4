//! Decision loop engine
//!
//! One `tick()` advances every watched symbol through its cycle: monitor an
//! active position, or generate signals, fuse them, evaluate risk, and enter.
//! Symbol cycles run concurrently under a single-writer-per-symbol
//! discipline; the account-level risk state is the only cross-symbol state
//! and every mutation of it is serialized behind one lock. Snapshot saves
//! and notifications are spawned onto the same runtime and never block the
//! next cycle.

use crate::candles::{Interval, SeriesCache};
use crate::config::Config;
use crate::error::{EngineError, ProviderError};
use crate::execution::{ExecutionGateway, OrderRequest, OrderSide, OrderStatus, OrderType};
use crate::fusion::{fuse, Action, FusedSignal, FusionConfig};
use crate::lifecycle::{
    check_exit, CloseReason, LifecycleConfig, Position, PositionBook, Side,
};
use crate::providers::{
    EngineEvent, EngineSnapshot, MarketDataProvider, NotificationSink, SentimentProvider,
    StateStore,
};
use crate::risk::{RiskManager, RiskState};
use crate::sentiment::SentimentEngine;
use crate::strategy::{select_profile, StrategyConfig, StrategyProfile};
use crate::technical::{self, TechnicalConfig};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Engine-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Symbols iterated each cycle
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    /// Candle interval driving the analysis
    #[serde(default = "default_interval")]
    pub interval: Interval,
    /// Candles requested from the cache per cycle
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_account_id")]
    pub account_id: String,
    /// Allocatable capital at first start (restored capital wins later)
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
}

fn default_watchlist() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}
fn default_interval() -> Interval {
    Interval::M5
}
fn default_lookback() -> usize {
    120
}
fn default_account_id() -> String {
    "main".to_string()
}
fn default_initial_capital() -> Decimal {
    Decimal::from(500)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchlist: default_watchlist(),
            interval: default_interval(),
            lookback: default_lookback(),
            account_id: default_account_id(),
            initial_capital: default_initial_capital(),
        }
    }
}

/// The hybrid trading decision engine
pub struct Engine {
    config: EngineConfig,
    technical_config: TechnicalConfig,
    fusion_config: FusionConfig,
    strategy_config: StrategyConfig,
    lifecycle_config: LifecycleConfig,
    cache: SeriesCache,
    sentiment: SentimentEngine,
    gateway: Arc<dyn ExecutionGateway>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn NotificationSink>,
    risk_manager: RiskManager,
    /// Account-level state: increments are serialized behind this lock
    risk_state: Mutex<RiskState>,
    book: RwLock<PositionBook>,
    capital: RwLock<Decimal>,
    watchlist: RwLock<Vec<String>>,
    /// Next closing retry per symbol; transient, rebuilt after restart
    close_retry_at: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Engine {
    /// Build the engine, re-attaching durable state from the store
    pub async fn new(
        config: &Config,
        market: Arc<dyn MarketDataProvider>,
        sentiment_provider: Arc<dyn SentimentProvider>,
        gateway: Arc<dyn ExecutionGateway>,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, EngineError> {
        let now = Utc::now();
        let snapshot = store
            .load()
            .await
            .map_err(|err| EngineError::Storage(err.to_string()))?;

        let (book, risk_state) = match snapshot {
            Some(snap) => {
                tracing::info!(
                    positions = snap.positions.len(),
                    "re-attached durable state"
                );
                (PositionBook::restore(snap.positions), snap.risk)
            }
            None => (
                PositionBook::new(),
                RiskState::new(&config.engine.account_id, now),
            ),
        };

        Ok(Self {
            cache: SeriesCache::new(market, config.cache.clone()),
            sentiment: SentimentEngine::new(sentiment_provider, config.sentiment.clone()),
            gateway,
            store,
            sink,
            risk_manager: RiskManager::new(config.risk.clone()),
            risk_state: Mutex::new(risk_state),
            book: RwLock::new(book),
            capital: RwLock::new(config.engine.initial_capital),
            watchlist: RwLock::new(config.engine.watchlist.clone()),
            close_retry_at: Mutex::new(HashMap::new()),
            technical_config: config.technical.clone(),
            fusion_config: config.fusion.clone(),
            strategy_config: config.strategy.clone(),
            lifecycle_config: config.lifecycle.clone(),
            config: config.engine.clone(),
        })
    }

    /// Advance one decision cycle across the watch-list. Per-symbol errors
    /// are isolated; a failing symbol never aborts the others.
    pub async fn tick(&self) {
        let now = Utc::now();
        let started = std::time::Instant::now();

        let capital = *self.capital.read().await;
        let profile = select_profile(capital, &self.strategy_config);
        metrics::gauge!("tradeloop_capital").set(capital.to_f64().unwrap_or(0.0));

        let symbols = self.watchlist.read().await.clone();
        let outcomes = join_all(
            symbols
                .iter()
                .map(|symbol| self.run_symbol_cycle(symbol, &profile, now)),
        )
        .await;

        for (symbol, outcome) in symbols.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {}
                Err(EngineError::Validation { reason, .. }) => {
                    tracing::warn!(%symbol, %reason, "dropping symbol from watch-list");
                    self.watchlist.write().await.retain(|s| s != symbol);
                    self.publish_background(EngineEvent::SymbolDropped {
                        symbol: symbol.clone(),
                        reason,
                    });
                }
                Err(err) => {
                    // Isolated to this symbol's cycle; retried next tick.
                    tracing::warn!(%symbol, error = %err, "symbol cycle failed");
                }
            }
        }

        metrics::gauge!("tradeloop_open_positions")
            .set(self.book.read().await.len() as f64);
        metrics::histogram!("tradeloop_cycle_duration_ms")
            .record(started.elapsed().as_millis() as f64);

        self.save_snapshot_background().await;
    }

    /// One symbol's cycle: lifecycle monitoring when a position is active,
    /// entry evaluation otherwise.
    async fn run_symbol_cycle(
        &self,
        symbol: &str,
        profile: &StrategyProfile,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let active = self.book.read().await.get(symbol).cloned();
        match active {
            Some(position) => self.monitor_position(&position, now).await,
            None => self.evaluate_entry(symbol, profile, now).await,
        }
    }

    async fn monitor_position(
        &self,
        position: &Position,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let symbol = position.symbol.as_str();
        let series = self
            .cache
            .get_series(symbol, self.config.interval, self.config.lookback)
            .await?;
        let Some(price) = series.last_close() else {
            return Ok(());
        };

        use crate::lifecycle::PositionState;
        match position.state {
            PositionState::Open => {
                if let Some(reason) = check_exit(position, price, now) {
                    tracing::info!(%symbol, ?reason, %price, "exit rule triggered");
                    self.book.write().await.begin_close(symbol, reason).ok();
                    self.attempt_close(symbol, price, now).await;
                }
            }
            PositionState::Closing => {
                let due = self
                    .close_retry_at
                    .lock()
                    .await
                    .get(symbol)
                    .map(|at| now >= *at)
                    .unwrap_or(true);
                if due {
                    self.attempt_close(symbol, price, now).await;
                }
            }
            PositionState::Closed => {}
        }
        Ok(())
    }

    /// Submit the closing order. Failure keeps the position CLOSING and
    /// schedules a bounded-backoff retry; exhausting the attempt budget
    /// escalates a fatal alert for manual intervention.
    async fn attempt_close(&self, symbol: &str, price: Decimal, now: DateTime<Utc>) {
        let Some(position) = self.book.read().await.get(symbol).cloned() else {
            return;
        };

        let order = OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::exit(position.side),
            quantity: position.quantity,
            order_type: OrderType::Market,
            price,
        };

        let submitted = self.submit_with_deadline(order).await;
        match submitted {
            Ok(result) if result.status == OrderStatus::Filled => {
                let closed = self
                    .book
                    .write()
                    .await
                    .complete_close(symbol, result.fill_price);
                let Ok((position, pnl)) = closed else { return };

                {
                    let mut risk = self.risk_state.lock().await;
                    self.risk_manager.settle(&mut risk, pnl, now);
                }
                {
                    let mut capital = self.capital.write().await;
                    *capital += pnl;
                }
                self.close_retry_at.lock().await.remove(symbol);

                tracing::info!(
                    %symbol,
                    exit_price = %result.fill_price,
                    %pnl,
                    reason = ?position.close_reason,
                    "position closed"
                );
                self.publish_background(EngineEvent::PositionClosed {
                    symbol: symbol.to_string(),
                    exit_price: result.fill_price,
                    realized_pnl: pnl,
                    reason: position.close_reason.unwrap_or(CloseReason::Manual),
                });
                self.save_snapshot_background().await;
            }
            other => {
                let cause = match other {
                    Ok(rejected) => format!("order rejected: {:?}", rejected.status),
                    Err(err) => err.to_string(),
                };
                let attempts = self
                    .book
                    .write()
                    .await
                    .record_close_attempt(symbol)
                    .unwrap_or(0);
                tracing::warn!(%symbol, attempts, %cause, "closing order failed");
                metrics::counter!("tradeloop_close_failures_total").increment(1);

                if attempts == self.lifecycle_config.max_close_attempts {
                    let err = EngineError::Execution {
                        symbol: symbol.to_string(),
                        attempts,
                        cause: cause.clone(),
                    };
                    tracing::error!(%symbol, "{err}; manual intervention required");
                    self.publish_background(EngineEvent::Alert {
                        symbol: symbol.to_string(),
                        message: err.to_string(),
                    });
                }

                let delay = self.lifecycle_config.retry_delay(attempts);
                self.close_retry_at
                    .lock()
                    .await
                    .insert(symbol.to_string(), now + delay);
            }
        }
    }

    /// Signal generation → fusion → risk evaluation → entry submission
    async fn evaluate_entry(
        &self,
        symbol: &str,
        profile: &StrategyProfile,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let series = self
            .cache
            .get_series(symbol, self.config.interval, self.config.lookback)
            .await?;
        let Some(last_close) = series.last_close() else {
            return Ok(());
        };

        // Technical generation is local and fast; the sentiment call is the
        // symbol's one network suspension and carries its own timeout.
        let (report, sentiment) = tokio::join!(
            async { technical::generate(&self.technical_config, &series) },
            self.sentiment.get_sentiment(symbol, &[])
        );

        if sentiment.is_fallback {
            self.publish_background(EngineEvent::FallbackUsed {
                symbol: symbol.to_string(),
                cause: sentiment.rationale.clone(),
            });
        }

        let fused = fuse(
            &self.fusion_config,
            profile,
            symbol,
            &report,
            &sentiment,
            last_close,
        );
        if fused.action == Action::Hold {
            tracing::debug!(%symbol, confidence = fused.confidence, "holding");
            return Ok(());
        }

        let decision = {
            let risk = self.risk_state.lock().await;
            self.risk_manager.evaluate(&risk, &fused, now)
        };
        if !decision.approved {
            tracing::info!(%symbol, reason = ?decision.reason, "entry vetoed by risk manager");
            return Ok(());
        }

        self.submit_entry(symbol, profile, &fused, decision.size_multiplier, last_close, now)
            .await
    }

    async fn submit_entry(
        &self,
        symbol: &str,
        profile: &StrategyProfile,
        fused: &FusedSignal,
        size_multiplier: f64,
        last_close: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let (Some(stop_loss), Some(take_profit)) = (fused.stop_loss, fused.take_profit) else {
            return Ok(());
        };

        let capital = *self.capital.read().await;
        let multiplier = Decimal::from_f64(size_multiplier).unwrap_or(Decimal::ZERO);
        let allocation = capital * profile.risk_per_trade_pct * multiplier;
        if last_close <= Decimal::ZERO || allocation <= Decimal::ZERO {
            return Ok(());
        }
        let quantity = allocation / last_close;

        let side = match fused.action {
            Action::Buy => Side::Long,
            Action::Sell => Side::Short,
            Action::Hold => return Ok(()),
        };

        let order = OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::entry(side),
            quantity,
            order_type: OrderType::Market,
            price: last_close,
        };

        match self.submit_with_deadline(order).await {
            Ok(result) if result.status == OrderStatus::Filled => {
                let position = Position::open(
                    symbol,
                    side,
                    result.fill_price,
                    result.filled_quantity,
                    stop_loss,
                    take_profit,
                    now,
                    profile.max_hold,
                );
                if let Err(err) = self.book.write().await.open(position.clone()) {
                    tracing::error!(%symbol, error = %err, "entry raced an active position");
                    return Ok(());
                }

                tracing::info!(
                    %symbol,
                    ?side,
                    entry = %position.entry_price,
                    qty = %position.quantity,
                    stop = %stop_loss,
                    target = %take_profit,
                    confidence = fused.confidence,
                    "position opened"
                );
                metrics::counter!("tradeloop_entries_total").increment(1);
                self.publish_background(EngineEvent::PositionOpened {
                    symbol: symbol.to_string(),
                    entry_price: position.entry_price,
                    quantity: position.quantity,
                });
                self.save_snapshot_background().await;
                Ok(())
            }
            Ok(rejected) => {
                // Entries are not retried; the next cycle re-evaluates.
                tracing::warn!(%symbol, status = ?rejected.status, "entry order rejected");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%symbol, error = %err, "entry order failed");
                Ok(())
            }
        }
    }

    /// Currently open (non-CLOSED) positions
    pub async fn open_positions(&self) -> Vec<Position> {
        self.book.read().await.active_positions()
    }

    /// Current account risk state
    pub async fn risk_state(&self) -> RiskState {
        self.risk_state.lock().await.clone()
    }

    /// Allocatable capital
    pub async fn capital(&self) -> Decimal {
        *self.capital.read().await
    }

    /// Symbols still on the watch-list
    pub async fn watchlist(&self) -> Vec<String> {
        self.watchlist.read().await.clone()
    }

    /// Manual close override. The position still passes through CLOSING;
    /// the order goes out on its next monitoring cycle.
    pub async fn force_close(&self, symbol: &str) -> bool {
        let mut book = self.book.write().await;
        match book.begin_close(symbol, CloseReason::Manual) {
            Ok(_) => {
                tracing::info!(%symbol, "manual close requested");
                true
            }
            Err(_) => false,
        }
    }

    /// Order submission under an explicit deadline; a hung gateway call is
    /// cancelled and surfaces as a timeout failure.
    async fn submit_with_deadline(
        &self,
        order: OrderRequest,
    ) -> Result<crate::execution::OrderResult, ProviderError> {
        let budget = std::time::Duration::from_secs(self.lifecycle_config.order_timeout_secs);
        tokio::time::timeout(budget, self.gateway.submit_order(order))
            .await
            .unwrap_or(Err(ProviderError::Timeout { budget }))
    }

    /// Dispatch a snapshot save without blocking the cycle. Failures are
    /// logged and counted, never escalated into the decision loop.
    async fn save_snapshot_background(&self) {
        let snapshot = EngineSnapshot {
            positions: self.book.read().await.active_positions(),
            risk: self.risk_state.lock().await.clone(),
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.save(&snapshot).await {
                tracing::error!(error = %err, "background snapshot save failed");
                metrics::counter!("tradeloop_snapshot_failures_total").increment(1);
            }
        });
    }

    /// Fire-and-forget event publication on the shared runtime
    fn publish_background(&self, event: EngineEvent) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            sink.publish(event).await;
        });
    }
}
