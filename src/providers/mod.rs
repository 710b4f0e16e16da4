//! Collaborator contracts
//!
//! The engine consumes market data, sentiment, durable state, and
//! notifications through these traits. Real HTTP/LLM implementations live
//! outside the core; the crate ships simulated and in-memory reference
//! implementations for paper trading and tests.

mod sim;
mod store;

pub use sim::{SimulatedMarketData, StaticSentimentProvider};
pub use store::{JsonFileStore, MemoryStateStore};

use crate::candles::{Candle, Interval};
use crate::error::ProviderError;
use crate::lifecycle::{CloseReason, Position};
use crate::risk::RiskState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source of historical OHLCV candles. Paging and rate limiting are the
/// caller's responsibility (the series cache drives both).
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch candles in `[start, end)`, oldest first, bounded by the
    /// provider's page limit.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ProviderError>;
}

/// Sentiment/news provider. Returns a raw structured payload; the sentiment
/// engine parses it defensively and owns the timeout.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn analyze(
        &self,
        symbol: &str,
        recent_news: &[String],
    ) -> Result<serde_json::Value, ProviderError>;
}

/// Durable position/risk-state persistence
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()>;
    async fn load(&self) -> anyhow::Result<Option<EngineSnapshot>>;
}

/// Fire-and-forget event publication
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: EngineEvent);
}

/// Durable engine state: open positions plus account risk state.
/// Persisting and reloading a snapshot yields identical state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub positions: Vec<Position>,
    pub risk: RiskState,
}

/// Events published at the decision-loop boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    PositionOpened {
        symbol: String,
        entry_price: Decimal,
        quantity: Decimal,
    },
    PositionClosed {
        symbol: String,
        exit_price: Decimal,
        realized_pnl: Decimal,
        reason: CloseReason,
    },
    /// A suppressed failure was replaced by a fallback value
    FallbackUsed {
        symbol: String,
        cause: String,
    },
    /// A symbol failed validation and left the watch-list
    SymbolDropped {
        symbol: String,
        reason: String,
    },
    /// Process-level alert requiring manual intervention
    Alert {
        symbol: String,
        message: String,
    },
}

/// Notification sink that logs events through `tracing`
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn publish(&self, event: EngineEvent) {
        match &event {
            EngineEvent::Alert { symbol, message } => {
                tracing::error!(%symbol, %message, "engine alert");
            }
            other => {
                tracing::info!(event = ?other, "engine event");
            }
        }
    }
}
