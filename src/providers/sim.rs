//! Simulated collaborators for paper trading and tests
//!
//! Deterministic synthetic market data (no RNG: the walk is a sum of slow
//! sine components seeded by the symbol) and a canned sentiment payload.

use super::{MarketDataProvider, SentimentProvider};
use crate::candles::{Candle, Interval};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

/// Candles returned per request, mirroring a typical exchange page limit
const PAGE_LIMIT: usize = 500;

/// Deterministic synthetic candle source
pub struct SimulatedMarketData {
    base_price: f64,
}

impl SimulatedMarketData {
    pub fn new(base_price: f64) -> Self {
        Self { base_price }
    }

    fn price_at(&self, symbol_seed: f64, at: DateTime<Utc>) -> f64 {
        let t = at.timestamp() as f64;
        let drift = 0.02 * (t / 86_400.0 + symbol_seed).sin();
        let swing = 0.012 * (t / 3_600.0 + symbol_seed * 2.0).sin();
        let chop = 0.004 * (t / 420.0 + symbol_seed * 3.0).sin();
        self.base_price * (1.0 + drift + swing + chop)
    }
}

fn symbol_seed(symbol: &str) -> f64 {
    symbol.bytes().map(|b| b as u64).sum::<u64>() as f64 % 97.0
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

#[async_trait]
impl MarketDataProvider for SimulatedMarketData {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ProviderError> {
        let seed = symbol_seed(symbol);
        let step = interval.duration();
        let mut candles = Vec::new();
        let mut cursor = start;

        while cursor + step <= end && candles.len() < PAGE_LIMIT {
            let open = self.price_at(seed, cursor);
            let close = self.price_at(seed, cursor + step);
            let mid = (open + close) / 2.0;
            let spread = mid * 0.0015;
            let high = open.max(close) + spread;
            let low = open.min(close) - spread;
            let volume = 50.0 + 20.0 * ((cursor.timestamp() as f64 / 900.0 + seed).sin() + 1.0);

            candles.push(Candle {
                symbol: symbol.to_string(),
                interval,
                open_time: cursor,
                open: to_decimal(open),
                high: to_decimal(high),
                low: to_decimal(low),
                close: to_decimal(close),
                volume: to_decimal(volume),
            });
            cursor += step;
        }

        Ok(candles)
    }
}

/// Sentiment provider returning a fixed payload
pub struct StaticSentimentProvider {
    payload: serde_json::Value,
}

impl StaticSentimentProvider {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    /// Neutral, low-confidence payload for paper trading
    pub fn neutral() -> Self {
        Self::new(json!({
            "score": 0.0,
            "confidence": 0.3,
            "rationale": "no significant news flow"
        }))
    }
}

#[async_trait]
impl SentimentProvider for StaticSentimentProvider {
    async fn analyze(
        &self,
        _symbol: &str,
        _recent_news: &[String],
    ) -> Result<serde_json::Value, ProviderError> {
        Ok(self.payload.clone())
    }
}
