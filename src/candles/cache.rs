//! Historical series cache
//!
//! Fetches and incrementally maintains OHLCV series per (symbol, interval).
//! Cache misses trigger a paginated backfill through the market data
//! provider; stale hits trigger an incremental fetch for the uncovered
//! trailing window only. A series whose gap repair keeps failing is handed
//! to the signal generators marked stale rather than aborting the cycle.

use super::types::{CachedSeries, Candle, Interval};
use crate::error::{EngineError, ProviderError};
use crate::providers::MarketDataProvider;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Series cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum candles per provider request
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Fixed inter-request delay between pages (ms)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Refresh a cached series once it is older than this (secs)
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    /// Budget for one provider request (secs)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Transient-failure retries per fetch
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    /// Base backoff between retries (ms), doubled per attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Backoff after a rate-limit response (ms)
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
}

fn default_page_limit() -> usize {
    500
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_freshness_secs() -> u64 {
    60
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_fetch_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_rate_limit_backoff_ms() -> u64 {
    5_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            request_delay_ms: default_request_delay_ms(),
            freshness_secs: default_freshness_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_retries: default_fetch_retries(),
            backoff_ms: default_backoff_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
        }
    }
}

/// Repair failures in a row before a gap is reported
const REPAIR_FAILURE_LIMIT: u32 = 2;

struct SeriesSlot {
    series: CachedSeries,
    repair_failures: u32,
}

/// Caches candle series per (symbol, interval) with incremental refresh
pub struct SeriesCache {
    provider: Arc<dyn MarketDataProvider>,
    config: CacheConfig,
    series: RwLock<HashMap<(String, Interval), SeriesSlot>>,
}

impl SeriesCache {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: CacheConfig) -> Self {
        Self {
            provider,
            config,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Get the series for (symbol, interval) covering at least `lookback`
    /// candles, fetching or refreshing as needed. A series with an
    /// unrepairable trailing gap is returned with `stale = true`; the gap is
    /// reported, not fatal.
    pub async fn get_series(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: usize,
    ) -> Result<CachedSeries, EngineError> {
        self.get_series_at(symbol, interval, lookback, Utc::now())
            .await
    }

    /// `get_series` with an explicit clock, for deterministic tests
    pub async fn get_series_at(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: usize,
        now: DateTime<Utc>,
    ) -> Result<CachedSeries, EngineError> {
        let key = (symbol.to_string(), interval);
        let cached = {
            let map = self.series.read().await;
            map.get(&key).map(|slot| slot.series.clone())
        };

        let mut slot = match cached {
            Some(series) => {
                let repair_failures = {
                    let map = self.series.read().await;
                    map.get(&key).map(|s| s.repair_failures).unwrap_or(0)
                };
                SeriesSlot {
                    series,
                    repair_failures,
                }
            }
            None => {
                let series = self.backfill(symbol, interval, lookback, now).await?;
                SeriesSlot {
                    series,
                    repair_failures: 0,
                }
            }
        };

        let age = now - slot.series.last_refresh;
        let needs_refresh = age >= chrono::Duration::seconds(self.config.freshness_secs as i64)
            || slot.series.has_trailing_gap(now);

        if needs_refresh {
            self.refresh_tail(&mut slot, now).await;
        }

        let series = slot.series.clone();
        self.series.write().await.insert(key, slot);

        if series.stale {
            let gap = EngineError::DataGap {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
                failures: REPAIR_FAILURE_LIMIT,
            };
            tracing::warn!(%symbol, %interval, "serving stale series: {}", gap);
            metrics::counter!("tradeloop_data_gaps_total").increment(1);
        }

        Ok(series)
    }

    /// Full paginated backfill for a cache miss
    async fn backfill(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: usize,
        now: DateTime<Utc>,
    ) -> Result<CachedSeries, EngineError> {
        let start = now - interval.duration() * lookback as i32;
        let candles = self
            .fetch_range(symbol, interval, start, now)
            .await
            .map_err(EngineError::from)?;

        if candles.is_empty() {
            // Nothing at all for this symbol: bad symbol, drop it upstream.
            return Err(EngineError::Validation {
                symbol: symbol.to_string(),
                reason: "provider returned no candles for backfill".to_string(),
            });
        }

        tracing::debug!(%symbol, %interval, count = candles.len(), "backfilled series");
        Ok(CachedSeries::new(
            symbol.to_string(),
            interval,
            candles,
            now,
        ))
    }

    /// Incremental fetch for the uncovered trailing window. Failures mark
    /// the series stale; two failures in a row are reported as a data gap.
    async fn refresh_tail(&self, slot: &mut SeriesSlot, now: DateTime<Utc>) {
        let from = slot.series.coverage_end + slot.series.interval.duration();
        let symbol = slot.series.symbol.clone();
        let interval = slot.series.interval;

        match self.fetch_range(&symbol, interval, from, now).await {
            Ok(fresh) => {
                slot.series.append(fresh, now);
                if slot.series.has_trailing_gap(now) {
                    slot.repair_failures += 1;
                } else {
                    slot.repair_failures = 0;
                    slot.series.stale = false;
                }
            }
            Err(err) => {
                slot.repair_failures += 1;
                slot.series.last_refresh = now;
                tracing::warn!(%symbol, %interval, error = %err, "trailing refresh failed");
            }
        }

        if slot.repair_failures >= REPAIR_FAILURE_LIMIT {
            slot.series.stale = true;
        }
    }

    /// Paginated fetch of `[start, end)` with the configured inter-request
    /// delay between pages.
    async fn fetch_range(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ProviderError> {
        let step = interval.duration();
        let mut cursor = start;
        let mut out: Vec<Candle> = Vec::new();

        while cursor < end {
            let batch = self.fetch_with_retry(symbol, interval, cursor, end).await?;
            if batch.is_empty() {
                break;
            }
            let page_full = batch.len() >= self.config.page_limit;
            cursor = batch
                .last()
                .map(|c| c.open_time + step)
                .unwrap_or(end);
            out.extend(batch);
            if !page_full {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }

        Ok(out)
    }

    /// One provider call under an explicit deadline, with transient-failure
    /// retries and rate-limit backoff. A timed-out request is retried like a
    /// network failure.
    async fn fetch_with_retry(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ProviderError> {
        let budget = Duration::from_secs(self.config.request_timeout_secs);
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(
                budget,
                self.provider.fetch_candles(symbol, interval, start, end),
            )
            .await
            .unwrap_or(Err(ProviderError::Timeout { budget }));

            match outcome {
                Ok(candles) => return Ok(candles),
                Err(err)
                    if (err.is_transient() || matches!(err, ProviderError::Timeout { .. }))
                        && attempt < self.config.fetch_retries =>
                {
                    let backoff = match err {
                        ProviderError::RateLimited => {
                            Duration::from_millis(self.config.rate_limit_backoff_ms)
                        }
                        _ => Duration::from_millis(self.config.backoff_ms << attempt),
                    };
                    tracing::debug!(%symbol, attempt, error = %err, "retrying candle fetch");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
