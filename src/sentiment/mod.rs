//! Sentiment signal generation
//!
//! Queries the sentiment provider with one explicit timeout per call and
//! never lets a provider failure escape: timeouts, refusals, and malformed
//! payloads all collapse into a neutral fallback signal. A short-lived
//! per-symbol cache suppresses redundant provider calls within a cycle
//! window.

use crate::providers::SentimentProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A fallback signal never claims more confidence than this
pub const FALLBACK_CONFIDENCE_CEILING: f64 = 0.2;

/// Sentiment reading for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub symbol: String,
    /// Bearish -1.0 to bullish +1.0
    pub score: f64,
    pub confidence: f64,
    pub rationale: String,
    /// Synthesized neutral substitute for a failed provider call
    pub is_fallback: bool,
    pub generated_at: DateTime<Utc>,
}

impl SentimentSignal {
    /// Neutral substitute used when the provider times out, refuses, or
    /// returns an unusable payload.
    pub fn fallback(symbol: &str, cause: &str, confidence: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            score: 0.0,
            confidence: confidence.min(FALLBACK_CONFIDENCE_CEILING).max(0.0),
            rationale: format!("fallback: {}", cause),
            is_fallback: true,
            generated_at: Utc::now(),
        }
    }
}

/// Sentiment engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentimentConfig {
    /// Budget for one provider call (secs)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Same-symbol results are reused within this window (secs)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Confidence assigned to fallback signals
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
}

fn default_timeout_secs() -> u64 {
    8
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_fallback_confidence() -> f64 {
    0.1
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

/// Expected provider payload shape. Anything missing defaults to neutral;
/// unknown fields are ignored. This is a data-integrity boundary, not a
/// fatal-error path.
#[derive(Debug, Default, Deserialize)]
struct RawSentiment {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "summary", alias = "reasoning")]
    rationale: Option<String>,
}

/// Wraps the sentiment provider with timeout, fallback, and caching
pub struct SentimentEngine {
    provider: Arc<dyn SentimentProvider>,
    config: SentimentConfig,
    cache: Mutex<HashMap<String, (Instant, SentimentSignal)>>,
}

impl SentimentEngine {
    pub fn new(provider: Arc<dyn SentimentProvider>, config: SentimentConfig) -> Self {
        Self {
            provider,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get a sentiment signal for `symbol`. Infallible by contract: any
    /// provider failure produces a fallback signal instead.
    pub async fn get_sentiment(&self, symbol: &str, recent_news: &[String]) -> SentimentSignal {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        {
            let cache = self.cache.lock().await;
            if let Some((at, signal)) = cache.get(symbol) {
                if at.elapsed() < ttl {
                    return signal.clone();
                }
            }
        }

        let budget = Duration::from_secs(self.config.timeout_secs);
        let signal = match tokio::time::timeout(budget, self.provider.analyze(symbol, recent_news))
            .await
        {
            Err(_) => {
                self.note_fallback(symbol, &format!("provider timed out after {:?}", budget))
            }
            Ok(Err(err)) => self.note_fallback(symbol, &format!("provider error: {}", err)),
            Ok(Ok(payload)) => self.parse_payload(symbol, payload),
        };

        self.cache
            .lock()
            .await
            .insert(symbol.to_string(), (Instant::now(), signal.clone()));
        signal
    }

    fn note_fallback(&self, symbol: &str, cause: &str) -> SentimentSignal {
        tracing::warn!(%symbol, %cause, "sentiment fallback: neutral score 0.0 substituted");
        metrics::counter!("tradeloop_sentiment_fallbacks_total").increment(1);
        SentimentSignal::fallback(symbol, cause, self.config.fallback_confidence)
    }

    /// Defensive parse: unknown shape or missing fields degrade to neutral
    /// rather than failing the cycle.
    fn parse_payload(&self, symbol: &str, payload: serde_json::Value) -> SentimentSignal {
        let raw: RawSentiment = match serde_json::from_value(payload) {
            Ok(raw) => raw,
            Err(err) => {
                return self.note_fallback(symbol, &format!("malformed payload: {}", err));
            }
        };

        let score = raw.score.filter(|s| s.is_finite()).unwrap_or(0.0);
        let confidence = raw.confidence.filter(|c| c.is_finite()).unwrap_or(0.0);

        SentimentSignal {
            symbol: symbol.to_string(),
            score: score.clamp(-1.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: raw
                .rationale
                .unwrap_or_else(|| "no rationale provided".to_string()),
            is_fallback: false,
            generated_at: Utc::now(),
        }
    }
}
