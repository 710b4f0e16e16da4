//! Technical signal generation
//!
//! Pure function over a cached series tail. Each indicator independently
//! emits zero or one signal; cross-indicator weighing is fusion's job.
//! A stale input series scales every confidence down rather than aborting.

use super::indicators::{atr, bollinger, rsi, stochastic, Ema, Macd};
use super::patterns::{self, PatternDirection};
use crate::candles::CachedSeries;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Indicator family that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Rsi,
    Macd,
    Bollinger,
    MaCross,
    Stochastic,
    Pattern,
}

/// Bullish/bearish tag for a technical signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

/// Volatility classification from ATR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

/// One technical signal, consumed by fusion within the same cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSignal {
    pub symbol: String,
    pub kind: SignalKind,
    pub direction: Direction,
    /// How far past its trigger the indicator sits, in [0, 1]
    pub strength: f64,
    /// Confidence in the reading, monotone with indicator extremity
    pub confidence: f64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub rationale: String,
    /// Support/resistance level for pattern signals
    pub level: Option<Decimal>,
}

/// Everything the generator knows after one pass over the tail
#[derive(Debug, Clone)]
pub struct TechnicalReport {
    pub signals: Vec<TechnicalSignal>,
    pub volatility: VolatilityRegime,
    /// Input series had an unrepaired gap; confidences already reduced
    pub stale_input: bool,
}

impl TechnicalReport {
    pub fn empty() -> Self {
        Self {
            signals: vec![],
            volatility: VolatilityRegime::Normal,
            stale_input: false,
        }
    }
}

/// Technical generator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TechnicalConfig {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bollinger_period")]
    pub bollinger_period: usize,
    #[serde(default = "default_bollinger_k")]
    pub bollinger_k: f64,
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_stoch_k")]
    pub stoch_k: usize,
    #[serde(default = "default_stoch_d")]
    pub stoch_d: usize,
    #[serde(default = "default_stoch_low")]
    pub stoch_low: f64,
    #[serde(default = "default_stoch_high")]
    pub stoch_high: f64,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_atr_low_ratio")]
    pub atr_low_ratio: f64,
    #[serde(default = "default_atr_high_ratio")]
    pub atr_high_ratio: f64,
    #[serde(default = "default_breakout_lookback")]
    pub breakout_lookback: usize,
    /// Confidence multiplier applied when the input series is stale
    #[serde(default = "default_stale_confidence_factor")]
    pub stale_confidence_factor: f64,
}

fn default_lookback() -> usize {
    120
}
fn default_min_candles() -> usize {
    30
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_oversold() -> f64 {
    30.0
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}
fn default_bollinger_period() -> usize {
    20
}
fn default_bollinger_k() -> f64 {
    2.0
}
fn default_ema_fast() -> usize {
    9
}
fn default_ema_slow() -> usize {
    21
}
fn default_stoch_k() -> usize {
    14
}
fn default_stoch_d() -> usize {
    3
}
fn default_stoch_low() -> f64 {
    20.0
}
fn default_stoch_high() -> f64 {
    80.0
}
fn default_atr_period() -> usize {
    14
}
fn default_atr_low_ratio() -> f64 {
    0.002
}
fn default_atr_high_ratio() -> f64 {
    0.008
}
fn default_breakout_lookback() -> usize {
    20
}
fn default_stale_confidence_factor() -> f64 {
    0.5
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            min_candles: default_min_candles(),
            rsi_period: default_rsi_period(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bollinger_period: default_bollinger_period(),
            bollinger_k: default_bollinger_k(),
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            stoch_k: default_stoch_k(),
            stoch_d: default_stoch_d(),
            stoch_low: default_stoch_low(),
            stoch_high: default_stoch_high(),
            atr_period: default_atr_period(),
            atr_low_ratio: default_atr_low_ratio(),
            atr_high_ratio: default_atr_high_ratio(),
            breakout_lookback: default_breakout_lookback(),
            stale_confidence_factor: default_stale_confidence_factor(),
        }
    }
}

/// Generate technical signals over the series tail
pub fn generate(config: &TechnicalConfig, series: &CachedSeries) -> TechnicalReport {
    let tail = series.tail(config.lookback);
    if tail.len() < config.min_candles {
        tracing::debug!(
            symbol = %series.symbol,
            candles = tail.len(),
            "series too short for technical analysis"
        );
        return TechnicalReport::empty();
    }

    let closes: Vec<f64> = tail.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
    let highs: Vec<f64> = tail.iter().map(|c| c.high.to_f64().unwrap_or(0.0)).collect();
    let lows: Vec<f64> = tail.iter().map(|c| c.low.to_f64().unwrap_or(0.0)).collect();

    let (Some(last), Some(&close_f)) = (tail.last(), closes.last()) else {
        return TechnicalReport::empty();
    };
    let price = last.close;
    let timestamp = last.open_time;
    let conf_factor = if series.stale {
        config.stale_confidence_factor
    } else {
        1.0
    };

    let mut signals = Vec::new();
    let mut push = |kind: SignalKind,
                    direction: Direction,
                    strength: f64,
                    confidence: f64,
                    rationale: String,
                    level: Option<Decimal>| {
        signals.push(TechnicalSignal {
            symbol: series.symbol.clone(),
            kind,
            direction,
            strength: strength.clamp(0.0, 1.0),
            confidence: (confidence * conf_factor).clamp(0.0, 1.0),
            price,
            timestamp,
            rationale,
            level,
        });
    };

    // RSI: crossing the band is already a strong reading, full extremity = 1.0
    let rsi_value = rsi(&closes, config.rsi_period);
    if rsi_value <= config.rsi_oversold {
        let depth = (config.rsi_oversold - rsi_value) / config.rsi_oversold;
        push(
            SignalKind::Rsi,
            Direction::Bullish,
            0.6 + 0.4 * depth,
            0.6 + 0.4 * depth,
            format!("RSI {:.1} at or below oversold {}", rsi_value, config.rsi_oversold),
            None,
        );
    } else if rsi_value >= config.rsi_overbought {
        let depth = (rsi_value - config.rsi_overbought) / (100.0 - config.rsi_overbought);
        push(
            SignalKind::Rsi,
            Direction::Bearish,
            0.6 + 0.4 * depth,
            0.6 + 0.4 * depth,
            format!("RSI {:.1} at or above overbought {}", rsi_value, config.rsi_overbought),
            None,
        );
    }

    // MACD histogram zero-cross on the latest candle
    if closes.len() > config.macd_slow {
        let mut macd = Macd::new(config.macd_fast, config.macd_slow, config.macd_signal);
        let mut prev_hist = 0.0;
        for close in &closes[..closes.len() - 1] {
            prev_hist = macd.update(*close);
        }
        let hist = macd.update(close_f);
        let norm = (hist.abs() / close_f.max(f64::EPSILON) * 400.0).clamp(0.3, 1.0);
        if prev_hist <= 0.0 && hist > 0.0 {
            push(
                SignalKind::Macd,
                Direction::Bullish,
                norm,
                0.5 + 0.4 * norm,
                format!("MACD histogram crossed above zero ({:.4})", hist),
                None,
            );
        } else if prev_hist >= 0.0 && hist < 0.0 {
            push(
                SignalKind::Macd,
                Direction::Bearish,
                norm,
                0.5 + 0.4 * norm,
                format!("MACD histogram crossed below zero ({:.4})", hist),
                None,
            );
        }
    }

    // Bollinger band touches, mean-reversion reading
    if let Some((upper, mid, lower)) = bollinger(&closes, config.bollinger_period, config.bollinger_k)
    {
        let half_band = (mid - lower).max(f64::EPSILON);
        if close_f < lower {
            let depth = ((lower - close_f) / half_band).clamp(0.0, 1.0);
            push(
                SignalKind::Bollinger,
                Direction::Bullish,
                0.5 + 0.5 * depth,
                0.5 + 0.4 * depth,
                format!("close {:.2} under lower band {:.2}", close_f, lower),
                None,
            );
        } else if close_f > upper {
            let depth = ((close_f - upper) / half_band).clamp(0.0, 1.0);
            push(
                SignalKind::Bollinger,
                Direction::Bearish,
                0.5 + 0.5 * depth,
                0.5 + 0.4 * depth,
                format!("close {:.2} over upper band {:.2}", close_f, upper),
                None,
            );
        }
    }

    // EMA fast/slow cross on the latest candle
    if closes.len() > config.ema_slow {
        let mut fast = Ema::new(config.ema_fast);
        let mut slow = Ema::new(config.ema_slow);
        let mut prev_fast = 0.0;
        let mut prev_slow = 0.0;
        for close in &closes[..closes.len() - 1] {
            prev_fast = fast.update(*close);
            prev_slow = slow.update(*close);
        }
        let cur_fast = fast.update(close_f);
        let cur_slow = slow.update(close_f);
        let separation = ((cur_fast - cur_slow).abs() / cur_slow.max(f64::EPSILON) * 100.0)
            .clamp(0.0, 1.0);
        if prev_fast <= prev_slow && cur_fast > cur_slow {
            push(
                SignalKind::MaCross,
                Direction::Bullish,
                0.7,
                0.5 + 0.4 * separation,
                format!("EMA{} crossed above EMA{}", config.ema_fast, config.ema_slow),
                None,
            );
        } else if prev_fast >= prev_slow && cur_fast < cur_slow {
            push(
                SignalKind::MaCross,
                Direction::Bearish,
                0.7,
                0.5 + 0.4 * separation,
                format!("EMA{} crossed below EMA{}", config.ema_fast, config.ema_slow),
                None,
            );
        }
    }

    // Stochastic, both lines in the extreme band
    let (stoch_k, stoch_d) = stochastic(&highs, &lows, &closes, config.stoch_k, config.stoch_d);
    if stoch_k <= config.stoch_low && stoch_d <= config.stoch_low {
        let depth = (config.stoch_low - stoch_k) / config.stoch_low;
        push(
            SignalKind::Stochastic,
            Direction::Bullish,
            0.55 + 0.45 * depth,
            0.5 + 0.4 * depth,
            format!("stochastic K {:.1} / D {:.1} oversold", stoch_k, stoch_d),
            None,
        );
    } else if stoch_k >= config.stoch_high && stoch_d >= config.stoch_high {
        let depth = (stoch_k - config.stoch_high) / (100.0 - config.stoch_high);
        push(
            SignalKind::Stochastic,
            Direction::Bearish,
            0.55 + 0.45 * depth,
            0.5 + 0.4 * depth,
            format!("stochastic K {:.1} / D {:.1} overbought", stoch_k, stoch_d),
            None,
        );
    }

    // Candlestick and breakout patterns
    for hit in patterns::detect(tail, config.breakout_lookback) {
        let direction = match hit.direction {
            PatternDirection::Bullish => Direction::Bullish,
            PatternDirection::Bearish => Direction::Bearish,
        };
        push(
            SignalKind::Pattern,
            direction,
            hit.strength,
            0.55,
            format!("pattern: {}", hit.name),
            hit.level,
        );
    }

    // ATR volatility classification
    let atr_value = atr(&highs, &lows, &closes, config.atr_period);
    let atr_ratio = atr_value / close_f.max(f64::EPSILON);
    let volatility = if atr_ratio < config.atr_low_ratio {
        VolatilityRegime::Low
    } else if atr_ratio > config.atr_high_ratio {
        VolatilityRegime::High
    } else {
        VolatilityRegime::Normal
    };

    TechnicalReport {
        signals,
        volatility,
        stale_input: series.stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candles::{Candle, Interval};
    use chrono::Duration;
    use rust_decimal::prelude::FromPrimitive;

    fn series_from_closes(closes: &[f64], stale: bool) -> CachedSeries {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let c = Decimal::from_f64(close).unwrap();
                Candle {
                    symbol: "BTCUSDT".to_string(),
                    interval: Interval::M5,
                    open_time: base + Duration::minutes(i as i64 * 5),
                    open: c,
                    high: c + Decimal::ONE,
                    low: c - Decimal::ONE,
                    close: c,
                    volume: Decimal::from(10),
                }
            })
            .collect();
        let mut series = CachedSeries::new("BTCUSDT".to_string(), Interval::M5, candles, base);
        series.stale = stale;
        series
    }

    fn downtrend() -> Vec<f64> {
        let mut closes = vec![1000.0];
        for i in 1..60 {
            let prev = closes[i - 1];
            let step = if i % 6 == 0 { 0.5 } else { -2.0 };
            closes.push(prev + step);
        }
        closes
    }

    #[test]
    fn test_short_series_yields_empty_report() {
        let series = series_from_closes(&[100.0; 10], false);
        let report = generate(&TechnicalConfig::default(), &series);
        assert!(report.signals.is_empty());
    }

    #[test]
    fn test_flat_series_yields_no_directional_signals() {
        let series = series_from_closes(&[100.0; 60], false);
        let report = generate(&TechnicalConfig::default(), &series);
        // RSI/stochastic come back neutral; nothing should fire.
        assert!(report.signals.is_empty());
    }

    #[test]
    fn test_downtrend_emits_oversold_rsi() {
        let series = series_from_closes(&downtrend(), false);
        let report = generate(&TechnicalConfig::default(), &series);
        let rsi_signal = report
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Rsi)
            .expect("oversold RSI signal");
        assert_eq!(rsi_signal.direction, Direction::Bullish);
        assert!(rsi_signal.strength > 0.6);
    }

    #[test]
    fn test_stale_series_reduces_confidence() {
        let fresh = generate(
            &TechnicalConfig::default(),
            &series_from_closes(&downtrend(), false),
        );
        let stale = generate(
            &TechnicalConfig::default(),
            &series_from_closes(&downtrend(), true),
        );
        let fresh_rsi = fresh
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Rsi)
            .unwrap();
        let stale_rsi = stale
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Rsi)
            .unwrap();
        assert!(stale.stale_input);
        assert!(stale_rsi.confidence < fresh_rsi.confidence);
        assert_eq!(stale_rsi.strength, fresh_rsi.strength);
    }

    #[test]
    fn test_volatility_classification() {
        // 2-point true range on a ~1000 price is well below 0.2%: quiet. The
        // downtrend's ATR relative to its ~900 close sits in the same regime,
        // so force a wide-range series for the high reading.
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let c = Decimal::from(1000 + (i % 2) * 30);
                Candle {
                    symbol: "BTCUSDT".to_string(),
                    interval: Interval::M5,
                    open_time: base + Duration::minutes(i * 5),
                    open: c,
                    high: c + Decimal::from(25),
                    low: c - Decimal::from(25),
                    close: c,
                    volume: Decimal::from(10),
                }
            })
            .collect();
        let wild = CachedSeries::new("BTCUSDT".to_string(), Interval::M5, candles, base);
        let report = generate(&TechnicalConfig::default(), &wild);
        assert_eq!(report.volatility, VolatilityRegime::High);

        let quiet = series_from_closes(&[2000.0; 60], false);
        let report = generate(&TechnicalConfig::default(), &quiet);
        assert_eq!(report.volatility, VolatilityRegime::Low);
    }
}
