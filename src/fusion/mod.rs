//! Signal fusion
//!
//! Deterministic merge of technical and sentiment signals into one trade
//! decision. A fallback sentiment never votes: its weight is forced to zero
//! and the technical weight renormalized, so a synthesized neutral is not
//! mistaken for a real neutral opinion.

use crate::sentiment::SentimentSignal;
use crate::strategy::StrategyProfile;
use crate::technical::{Direction, SignalKind, TechnicalReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fused trade action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// The decision produced by one fusion pass
#[derive(Debug, Clone)]
pub struct FusedSignal {
    pub symbol: String,
    pub action: Action,
    /// |combined score| clamped to [0, 1]
    pub confidence: f64,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Confidence-scaled sizing hint, further adjusted by the risk manager
    pub size_multiplier: f64,
}

impl FusedSignal {
    /// The empty-evidence decision: no action, zero confidence
    pub fn hold(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: Action::Hold,
            confidence: 0.0,
            stop_loss: None,
            take_profit: None,
            size_multiplier: 0.0,
        }
    }
}

/// Fusion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    /// Combined score at or above this is a BUY
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,
    /// Combined score at or below the negative of this is a SELL
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,
    #[serde(default = "default_weight_rsi")]
    pub weight_rsi: f64,
    #[serde(default = "default_weight_macd")]
    pub weight_macd: f64,
    #[serde(default = "default_weight_bollinger")]
    pub weight_bollinger: f64,
    #[serde(default = "default_weight_ma_cross")]
    pub weight_ma_cross: f64,
    #[serde(default = "default_weight_stochastic")]
    pub weight_stochastic: f64,
    #[serde(default = "default_weight_pattern")]
    pub weight_pattern: f64,
}

fn default_buy_threshold() -> f64 {
    0.3
}
fn default_sell_threshold() -> f64 {
    0.3
}
fn default_weight_rsi() -> f64 {
    1.0
}
fn default_weight_macd() -> f64 {
    1.0
}
fn default_weight_bollinger() -> f64 {
    0.8
}
fn default_weight_ma_cross() -> f64 {
    0.9
}
fn default_weight_stochastic() -> f64 {
    0.7
}
fn default_weight_pattern() -> f64 {
    0.8
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            weight_rsi: default_weight_rsi(),
            weight_macd: default_weight_macd(),
            weight_bollinger: default_weight_bollinger(),
            weight_ma_cross: default_weight_ma_cross(),
            weight_stochastic: default_weight_stochastic(),
            weight_pattern: default_weight_pattern(),
        }
    }
}

impl FusionConfig {
    fn kind_weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Rsi => self.weight_rsi,
            SignalKind::Macd => self.weight_macd,
            SignalKind::Bollinger => self.weight_bollinger,
            SignalKind::MaCross => self.weight_ma_cross,
            SignalKind::Stochastic => self.weight_stochastic,
            SignalKind::Pattern => self.weight_pattern,
        }
    }
}

/// Fuse one cycle's signals into a trade decision.
/// `last_close` anchors the stop/target levels.
pub fn fuse(
    config: &FusionConfig,
    profile: &StrategyProfile,
    symbol: &str,
    report: &TechnicalReport,
    sentiment: &SentimentSignal,
    last_close: Decimal,
) -> FusedSignal {
    let technical_score = aggregate_technical(config, report);

    // A fallback sentiment is a substitute, not an opinion: drop its weight
    // and renormalize technical to 1.
    let (tech_weight, sentiment_weight) = if sentiment.is_fallback {
        (1.0, 0.0)
    } else {
        normalize(profile.tech_weight, profile.sentiment_weight)
    };

    let combined = tech_weight * technical_score + sentiment_weight * sentiment.score;
    let confidence = combined.abs().clamp(0.0, 1.0);

    let action = if combined >= config.buy_threshold {
        Action::Buy
    } else if combined <= -config.sell_threshold {
        Action::Sell
    } else {
        Action::Hold
    };

    if action == Action::Hold {
        return FusedSignal {
            symbol: symbol.to_string(),
            action,
            confidence,
            stop_loss: None,
            take_profit: None,
            size_multiplier: 0.0,
        };
    }

    let (stop_loss, take_profit) = protective_levels(profile, report, action, last_close);

    FusedSignal {
        symbol: symbol.to_string(),
        action,
        confidence,
        stop_loss: Some(stop_loss),
        take_profit: Some(take_profit),
        // Half-size at zero confidence, full size at one.
        size_multiplier: 0.5 + 0.5 * confidence,
    }
}

/// Weighted average of `strength * confidence`, signed by direction.
/// Empty input aggregates to exactly zero.
fn aggregate_technical(config: &FusionConfig, report: &TechnicalReport) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for signal in &report.signals {
        let weight = config.kind_weight(signal.kind);
        let sign = match signal.direction {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        };
        weighted_sum += sign * signal.strength * signal.confidence * weight;
        weight_total += weight;
    }
    if weight_total == 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

fn normalize(a: f64, b: f64) -> (f64, f64) {
    let total = a + b;
    if total <= 0.0 {
        (1.0, 0.0)
    } else {
        (a / total, b / total)
    }
}

/// Tier-percentage stops, tightened toward pattern support/resistance when a
/// detected level sits between entry and the percentage level.
fn protective_levels(
    profile: &StrategyProfile,
    report: &TechnicalReport,
    action: Action,
    entry: Decimal,
) -> (Decimal, Decimal) {
    let (mut stop, mut target) = match action {
        Action::Buy => (
            entry * (Decimal::ONE - profile.stop_pct),
            entry * (Decimal::ONE + profile.target_pct),
        ),
        Action::Sell => (
            entry * (Decimal::ONE + profile.stop_pct),
            entry * (Decimal::ONE - profile.target_pct),
        ),
        Action::Hold => return (entry, entry),
    };

    for signal in &report.signals {
        let Some(level) = signal.level else { continue };
        match action {
            Action::Buy => {
                // Support below entry raises the stop; resistance above
                // entry caps the target.
                if level < entry && level > stop {
                    stop = level;
                } else if level > entry && level < target {
                    target = level;
                }
            }
            Action::Sell => {
                if level > entry && level < stop {
                    stop = level;
                } else if level < entry && level > target {
                    target = level;
                }
            }
            Action::Hold => {}
        }
    }

    (stop, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentSignal;
    use crate::strategy::{select_profile, StrategyConfig};
    use crate::technical::{TechnicalSignal, VolatilityRegime};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn profile() -> StrategyProfile {
        select_profile(dec!(500), &StrategyConfig::default())
    }

    fn swing_profile() -> StrategyProfile {
        select_profile(dec!(5000), &StrategyConfig::default())
    }

    fn tech_signal(
        kind: SignalKind,
        direction: Direction,
        strength: f64,
        confidence: f64,
        level: Option<Decimal>,
    ) -> TechnicalSignal {
        TechnicalSignal {
            symbol: "BTCUSDT".to_string(),
            kind,
            direction,
            strength,
            confidence,
            price: dec!(100),
            timestamp: Utc::now(),
            rationale: "test".to_string(),
            level,
        }
    }

    fn report(signals: Vec<TechnicalSignal>) -> TechnicalReport {
        TechnicalReport {
            signals,
            volatility: VolatilityRegime::Normal,
            stale_input: false,
        }
    }

    fn real_sentiment(score: f64, confidence: f64) -> SentimentSignal {
        SentimentSignal {
            symbol: "BTCUSDT".to_string(),
            score,
            confidence,
            rationale: "test".to_string(),
            is_fallback: false,
            generated_at: Utc::now(),
        }
    }

    fn fallback_sentiment() -> SentimentSignal {
        SentimentSignal::fallback("BTCUSDT", "timeout", 0.1)
    }

    #[test]
    fn test_empty_evidence_holds_with_zero_confidence() {
        let fused = fuse(
            &FusionConfig::default(),
            &profile(),
            "BTCUSDT",
            &report(vec![]),
            &fallback_sentiment(),
            dec!(100),
        );
        assert_eq!(fused.action, Action::Hold);
        assert_eq!(fused.confidence, 0.0);
        assert!(fused.stop_loss.is_none());
        assert!(fused.take_profit.is_none());
        assert_eq!(fused.size_multiplier, 0.0);
    }

    #[test]
    fn test_oversold_rsi_with_fallback_sentiment_buys() {
        // RSI 28 emits strength/confidence just above 0.6; with the
        // sentiment weight renormalized away the technical score alone
        // clears the buy threshold.
        let fused = fuse(
            &FusionConfig::default(),
            &profile(),
            "BTCUSDT",
            &report(vec![tech_signal(
                SignalKind::Rsi,
                Direction::Bullish,
                0.63,
                0.63,
                None,
            )]),
            &fallback_sentiment(),
            dec!(100),
        );
        assert_eq!(fused.action, Action::Buy);
        let stop = fused.stop_loss.unwrap();
        let target = fused.take_profit.unwrap();
        assert!(stop < dec!(100) && dec!(100) < target);
    }

    #[test]
    fn test_fallback_does_not_vote_bearish() {
        let signals = vec![tech_signal(
            SignalKind::Rsi,
            Direction::Bullish,
            0.7,
            0.7,
            None,
        )];

        // A real strongly-bearish sentiment under SWING weights drags the
        // combined score below the buy threshold...
        let dragged = fuse(
            &FusionConfig::default(),
            &swing_profile(),
            "BTCUSDT",
            &report(signals.clone()),
            &real_sentiment(-0.9, 0.9),
            dec!(100),
        );
        assert_ne!(dragged.action, Action::Buy);

        // ...but a fallback neutral must not.
        let renormalized = fuse(
            &FusionConfig::default(),
            &swing_profile(),
            "BTCUSDT",
            &report(signals),
            &fallback_sentiment(),
            dec!(100),
        );
        assert_eq!(renormalized.action, Action::Buy);
    }

    #[test]
    fn test_opposing_signals_cancel_to_hold() {
        let fused = fuse(
            &FusionConfig::default(),
            &profile(),
            "BTCUSDT",
            &report(vec![
                tech_signal(SignalKind::Rsi, Direction::Bullish, 0.8, 0.8, None),
                tech_signal(SignalKind::Macd, Direction::Bearish, 0.8, 0.8, None),
            ]),
            &fallback_sentiment(),
            dec!(100),
        );
        assert_eq!(fused.action, Action::Hold);
    }

    #[test]
    fn test_bearish_consensus_sells_with_levels_flipped() {
        let fused = fuse(
            &FusionConfig::default(),
            &profile(),
            "BTCUSDT",
            &report(vec![
                tech_signal(SignalKind::Rsi, Direction::Bearish, 0.9, 0.9, None),
                tech_signal(SignalKind::Stochastic, Direction::Bearish, 0.8, 0.8, None),
            ]),
            &real_sentiment(-0.6, 0.8),
            dec!(100),
        );
        assert_eq!(fused.action, Action::Sell);
        assert!(fused.stop_loss.unwrap() > dec!(100));
        assert!(fused.take_profit.unwrap() < dec!(100));
    }

    #[test]
    fn test_pattern_support_tightens_buy_stop() {
        let p = profile();
        let percentage_stop = dec!(100) * (Decimal::ONE - p.stop_pct);
        let fused = fuse(
            &FusionConfig::default(),
            &p,
            "BTCUSDT",
            &report(vec![
                tech_signal(SignalKind::Rsi, Direction::Bullish, 0.9, 0.9, None),
                tech_signal(
                    SignalKind::Pattern,
                    Direction::Bullish,
                    0.8,
                    0.6,
                    Some(dec!(99.8)),
                ),
            ]),
            &fallback_sentiment(),
            dec!(100),
        );
        assert_eq!(fused.action, Action::Buy);
        let stop = fused.stop_loss.unwrap();
        assert!(stop > percentage_stop);
        assert_eq!(stop, dec!(99.8));
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        let fused = fuse(
            &FusionConfig::default(),
            &swing_profile(),
            "BTCUSDT",
            &report(vec![
                tech_signal(SignalKind::Rsi, Direction::Bullish, 1.0, 1.0, None),
                tech_signal(SignalKind::Macd, Direction::Bullish, 1.0, 1.0, None),
                tech_signal(SignalKind::MaCross, Direction::Bullish, 1.0, 1.0, None),
            ]),
            &real_sentiment(1.0, 1.0),
            dec!(100),
        );
        assert_eq!(fused.action, Action::Buy);
        assert!(fused.confidence <= 1.0);
        assert!(fused.size_multiplier <= 1.0);
    }
}
