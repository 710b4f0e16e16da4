//! Candlestick and breakout pattern detection
//!
//! Elementary two-candle and wick patterns plus N-bar breakouts. Breakout
//! hits carry the broken level so fusion can tighten stops toward it.

use crate::candles::Candle;
use rust_decimal::Decimal;

/// Direction of a detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    Bullish,
    Bearish,
}

/// A matched pattern on the series tail
#[derive(Debug, Clone)]
pub struct PatternHit {
    pub name: &'static str,
    pub direction: PatternDirection,
    pub strength: f64,
    /// Broken or defended price level (support/resistance), when the
    /// pattern defines one
    pub level: Option<Decimal>,
}

/// Scan the tail for pattern matches. `breakout_lookback` bounds the window
/// used for N-bar high/low breakouts.
pub fn detect(candles: &[Candle], breakout_lookback: usize) -> Vec<PatternHit> {
    let mut hits = Vec::new();

    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        let last = &candles[candles.len() - 1];

        if is_bullish_engulfing(prev, last) {
            hits.push(PatternHit {
                name: "bullish_engulfing",
                direction: PatternDirection::Bullish,
                strength: 0.7,
                level: Some(last.low),
            });
        }
        if is_bearish_engulfing(prev, last) {
            hits.push(PatternHit {
                name: "bearish_engulfing",
                direction: PatternDirection::Bearish,
                strength: 0.7,
                level: Some(last.high),
            });
        }
    }

    if let Some(last) = candles.last() {
        if is_hammer(last) {
            hits.push(PatternHit {
                name: "hammer",
                direction: PatternDirection::Bullish,
                strength: 0.6,
                level: Some(last.low),
            });
        }
        if is_shooting_star(last) {
            hits.push(PatternHit {
                name: "shooting_star",
                direction: PatternDirection::Bearish,
                strength: 0.6,
                level: Some(last.high),
            });
        }
    }

    if candles.len() > breakout_lookback {
        let last = &candles[candles.len() - 1];
        let window = &candles[candles.len() - 1 - breakout_lookback..candles.len() - 1];
        let prior_high = window.iter().map(|c| c.high).max();
        let prior_low = window.iter().map(|c| c.low).min();

        if let Some(high) = prior_high {
            if last.close > high {
                // Broken resistance becomes support.
                hits.push(PatternHit {
                    name: "breakout_high",
                    direction: PatternDirection::Bullish,
                    strength: 0.8,
                    level: Some(high),
                });
            }
        }
        if let Some(low) = prior_low {
            if last.close < low {
                // Broken support becomes resistance.
                hits.push(PatternHit {
                    name: "breakdown_low",
                    direction: PatternDirection::Bearish,
                    strength: 0.8,
                    level: Some(low),
                });
            }
        }
    }

    hits
}

fn body(c: &Candle) -> Decimal {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> Decimal {
    c.high - c.low
}

fn is_bullish_engulfing(prev: &Candle, last: &Candle) -> bool {
    prev.close < prev.open
        && last.close > last.open
        && last.open <= prev.close
        && last.close >= prev.open
}

fn is_bearish_engulfing(prev: &Candle, last: &Candle) -> bool {
    prev.close > prev.open
        && last.close < last.open
        && last.open >= prev.close
        && last.close <= prev.open
}

fn is_hammer(c: &Candle) -> bool {
    let range = range(c);
    if range.is_zero() {
        return false;
    }
    let body = body(c);
    let lower_wick = c.open.min(c.close) - c.low;
    let upper_wick = c.high - c.open.max(c.close);
    body * Decimal::from(3) <= range && lower_wick >= body * Decimal::from(2) && upper_wick <= body
}

fn is_shooting_star(c: &Candle) -> bool {
    let range = range(c);
    if range.is_zero() {
        return false;
    }
    let body = body(c);
    let lower_wick = c.open.min(c.close) - c.low;
    let upper_wick = c.high - c.open.max(c.close);
    body * Decimal::from(3) <= range && upper_wick >= body * Decimal::from(2) && lower_wick <= body
}
