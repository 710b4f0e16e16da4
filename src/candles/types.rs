//! Candle series types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    /// Wall-clock duration of one candle
    pub fn duration(&self) -> Duration {
        match self {
            Interval::M1 => Duration::minutes(1),
            Interval::M5 => Duration::minutes(5),
            Interval::M15 => Duration::minutes(15),
            Interval::H1 => Duration::hours(1),
            Interval::H4 => Duration::hours(4),
            Interval::D1 => Duration::days(1),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            other => Err(format!("unknown interval: {}", other)),
        }
    }
}

/// A single OHLCV candle. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Trading symbol
    pub symbol: String,
    /// Candle interval
    pub interval: Interval,
    /// Open time of the candle window
    pub open_time: DateTime<Utc>,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Traded volume
    pub volume: Decimal,
}

/// A cached, ordered candle series for one (symbol, interval)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSeries {
    /// Trading symbol
    pub symbol: String,
    /// Candle interval
    pub interval: Interval,
    /// Candles ordered by strictly increasing open_time
    pub candles: Vec<Candle>,
    /// Start of the covered range
    pub coverage_start: DateTime<Utc>,
    /// End of the covered range
    pub coverage_end: DateTime<Utc>,
    /// When the series was last refreshed
    pub last_refresh: DateTime<Utc>,
    /// Set when gap repair has failed and the tail is known to be missing
    pub stale: bool,
}

impl CachedSeries {
    /// Build a series from freshly fetched candles, enforcing ordering
    /// invariants via an idempotent merge.
    pub fn new(
        symbol: String,
        interval: Interval,
        candles: Vec<Candle>,
        now: DateTime<Utc>,
    ) -> Self {
        let candles = merge_candles(vec![], candles);
        let coverage_start = candles.first().map(|c| c.open_time).unwrap_or(now);
        let coverage_end = candles.last().map(|c| c.open_time).unwrap_or(now);
        Self {
            symbol,
            interval,
            candles,
            coverage_start,
            coverage_end,
            last_refresh: now,
            stale: false,
        }
    }

    /// Merge newly fetched candles into the series and refresh coverage.
    pub fn append(&mut self, fresh: Vec<Candle>, now: DateTime<Utc>) {
        let existing = std::mem::take(&mut self.candles);
        self.candles = merge_candles(existing, fresh);
        if let Some(first) = self.candles.first() {
            self.coverage_start = first.open_time;
        }
        if let Some(last) = self.candles.last() {
            self.coverage_end = last.open_time;
        }
        self.last_refresh = now;
    }

    /// Close price of the most recent candle
    pub fn last_close(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }

    /// The last `n` candles (or fewer if the series is shorter)
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    /// Whether the most recent candle is older than one full interval
    /// beyond "now minus interval" — i.e. at least one candle is missing.
    pub fn has_trailing_gap(&self, now: DateTime<Utc>) -> bool {
        match self.candles.last() {
            Some(last) => last.open_time < now - self.interval.duration() * 2,
            None => true,
        }
    }

    /// Whether the covered range itself contains missing candles
    pub fn has_internal_gap(&self) -> bool {
        let step = self.interval.duration();
        self.candles
            .windows(2)
            .any(|w| w[1].open_time - w[0].open_time > step)
    }
}

/// Idempotent merge of two candle batches: sorted by open_time, duplicates
/// dropped (the freshest fetch wins on conflict).
pub fn merge_candles(existing: Vec<Candle>, fresh: Vec<Candle>) -> Vec<Candle> {
    let mut merged = existing;
    merged.extend(fresh);
    merged.sort_by_key(|c| c.open_time);
    // Keep the later element of each duplicate pair: reverse, dedup, reverse.
    merged.reverse();
    merged.dedup_by_key(|c| c.open_time);
    merged.reverse();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(minute: i64, close: Decimal) -> Candle {
        let open_time = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minute * 5);
        Candle {
            symbol: "BTCUSDT".to_string(),
            interval: Interval::M5,
            open_time,
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(10),
        }
    }

    #[test]
    fn test_interval_roundtrip() {
        for (s, i) in [
            ("1m", Interval::M1),
            ("5m", Interval::M5),
            ("15m", Interval::M15),
            ("1h", Interval::H1),
            ("4h", Interval::H4),
            ("1d", Interval::D1),
        ] {
            assert_eq!(s.parse::<Interval>().unwrap(), i);
            assert_eq!(i.to_string(), s);
        }
        assert!("7m".parse::<Interval>().is_err());
    }

    #[test]
    fn test_merge_sorts_and_dedups() {
        let merged = merge_candles(
            vec![candle(2, dec!(102)), candle(0, dec!(100))],
            vec![candle(1, dec!(101)), candle(2, dec!(102))],
        );
        assert_eq!(merged.len(), 3);
        assert!(merged.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn test_merge_prefers_fresh_on_conflict() {
        let merged = merge_candles(vec![candle(1, dec!(101))], vec![candle(1, dec!(999))]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].close, dec!(999));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![candle(0, dec!(100)), candle(1, dec!(101))];
        let once = merge_candles(vec![], batch.clone());
        let twice = merge_candles(once.clone(), batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trailing_gap_detection() {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let series = CachedSeries::new(
            "BTCUSDT".to_string(),
            Interval::M5,
            vec![candle(0, dec!(100))],
            base,
        );
        // One interval behind: the current candle is simply still forming.
        assert!(!series.has_trailing_gap(base + Duration::minutes(5)));
        // Two full intervals behind: a candle is missing.
        assert!(series.has_trailing_gap(base + Duration::minutes(11)));
    }

    #[test]
    fn test_internal_gap_detection() {
        let mut series = CachedSeries::new(
            "BTCUSDT".to_string(),
            Interval::M5,
            vec![candle(0, dec!(100)), candle(1, dec!(101))],
            Utc::now(),
        );
        assert!(!series.has_internal_gap());
        series.append(vec![candle(3, dec!(103))], Utc::now());
        assert!(series.has_internal_gap());
    }

    #[test]
    fn test_tail_shorter_than_requested() {
        let series = CachedSeries::new(
            "BTCUSDT".to_string(),
            Interval::M5,
            vec![candle(0, dec!(100)), candle(1, dec!(101))],
            Utc::now(),
        );
        assert_eq!(series.tail(10).len(), 2);
        assert_eq!(series.tail(1).len(), 1);
        assert_eq!(series.tail(1)[0].close, dec!(101));
    }
}
