//! Indicator math
//!
//! Plain `f64` computations over a candle tail. Flat windows that would
//! divide by zero (RSI, Stochastic) return the neutral 50 instead of NaN.

/// Simple moving average of a slice. Empty input returns 0.
pub fn sma(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Exponential moving average, seeded by the first observation
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// MACD histogram (line minus signal), Wilder-free EMA variant
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    pub histogram: f64,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            histogram: 0.0,
        }
    }

    /// Feed one close, return the updated histogram
    pub fn update(&mut self, close: f64) -> f64 {
        let macd_line = self.fast.update(close) - self.slow.update(close);
        let signal = self.signal.update(macd_line);
        self.histogram = macd_line - signal;
        self.histogram
    }
}

/// RSI with Wilder smoothing over a close slice.
/// Returns neutral 50 when the window is too short or shows no movement.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = changes[..period]
        .iter()
        .map(|c| c.max(0.0))
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .map(|c| (-c).max(0.0))
        .sum::<f64>()
        / period as f64;

    let w = period as f64;
    for change in &changes[period..] {
        avg_gain = (avg_gain * (w - 1.0) + change.max(0.0)) / w;
        avg_loss = (avg_loss * (w - 1.0) + (-change).max(0.0)) / w;
    }

    if avg_gain == 0.0 && avg_loss == 0.0 {
        // No movement in the window at all
        return 50.0;
    }
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Bollinger bands `(upper, mid, lower)` over the last `period` closes
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Option<(f64, f64, f64)> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mid = sma(window);
    let variance = window.iter().map(|c| (c - mid).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();
    Some((mid + k * std, mid, mid - k * std))
}

/// Stochastic oscillator `(%K, %D)`. A flat high/low range yields 50.
pub fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    d_period: usize,
) -> (f64, f64) {
    let len = closes.len();
    if k_period == 0 || d_period == 0 || len < k_period + d_period - 1 {
        return (50.0, 50.0);
    }

    let mut ks = Vec::with_capacity(d_period);
    for i in (len - d_period)..len {
        let window_start = i + 1 - k_period;
        let hh = highs[window_start..=i]
            .iter()
            .fold(f64::MIN, |a, &b| a.max(b));
        let ll = lows[window_start..=i].iter().fold(f64::MAX, |a, &b| a.min(b));
        let k = if hh == ll {
            50.0
        } else {
            (closes[i] - ll) / (hh - ll) * 100.0
        };
        ks.push(k);
    }

    let k = *ks.last().unwrap_or(&50.0);
    let d = sma(&ks);
    (k, d)
}

/// Average True Range with Wilder smoothing.
/// Returns 0 when the window is too short.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> f64 {
    let len = closes.len();
    if period == 0 || len < period + 1 {
        return 0.0;
    }

    let mut trs = Vec::with_capacity(len - 1);
    for i in 1..len {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        trs.push(tr);
    }

    let mut value = trs[..period].iter().sum::<f64>() / period as f64;
    let w = period as f64;
    for tr in &trs[period..] {
        value = (value * (w - 1.0) + tr) / w;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_empty_is_zero() {
        assert_eq!(sma(&[]), 0.0);
        assert_eq!(sma(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn test_ema_seeds_with_first_value() {
        let mut ema = Ema::new(9);
        assert_eq!(ema.update(100.0), 100.0);
        let next = ema.update(110.0);
        assert!(next > 100.0 && next < 110.0);
    }

    #[test]
    fn test_rsi_short_window_neutral() {
        assert_eq!(rsi(&[100.0, 101.0], 14), 50.0);
    }

    #[test]
    fn test_rsi_flat_window_neutral() {
        let closes = vec![100.0; 30];
        assert_eq!(rsi(&closes, 14), 50.0);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), 100.0);
    }

    #[test]
    fn test_rsi_downtrend_is_oversold() {
        // Steady decline with small bounces lands deep below 30.
        let mut closes = vec![100.0];
        for i in 1..40 {
            let prev = closes[i - 1];
            let step = if i % 5 == 0 { 0.2 } else { -1.0 };
            closes.push(prev + step);
        }
        let value = rsi(&closes, 14);
        assert!(value < 30.0, "rsi was {}", value);
    }

    #[test]
    fn test_bollinger_bands_ordering() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + (i % 5) as f64).collect();
        let (upper, mid, lower) = bollinger(&closes, 20, 2.0).unwrap();
        assert!(upper > mid && mid > lower);
    }

    #[test]
    fn test_bollinger_too_short() {
        assert!(bollinger(&[1.0, 2.0], 20, 2.0).is_none());
    }

    #[test]
    fn test_stochastic_flat_range_neutral() {
        let flat = vec![100.0; 20];
        let (k, d) = stochastic(&flat, &flat, &flat, 14, 3);
        assert_eq!(k, 50.0);
        assert_eq!(d, 50.0);
    }

    #[test]
    fn test_stochastic_close_at_high() {
        let highs: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 2.0).collect();
        let closes = highs.clone();
        let (k, _) = stochastic(&highs, &lows, &closes, 14, 3);
        assert!(k > 90.0);
    }

    #[test]
    fn test_atr_positive_for_moving_market() {
        let highs: Vec<f64> = (0..20).map(|i| 101.0 + i as f64).collect();
        let lows: Vec<f64> = (0..20).map(|i| 99.0 + i as f64).collect();
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let value = atr(&highs, &lows, &closes, 14);
        assert!(value >= 2.0);
    }

    #[test]
    fn test_macd_histogram_turns_positive_in_uptrend() {
        let mut macd = Macd::new(12, 26, 9);
        for i in 0..40 {
            macd.update(100.0 - i as f64 * 0.1);
        }
        assert!(macd.histogram < 0.0);
        let mut last = 0.0;
        for i in 0..40 {
            last = macd.update(96.0 + i as f64 * 0.5);
        }
        assert!(last > 0.0);
    }
}
