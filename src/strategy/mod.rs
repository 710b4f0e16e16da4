//! Strategy tier selection
//!
//! A pure function of allocatable capital: small accounts run the tight,
//! fast SCALP profile; larger accounts the wider, slower SWING profile.
//! Re-evaluated every cycle; positions keep the parameters they were
//! opened under.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Named parameter profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyTier {
    Scalp,
    Swing,
}

/// Resolved parameters for one cycle
#[derive(Debug, Clone)]
pub struct StrategyProfile {
    pub tier: StrategyTier,
    /// Fraction of capital allocated per trade
    pub risk_per_trade_pct: Decimal,
    /// Take-profit distance from entry
    pub target_pct: Decimal,
    /// Stop-loss distance from entry
    pub stop_pct: Decimal,
    /// Bound on holding time
    pub max_hold: Duration,
    /// Fusion weight on the technical score
    pub tech_weight: f64,
    /// Fusion weight on the sentiment score
    pub sentiment_weight: f64,
}

/// Per-tier tunables
#[derive(Debug, Clone, Deserialize)]
pub struct TierParams {
    pub risk_per_trade_pct: Decimal,
    pub target_pct: Decimal,
    pub stop_pct: Decimal,
    pub max_hold_secs: u64,
    pub tech_weight: f64,
    pub sentiment_weight: f64,
}

/// Strategy selector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Capital at or above this selects SWING
    #[serde(default = "default_capital_threshold")]
    pub capital_threshold: Decimal,
    #[serde(default = "default_scalp")]
    pub scalp: TierParams,
    #[serde(default = "default_swing")]
    pub swing: TierParams,
}

fn default_capital_threshold() -> Decimal {
    dec!(1000)
}

fn default_scalp() -> TierParams {
    TierParams {
        risk_per_trade_pct: dec!(0.05),
        target_pct: dec!(0.008),
        stop_pct: dec!(0.005),
        max_hold_secs: 45 * 60,
        tech_weight: 0.8,
        sentiment_weight: 0.2,
    }
}

fn default_swing() -> TierParams {
    TierParams {
        risk_per_trade_pct: dec!(0.03),
        target_pct: dec!(0.03),
        stop_pct: dec!(0.015),
        max_hold_secs: 24 * 3600,
        tech_weight: 0.45,
        sentiment_weight: 0.55,
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            capital_threshold: default_capital_threshold(),
            scalp: default_scalp(),
            swing: default_swing(),
        }
    }
}

/// Select the profile for the current cycle from allocatable capital
pub fn select_profile(capital: Decimal, config: &StrategyConfig) -> StrategyProfile {
    let (tier, params) = if capital < config.capital_threshold {
        (StrategyTier::Scalp, &config.scalp)
    } else {
        (StrategyTier::Swing, &config.swing)
    };

    StrategyProfile {
        tier,
        risk_per_trade_pct: params.risk_per_trade_pct,
        target_pct: params.target_pct,
        stop_pct: params.stop_pct,
        max_hold: Duration::seconds(params.max_hold_secs as i64),
        tech_weight: params.tech_weight,
        sentiment_weight: params.sentiment_weight,
    }
}
