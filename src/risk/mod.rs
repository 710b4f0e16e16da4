//! Adaptive risk management
//!
//! Tracks losing streaks and daily trade counts per account. Evaluation is
//! strictly read-only; the state mutates exactly once per trade, when a
//! position transitions to CLOSED and its realized P/L is known.

use crate::fusion::FusedSignal;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Risk manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Hard ceiling on trades per UTC day
    #[serde(default = "default_daily_trade_ceiling")]
    pub daily_trade_ceiling: u32,
    /// Losing streak length that pauses new entries
    #[serde(default = "default_pause_threshold")]
    pub pause_threshold: u32,
    /// Pause duration after the streak threshold is hit (secs)
    #[serde(default = "default_cooling_secs")]
    pub cooling_secs: u64,
    /// Losses beyond this streak length start shrinking the multiplier
    #[serde(default = "default_soft_loss_threshold")]
    pub soft_loss_threshold: u32,
    /// Multiplier shrink factor per qualifying loss
    #[serde(default = "default_loss_decay_factor")]
    pub loss_decay_factor: f64,
    /// Multiplier never shrinks below this
    #[serde(default = "default_min_risk_multiplier")]
    pub min_risk_multiplier: f64,
    /// Multiplier recovery per winning trade
    #[serde(default = "default_win_recovery_step")]
    pub win_recovery_step: f64,
}

fn default_daily_trade_ceiling() -> u32 {
    10
}
fn default_pause_threshold() -> u32 {
    3
}
fn default_cooling_secs() -> u64 {
    3600
}
fn default_soft_loss_threshold() -> u32 {
    1
}
fn default_loss_decay_factor() -> f64 {
    0.5
}
fn default_min_risk_multiplier() -> f64 {
    0.2
}
fn default_win_recovery_step() -> f64 {
    0.25
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_trade_ceiling: default_daily_trade_ceiling(),
            pause_threshold: default_pause_threshold(),
            cooling_secs: default_cooling_secs(),
            soft_loss_threshold: default_soft_loss_threshold(),
            loss_decay_factor: default_loss_decay_factor(),
            min_risk_multiplier: default_min_risk_multiplier(),
            win_recovery_step: default_win_recovery_step(),
        }
    }
}

/// Per-account risk state. Owned by the risk manager; serialized into the
/// engine snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub account_id: String,
    pub consecutive_losses: u32,
    /// Position-size scalar in (0, 1]
    pub risk_multiplier: f64,
    /// Trades settled within the current UTC day
    pub daily_trade_count: u32,
    /// Start of the current daily window
    pub window_start: DateTime<Utc>,
    pub last_loss_at: Option<DateTime<Utc>>,
}

impl RiskState {
    pub fn new(account_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            account_id: account_id.to_string(),
            consecutive_losses: 0,
            risk_multiplier: 1.0,
            daily_trade_count: 0,
            window_start: now,
            last_loss_at: None,
        }
    }
}

/// Why an entry was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DailyCeiling,
    LossPause,
}

/// Outcome of a risk evaluation
#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub approved: bool,
    pub size_multiplier: f64,
    pub reason: Option<RejectReason>,
}

impl RiskDecision {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            approved: false,
            size_multiplier: 0.0,
            reason: Some(reason),
        }
    }
}

/// Evaluates entries and settles closed trades against one account's state
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Read-only entry evaluation. The daily window is interpreted against
    /// `now` without touching the state; resets are applied on settle.
    pub fn evaluate(
        &self,
        state: &RiskState,
        fused: &FusedSignal,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        let effective_count = if same_utc_day(state.window_start, now) {
            state.daily_trade_count
        } else {
            0
        };
        if effective_count >= self.config.daily_trade_ceiling {
            return RiskDecision::rejected(RejectReason::DailyCeiling);
        }

        if state.consecutive_losses >= self.config.pause_threshold {
            let cooled = state
                .last_loss_at
                .map(|at| now - at >= chrono::Duration::seconds(self.config.cooling_secs as i64))
                .unwrap_or(true);
            if !cooled {
                return RiskDecision::rejected(RejectReason::LossPause);
            }
        }

        RiskDecision {
            approved: true,
            size_multiplier: fused.size_multiplier * state.risk_multiplier,
            reason: None,
        }
    }

    /// The single mutation point: apply a closed trade's realized P/L.
    pub fn settle(&self, state: &mut RiskState, realized_pnl: Decimal, now: DateTime<Utc>) {
        if !same_utc_day(state.window_start, now) {
            state.window_start = now;
            state.daily_trade_count = 0;
        }
        state.daily_trade_count += 1;

        if realized_pnl < Decimal::ZERO {
            state.consecutive_losses += 1;
            state.last_loss_at = Some(now);
            if state.consecutive_losses > self.config.soft_loss_threshold {
                state.risk_multiplier = (state.risk_multiplier * self.config.loss_decay_factor)
                    .max(self.config.min_risk_multiplier);
            }
            tracing::info!(
                account = %state.account_id,
                streak = state.consecutive_losses,
                multiplier = state.risk_multiplier,
                "loss settled"
            );
        } else {
            state.consecutive_losses = 0;
            state.risk_multiplier =
                (state.risk_multiplier + self.config.win_recovery_step).min(1.0);
        }
        metrics::gauge!("tradeloop_risk_multiplier").set(state.risk_multiplier);
        metrics::gauge!("tradeloop_daily_trades").set(state.daily_trade_count as f64);
    }
}

fn same_utc_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}
