//! Position lifecycle state machine
//!
//! NONE → OPEN → CLOSING → CLOSED, per symbol. Exit rules record exactly one
//! close reason; stop-loss is checked before take-profit, the hold deadline
//! last. A failed closing order keeps the position CLOSING and is retried
//! with bounded backoff, never silently dropped.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

/// Lifecycle state. Closed is terminal; archival happens externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    Open,
    Closing,
    Closed,
}

/// Why a position left OPEN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    MaxHold,
    Manual,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("symbol {0} already has an active position")]
    AlreadyActive(String),
    #[error("no active position for symbol {0}")]
    NotFound(String),
}

/// An open or closing position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
    pub max_hold_deadline: DateTime<Utc>,
    pub state: PositionState,
    pub close_reason: Option<CloseReason>,
    /// Closing-order submissions attempted so far
    pub close_attempts: u32,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        opened_at: DateTime<Utc>,
        max_hold: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            opened_at,
            max_hold_deadline: opened_at + max_hold,
            state: PositionState::Open,
            close_reason: None,
            close_attempts: 0,
        }
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (price - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - price) * self.quantity,
        }
    }

    /// Non-CLOSED positions block new entries on their symbol
    pub fn is_active(&self) -> bool {
        self.state != PositionState::Closed
    }
}

/// Exit rule evaluation for an OPEN position. Returns the single recorded
/// close cause, or None to keep holding.
pub fn check_exit(position: &Position, price: Decimal, now: DateTime<Utc>) -> Option<CloseReason> {
    let stop_hit = match position.side {
        Side::Long => price <= position.stop_loss,
        Side::Short => price >= position.stop_loss,
    };
    if stop_hit {
        return Some(CloseReason::StopLoss);
    }

    let target_hit = match position.side {
        Side::Long => price >= position.take_profit,
        Side::Short => price <= position.take_profit,
    };
    if target_hit {
        return Some(CloseReason::TakeProfit);
    }

    if now >= position.max_hold_deadline {
        return Some(CloseReason::MaxHold);
    }

    None
}

/// Lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Closing-order attempts before escalating a fatal alert
    #[serde(default = "default_max_close_attempts")]
    pub max_close_attempts: u32,
    /// Base delay between closing retries (secs), doubled per attempt
    #[serde(default = "default_close_retry_base_secs")]
    pub close_retry_base_secs: u64,
    /// Budget for one order submission (secs)
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,
}

fn default_max_close_attempts() -> u32 {
    5
}
fn default_close_retry_base_secs() -> u64 {
    2
}
fn default_order_timeout_secs() -> u64 {
    10
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_close_attempts: default_max_close_attempts(),
            close_retry_base_secs: default_close_retry_base_secs(),
            order_timeout_secs: default_order_timeout_secs(),
        }
    }
}

impl LifecycleConfig {
    /// Backoff before the next closing retry
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let factor = 1u64 << attempts.min(10);
        Duration::seconds((self.close_retry_base_secs * factor) as i64)
    }
}

/// Owns every active position, at most one per symbol
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-attach active positions from a durable snapshot
    pub fn restore(positions: Vec<Position>) -> Self {
        let positions = positions
            .into_iter()
            .filter(|p| p.is_active())
            .map(|p| (p.symbol.clone(), p))
            .collect();
        Self { positions }
    }

    /// NONE → OPEN. Rejected while any non-CLOSED position exists for the
    /// symbol.
    pub fn open(&mut self, position: Position) -> Result<(), LifecycleError> {
        if self.positions.contains_key(&position.symbol) {
            return Err(LifecycleError::AlreadyActive(position.symbol));
        }
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// OPEN → CLOSING with the recorded cause
    pub fn begin_close(
        &mut self,
        symbol: &str,
        reason: CloseReason,
    ) -> Result<&Position, LifecycleError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LifecycleError::NotFound(symbol.to_string()))?;
        if position.state == PositionState::Open {
            position.state = PositionState::Closing;
            position.close_reason = Some(reason);
        }
        Ok(position)
    }

    /// Record one closing-order submission attempt; returns the new count
    pub fn record_close_attempt(&mut self, symbol: &str) -> Result<u32, LifecycleError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LifecycleError::NotFound(symbol.to_string()))?;
        position.close_attempts += 1;
        Ok(position.close_attempts)
    }

    /// CLOSING → CLOSED on confirmed execution. Removes the position and
    /// returns it with realized P/L.
    pub fn complete_close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
    ) -> Result<(Position, Decimal), LifecycleError> {
        let mut position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| LifecycleError::NotFound(symbol.to_string()))?;
        position.state = PositionState::Closed;
        let pnl = position.unrealized_pnl(exit_price);
        Ok((position, pnl))
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Whether a non-CLOSED position blocks new entries for the symbol
    pub fn has_active(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn active_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn long_position() -> Position {
        Position::open(
            "BTCUSDT",
            Side::Long,
            dec!(100),
            dec!(2),
            dec!(99),
            dec!(103),
            now(),
            Duration::minutes(45),
        )
    }

    #[test]
    fn test_open_records_deadline() {
        let position = long_position();
        assert_eq!(position.state, PositionState::Open);
        assert_eq!(position.max_hold_deadline, now() + Duration::minutes(45));
        assert!(position.close_reason.is_none());
    }

    #[test]
    fn test_one_active_position_per_symbol() {
        let mut book = PositionBook::new();
        book.open(long_position()).unwrap();
        let err = book.open(long_position()).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyActive(_)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_long_exit_rules() {
        let position = long_position();
        let soon = now() + Duration::minutes(1);

        assert_eq!(check_exit(&position, dec!(100.5), soon), None);
        assert_eq!(
            check_exit(&position, dec!(99), soon),
            Some(CloseReason::StopLoss)
        );
        assert_eq!(
            check_exit(&position, dec!(103.2), soon),
            Some(CloseReason::TakeProfit)
        );
    }

    #[test]
    fn test_short_exit_rules() {
        let position = Position::open(
            "ETHUSDT",
            Side::Short,
            dec!(100),
            dec!(1),
            dec!(101.5),
            dec!(97),
            now(),
            Duration::hours(4),
        );
        let soon = now() + Duration::minutes(1);

        assert_eq!(
            check_exit(&position, dec!(102), soon),
            Some(CloseReason::StopLoss)
        );
        assert_eq!(
            check_exit(&position, dec!(96.5), soon),
            Some(CloseReason::TakeProfit)
        );
        assert_eq!(check_exit(&position, dec!(100), soon), None);
    }

    #[test]
    fn test_stop_takes_priority_over_deadline() {
        let position = long_position();
        let late = now() + Duration::hours(2);
        assert_eq!(
            check_exit(&position, dec!(98), late),
            Some(CloseReason::StopLoss)
        );
    }

    #[test]
    fn test_deadline_triggers_max_hold() {
        let position = long_position();
        let at_deadline = now() + Duration::minutes(45);
        assert_eq!(
            check_exit(&position, dec!(100.5), at_deadline),
            Some(CloseReason::MaxHold)
        );
        // One second earlier the position still holds.
        assert_eq!(
            check_exit(&position, dec!(100.5), at_deadline - Duration::seconds(1)),
            None
        );
    }

    #[test]
    fn test_begin_close_records_single_reason() {
        let mut book = PositionBook::new();
        book.open(long_position()).unwrap();

        book.begin_close("BTCUSDT", CloseReason::TakeProfit).unwrap();
        let position = book.get("BTCUSDT").unwrap();
        assert_eq!(position.state, PositionState::Closing);
        assert_eq!(position.close_reason, Some(CloseReason::TakeProfit));

        // A second trigger while CLOSING does not overwrite the cause.
        book.begin_close("BTCUSDT", CloseReason::StopLoss).unwrap();
        let position = book.get("BTCUSDT").unwrap();
        assert_eq!(position.close_reason, Some(CloseReason::TakeProfit));
    }

    #[test]
    fn test_complete_close_realizes_pnl() {
        let mut book = PositionBook::new();
        book.open(long_position()).unwrap();
        book.begin_close("BTCUSDT", CloseReason::TakeProfit).unwrap();

        let (position, pnl) = book.complete_close("BTCUSDT", dec!(103)).unwrap();
        assert_eq!(position.state, PositionState::Closed);
        assert_eq!(pnl, dec!(6)); // (103 - 100) * 2
        assert!(!book.has_active("BTCUSDT"));
    }

    #[test]
    fn test_close_attempts_accumulate() {
        let mut book = PositionBook::new();
        book.open(long_position()).unwrap();
        book.begin_close("BTCUSDT", CloseReason::MaxHold).unwrap();

        assert_eq!(book.record_close_attempt("BTCUSDT").unwrap(), 1);
        assert_eq!(book.record_close_attempt("BTCUSDT").unwrap(), 2);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let config = LifecycleConfig::default();
        assert_eq!(config.retry_delay(0), Duration::seconds(2));
        assert_eq!(config.retry_delay(1), Duration::seconds(4));
        assert_eq!(config.retry_delay(3), Duration::seconds(16));
    }

    #[test]
    fn test_restore_drops_closed_positions() {
        let mut closed = long_position();
        closed.state = PositionState::Closed;
        let mut closing = Position::open(
            "ETHUSDT",
            Side::Short,
            dec!(100),
            dec!(1),
            dec!(102),
            dec!(96),
            now(),
            Duration::hours(1),
        );
        closing.state = PositionState::Closing;

        let book = PositionBook::restore(vec![closed, closing]);
        assert_eq!(book.len(), 1);
        assert!(book.has_active("ETHUSDT"));
    }

    #[test]
    fn test_short_unrealized_pnl() {
        let position = Position::open(
            "ETHUSDT",
            Side::Short,
            dec!(100),
            dec!(3),
            dec!(102),
            dec!(96),
            now(),
            Duration::hours(1),
        );
        assert_eq!(position.unrealized_pnl(dec!(98)), dec!(6));
        assert_eq!(position.unrealized_pnl(dec!(101)), dec!(-3));
    }
}
