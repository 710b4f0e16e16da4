//! Durable-state round-trip guarantees

use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use tradeloop::lifecycle::{CloseReason, Position, PositionState, Side};
use tradeloop::providers::{EngineSnapshot, JsonFileStore, MemoryStateStore, StateStore};
use tradeloop::risk::RiskState;

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn snapshot() -> EngineSnapshot {
    let open = Position::open(
        "BTCUSDT",
        Side::Long,
        dec!(64950.25),
        dec!(0.015),
        dec!(64625.50),
        dec!(65470.00),
        ts(),
        Duration::minutes(45),
    );

    let mut closing = Position::open(
        "ETHUSDT",
        Side::Short,
        dec!(3405.10),
        dec!(0.8),
        dec!(3456.18),
        dec!(3302.95),
        ts() - Duration::hours(3),
        Duration::hours(24),
    );
    closing.state = PositionState::Closing;
    closing.close_reason = Some(CloseReason::StopLoss);
    closing.close_attempts = 2;

    let mut risk = RiskState::new("main", ts());
    risk.consecutive_losses = 2;
    risk.risk_multiplier = 0.5;
    risk.daily_trade_count = 4;
    risk.last_loss_at = Some(ts() - Duration::minutes(20));

    EngineSnapshot {
        positions: vec![open, closing],
        risk,
    }
}

#[test]
fn test_json_roundtrip_is_identical() {
    let original = snapshot();
    let encoded = serde_json::to_string(&original).unwrap();
    let decoded: EngineSnapshot = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_roundtrip_preserves_lifecycle_detail() {
    let original = snapshot();
    let encoded = serde_json::to_string_pretty(&original).unwrap();
    let decoded: EngineSnapshot = serde_json::from_str(&encoded).unwrap();

    let closing = decoded
        .positions
        .iter()
        .find(|p| p.symbol == "ETHUSDT")
        .unwrap();
    assert_eq!(closing.state, PositionState::Closing);
    assert_eq!(closing.close_reason, Some(CloseReason::StopLoss));
    assert_eq!(closing.close_attempts, 2);
    assert_eq!(closing.max_hold_deadline, ts() - Duration::hours(3) + Duration::hours(24));

    assert_eq!(decoded.risk.consecutive_losses, 2);
    assert_eq!(decoded.risk.risk_multiplier, 0.5);
    assert_eq!(decoded.risk.last_loss_at, Some(ts() - Duration::minutes(20)));
}

#[tokio::test]
async fn test_memory_store_roundtrip() {
    let store = MemoryStateStore::new();
    let original = snapshot();
    store.save(&original).await.unwrap();
    assert_eq!(store.load().await.unwrap(), Some(original));
}

#[tokio::test]
async fn test_file_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("snapshot.json"));
    let original = snapshot();
    store.save(&original).await.unwrap();
    assert_eq!(store.load().await.unwrap(), Some(original));
}
