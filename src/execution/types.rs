//! Execution types

use crate::lifecycle::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Order side at the gateway (distinct from position side: closing a long
/// submits a sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens a position
    pub fn entry(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Side that closes a position
    pub fn exit(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Immediate execution at the prevailing price
    Market,
    /// Execution at `price` or better
    Limit,
}

/// An order to be submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    /// Reference price: the limit for limit orders, the expected fill
    /// anchor for market orders
    pub price: Decimal,
}

/// Terminal order status reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Rejected,
}

/// Result of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub fill_price: Decimal,
    pub filled_quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}
