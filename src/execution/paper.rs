//! Paper trading gateway

use super::{ExecutionGateway, OrderId, OrderRequest, OrderResult, OrderSide, OrderStatus};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Paper gateway with immediate simulated fills at the reference price
/// adjusted for slippage
pub struct PaperGateway {
    slippage_pct: Decimal,
    fills: Arc<RwLock<Vec<OrderResult>>>,
}

impl PaperGateway {
    pub fn new(slippage_pct: Decimal) -> Self {
        Self {
            slippage_pct,
            fills: Arc::new(RwLock::new(vec![])),
        }
    }

    /// All fills recorded so far
    pub async fn fills(&self) -> Vec<OrderResult> {
        self.fills.read().await.clone()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(&self, order: OrderRequest) -> Result<OrderResult, ProviderError> {
        // Taker slippage works against the order direction.
        let fill_price = match order.side {
            OrderSide::Buy => order.price * (Decimal::ONE + self.slippage_pct),
            OrderSide::Sell => order.price * (Decimal::ONE - self.slippage_pct),
        };

        let result = OrderResult {
            order_id: OrderId::new_v4(),
            symbol: order.symbol,
            side: order.side,
            status: OrderStatus::Filled,
            fill_price,
            filled_quantity: order.quantity,
            timestamp: Utc::now(),
        };

        self.fills.write().await.push(result.clone());
        tracing::info!(
            order_id = %result.order_id,
            symbol = %result.symbol,
            price = %result.fill_price,
            "paper order filled"
        );
        Ok(result)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<(), ProviderError> {
        tracing::info!(order_id = %id, "paper order cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::OrderType;
    use rust_decimal_macros::dec;

    fn order(side: OrderSide, price: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".to_string(),
            side,
            quantity: dec!(2),
            order_type: OrderType::Market,
            price,
        }
    }

    #[tokio::test]
    async fn test_buy_fill_pays_slippage() {
        let gateway = PaperGateway::new(dec!(0.001));
        let result = gateway
            .submit_order(order(OrderSide::Buy, dec!(100)))
            .await
            .unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.fill_price, dec!(100.1));
        assert_eq!(result.filled_quantity, dec!(2));
    }

    #[tokio::test]
    async fn test_sell_fill_pays_slippage_down() {
        let gateway = PaperGateway::new(dec!(0.001));
        let result = gateway
            .submit_order(order(OrderSide::Sell, dec!(100)))
            .await
            .unwrap();
        assert_eq!(result.fill_price, dec!(99.9));
    }

    #[tokio::test]
    async fn test_fills_are_recorded() {
        let gateway = PaperGateway::new(dec!(0));
        gateway
            .submit_order(order(OrderSide::Buy, dec!(50)))
            .await
            .unwrap();
        gateway
            .submit_order(order(OrderSide::Sell, dec!(51)))
            .await
            .unwrap();
        let fills = gateway.fills().await;
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].side, OrderSide::Buy);
        assert_eq!(fills[1].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn test_cancel_is_noop() {
        let gateway = PaperGateway::new(dec!(0));
        assert!(gateway.cancel_order(OrderId::new_v4()).await.is_ok());
    }
}
