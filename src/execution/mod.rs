//! Execution gateway
//!
//! Order submission behind a trait; the crate ships a paper-trading
//! implementation with simulated fills.

mod paper;
mod types;

pub use paper::PaperGateway;
pub use types::{OrderId, OrderRequest, OrderResult, OrderSide, OrderStatus, OrderType};

use crate::error::ProviderError;
use async_trait::async_trait;

/// Trait for execution gateway implementations
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit an order
    async fn submit_order(&self, order: OrderRequest) -> Result<OrderResult, ProviderError>;
    /// Cancel an order
    async fn cancel_order(&self, id: OrderId) -> Result<(), ProviderError>;
}
