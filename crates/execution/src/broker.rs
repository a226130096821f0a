use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{OrderSide, Side};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExecutionError;

/// Idempotency key for one order intent. A broker adapter that reconnects
/// mid-flight must not resubmit an intent id it has already accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// One order intent, as handed to a broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub intent_id: IntentId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Contracts, always positive.
    pub size: u32,
    /// Required for limit orders; ignored for market orders.
    pub limit_price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, size: u32) -> Self {
        Self {
            intent_id: IntentId::new(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            size,
            limit_price: None,
        }
    }

    pub fn limit(symbol: &str, side: OrderSide, size: u32, price: f64) -> Self {
        Self {
            intent_id: IntentId::new(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            size,
            limit_price: Some(price),
        }
    }
}

/// Fill confirmation for a previously submitted intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub intent_id: IntentId,
    pub price: f64,
    pub time: DateTime<Utc>,
    pub size: u32,
}

/// A position as the broker reports it, used only for restart reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub side: Side,
    pub size: u32,
}

/// The brokerage collaborator.
///
/// The engine owns exactly one broker, calls it from a single task, and
/// treats every response as an input to its state machine. The concrete live
/// adapter is a plug point; the crate ships the simulated implementation.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> Result<(), ExecutionError>;

    async fn disconnect(&self) -> Result<(), ExecutionError>;

    async fn is_connected(&self) -> bool;

    /// Submits an order intent. Acceptance is not a fill; the fill arrives
    /// through [`Broker::await_fill`].
    async fn place_order(&self, request: &OrderRequest) -> Result<IntentId, ExecutionError>;

    async fn cancel(&self, intent_id: IntentId) -> Result<(), ExecutionError>;

    /// Open positions as the broker sees them.
    async fn positions(&self) -> Result<Vec<BrokerPosition>, ExecutionError>;

    /// Resolves once the given intent fills. The caller bounds this with its
    /// own fill timeout; an unresolved fill is an engine-level halt, not a
    /// broker error.
    async fn await_fill(&self, intent_id: IntentId) -> Result<Fill, ExecutionError>;
}
