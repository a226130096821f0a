use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{Bar, OrderSide, Side};
use tokio::sync::Mutex;

use crate::broker::{Broker, BrokerPosition, Fill, IntentId, OrderRequest, OrderType};
use crate::error::ExecutionError;

/// The virtual exchange used by backtests and paper trading.
///
/// Market orders fill at the current bar's close moved against the order by
/// the configured slippage; limit orders fill at their limit price (the
/// caller has already established the level is inside the bar's range).
/// Fills are queued at submission and delivered through `await_fill`, so the
/// engine exercises the same submit/await round trip it uses live.
///
/// The handle is cheaply cloneable: the replay driver keeps one clone to push
/// bars while the engine owns another as its `Box<dyn Broker>`.
#[derive(Clone)]
pub struct SimBroker {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    symbol: String,
    /// Adverse price move applied per side to market fills, in price units.
    slippage: f64,
    connected: bool,
    current_bar: Option<Bar>,
    pending: HashMap<IntentId, (OrderSide, Fill)>,
    /// Net contracts, signed; positive is long.
    net_position: i64,
    /// When set, fills are never delivered. Lets tests drive the engine's
    /// fill-timeout path.
    stall_fills: bool,
}

impl SimBroker {
    pub fn new(symbol: &str, slippage: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                symbol: symbol.to_string(),
                slippage,
                connected: false,
                current_bar: None,
                pending: HashMap::new(),
                net_position: 0,
                stall_fills: false,
            })),
        }
    }

    /// Starts the broker with an existing position, for reconciliation
    /// scenarios where the exchange remembers what the snapshot does not.
    pub async fn with_position(self, side: Side, size: u32) -> Self {
        {
            let mut inner = self.inner.lock().await;
            inner.net_position = match side {
                Side::Long => size as i64,
                Side::Short => -(size as i64),
            };
        }
        self
    }

    /// Advances the simulated market to `bar`. Subsequent fills price off it.
    pub async fn set_bar(&self, bar: Bar) {
        self.inner.lock().await.current_bar = Some(bar);
    }

    pub async fn set_stall_fills(&self, stall: bool) {
        self.inner.lock().await.stall_fills = stall;
    }
}

#[async_trait]
impl Broker for SimBroker {
    async fn connect(&self) -> Result<(), ExecutionError> {
        self.inner.lock().await.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExecutionError> {
        self.inner.lock().await.connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<IntentId, ExecutionError> {
        let mut inner = self.inner.lock().await;
        if !inner.connected {
            return Err(ExecutionError::NotConnected);
        }
        let bar = inner.current_bar.ok_or(ExecutionError::NoMarketData)?;

        let price = match request.order_type {
            OrderType::Market => match request.side {
                OrderSide::Buy => bar.close + inner.slippage,
                OrderSide::Sell => bar.close - inner.slippage,
            },
            OrderType::Limit => request
                .limit_price
                .ok_or(ExecutionError::MissingLimitPrice)?,
        };

        let fill = Fill {
            intent_id: request.intent_id,
            price,
            time: bar.timestamp,
            size: request.size,
        };
        inner.pending.insert(request.intent_id, (request.side, fill));
        Ok(request.intent_id)
    }

    async fn cancel(&self, intent_id: IntentId) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().await;
        inner
            .pending
            .remove(&intent_id)
            .map(|_| ())
            .ok_or_else(|| ExecutionError::UnknownIntent(intent_id.to_string()))
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, ExecutionError> {
        let inner = self.inner.lock().await;
        if inner.net_position == 0 {
            return Ok(Vec::new());
        }
        let side = if inner.net_position > 0 {
            Side::Long
        } else {
            Side::Short
        };
        Ok(vec![BrokerPosition {
            symbol: inner.symbol.clone(),
            side,
            size: inner.net_position.unsigned_abs() as u32,
        }])
    }

    async fn await_fill(&self, intent_id: IntentId) -> Result<Fill, ExecutionError> {
        {
            let inner = self.inner.lock().await;
            if inner.stall_fills {
                drop(inner);
                // Never resolves; the engine's fill timeout fires instead.
                std::future::pending::<()>().await;
            }
        }
        let mut inner = self.inner.lock().await;
        let (side, fill) = inner
            .pending
            .remove(&intent_id)
            .ok_or_else(|| ExecutionError::UnknownIntent(intent_id.to_string()))?;

        // Delivery of the fill is what moves the broker-side position.
        let signed = fill.size as i64;
        inner.net_position += match side {
            OrderSide::Buy => signed,
            OrderSide::Sell => -signed,
        };
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 300,
        }
    }

    #[tokio::test]
    async fn market_fill_pays_slippage_per_side() {
        let broker = SimBroker::new("MES", 0.25);
        broker.connect().await.unwrap();
        broker.set_bar(bar(5000.0)).await;

        let buy = OrderRequest::market("MES", OrderSide::Buy, 1);
        let id = broker.place_order(&buy).await.unwrap();
        let fill = broker.await_fill(id).await.unwrap();
        assert_eq!(fill.price, 5000.25);

        let sell = OrderRequest::market("MES", OrderSide::Sell, 1);
        let id = broker.place_order(&sell).await.unwrap();
        let fill = broker.await_fill(id).await.unwrap();
        assert_eq!(fill.price, 4999.75);
    }

    #[tokio::test]
    async fn limit_fill_lands_on_requested_level() {
        let broker = SimBroker::new("MES", 0.25);
        broker.connect().await.unwrap();
        broker.set_bar(bar(5000.0)).await;

        let flatten = OrderRequest::limit("MES", OrderSide::Sell, 1, 4992.0);
        let id = broker.place_order(&flatten).await.unwrap();
        let fill = broker.await_fill(id).await.unwrap();
        assert_eq!(fill.price, 4992.0);
    }

    #[tokio::test]
    async fn fills_move_the_reported_position() {
        let broker = SimBroker::new("MES", 0.0);
        broker.connect().await.unwrap();
        broker.set_bar(bar(5000.0)).await;

        let buy = OrderRequest::market("MES", OrderSide::Buy, 2);
        let id = broker.place_order(&buy).await.unwrap();
        assert!(broker.positions().await.unwrap().is_empty());

        broker.await_fill(id).await.unwrap();
        let positions = broker.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Long);
        assert_eq!(positions[0].size, 2);
    }

    #[tokio::test]
    async fn orders_require_connection_and_market_data() {
        let broker = SimBroker::new("MES", 0.0);
        let request = OrderRequest::market("MES", OrderSide::Buy, 1);
        assert!(broker.place_order(&request).await.is_err());

        broker.connect().await.unwrap();
        assert!(broker.place_order(&request).await.is_err());

        broker.set_bar(bar(5000.0)).await;
        assert!(broker.place_order(&request).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_removes_pending_intent() {
        let broker = SimBroker::new("MES", 0.0);
        broker.connect().await.unwrap();
        broker.set_bar(bar(5000.0)).await;

        let request = OrderRequest::market("MES", OrderSide::Buy, 1);
        let id = broker.place_order(&request).await.unwrap();
        broker.cancel(id).await.unwrap();
        assert!(broker.await_fill(id).await.is_err());
    }
}
