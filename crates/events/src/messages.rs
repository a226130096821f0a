use chrono::{DateTime, Utc};
use core_types::{DailySummary, Side, SignalKind, Trade};
use serde::{Deserialize, Serialize};

/// The engine's broadcast event stream.
///
/// Consumers (the alert service, the CLI status line) subscribe to a
/// `tokio::sync::broadcast` channel of these. The engine fires and forgets;
/// a consumer that lags or disappears never blocks trading.
///
/// The `#[serde(tag = "type", content = "payload")]` attribute serializes
/// each variant as `{"type": ..., "payload": ...}` so downstream consumers
/// can dispatch without knowing every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// The engine finished initialisation and is consuming bars.
    Started {
        symbol: String,
        mode: String,
        time: DateTime<Utc>,
    },
    /// The engine stopped, cleanly or otherwise.
    Stopped {
        reason: String,
        time: DateTime<Utc>,
    },
    /// An entry fill confirmed.
    TradeOpened {
        symbol: String,
        side: Side,
        size: u32,
        price: f64,
        zscore: f64,
        time: DateTime<Utc>,
    },
    /// A closing fill confirmed; carries the completed round trip.
    TradeClosed { symbol: String, trade: Trade },
    /// The risk gate suppressed an intent.
    SignalSuppressed {
        kind: SignalKind,
        reason: String,
        time: DateTime<Utc>,
    },
    /// A circuit breaker activated.
    BreakerTripped {
        reason: String,
        time: DateTime<Utc>,
    },
    BrokerDisconnected,
    BrokerReconnected,
    /// Session rollover aggregate.
    SessionClosed(DailySummary),
}
