use crate::enums::{CloseReason, Side, SignalKind};
use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV record over a fixed timeframe. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Checks price sanity: all prices finite and positive, and
    /// `low <= min(open, close) <= max(open, close) <= high`.
    pub fn validate(&self) -> Result<(), CoreError> {
        for price in [self.open, self.high, self.low, self.close] {
            if !price.is_finite() {
                return Err(CoreError::NonFinitePrice(price));
            }
            if price <= 0.0 {
                return Err(CoreError::InvalidInput(
                    "bar price".to_string(),
                    format!("{price} is not positive"),
                ));
            }
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low || body_high > self.high {
            return Err(CoreError::MalformedBar {
                timestamp: self.timestamp.to_rfc3339(),
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        Ok(())
    }
}

/// A generated trading signal with the market context that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub zscore: f64,
    pub volume: u64,
}

impl Signal {
    pub fn hold(bar: &Bar, zscore: f64) -> Self {
        Self {
            kind: SignalKind::Hold,
            timestamp: bar.timestamp,
            price: bar.close,
            zscore,
            volume: bar.volume,
        }
    }
}

/// The single open position. Created on fill confirmation, mutated only by
/// the ledger, consumed into a [`Trade`] on close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    /// Contracts, always positive; the side carries the direction.
    pub size: u32,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_zscore: f64,
    pub stop_price: Option<f64>,
    pub take_price: Option<f64>,
    #[serde(with = "serde_duration")]
    pub max_duration: Duration,
}

impl Position {
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    /// Mark-to-market value of the position at `price`, in account currency.
    pub fn unrealized_pnl(&self, price: f64, multiplier: f64) -> f64 {
        let per_contract = match self.side {
            Side::Long => price - self.entry_price,
            Side::Short => self.entry_price - price,
        };
        per_contract * self.size as f64 * multiplier
    }
}

/// A closed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub side: Side,
    pub size: u32,
    pub entry_price: f64,
    pub exit_price: f64,
    pub realized_pnl: f64,
    pub z_on_entry: f64,
    pub z_on_exit: f64,
    pub close_reason: CloseReason,
}

impl Trade {
    /// Break-even trades count as wins so a zero-P&L scratch does not extend
    /// a losing streak.
    pub fn is_win(&self) -> bool {
        self.realized_pnl >= 0.0
    }

    pub fn holding_period(&self) -> Duration {
        self.close_time - self.open_time
    }
}

/// One session's aggregate results, written at session rollover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: chrono::NaiveDate,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub pnl: f64,
    pub max_drawdown: f64,
}

/// Serde adapter for `chrono::Duration` as whole seconds.
pub mod serde_duration {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 250,
        }
    }

    #[test]
    fn well_formed_bar_passes() {
        assert!(bar(100.0, 101.0, 99.0, 100.5).validate().is_ok());
    }

    #[test]
    fn high_below_body_is_rejected() {
        assert!(bar(100.0, 100.2, 99.0, 100.5).validate().is_err());
    }

    #[test]
    fn non_finite_close_is_rejected() {
        assert!(bar(100.0, 101.0, 99.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn unrealized_pnl_respects_side() {
        let pos = Position {
            side: Side::Short,
            size: 2,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
            entry_price: 5000.0,
            entry_zscore: 2.4,
            stop_price: None,
            take_price: None,
            max_duration: Duration::hours(2),
        };
        // Short profits when price falls: (5000 - 4998) * 2 * 5.
        assert_eq!(pos.unrealized_pnl(4998.0, 5.0), 20.0);
        assert_eq!(pos.unrealized_pnl(5001.0, 5.0), -10.0);
    }

    #[test]
    fn order_side_serde_uses_exchange_spelling() {
        use crate::enums::OrderSide;
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"BUY\"");
        let side: OrderSide = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(side, OrderSide::Sell);
    }
}
