use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The order side that opens a position in this direction.
    pub fn opening_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// The order side that flattens a position in this direction.
    pub fn closing_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl serde::Serialize for OrderSide {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            OrderSide::Buy => serializer.serialize_str("BUY"),
            OrderSide::Sell => serializer.serialize_str("SELL"),
        }
    }
}

impl<'de> serde::Deserialize<'de> for OrderSide {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            _ => Err(serde::de::Error::custom(format!(
                "unknown variant `{}`, expected `Buy` or `Sell`",
                s
            ))),
        }
    }
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// What the signal generator wants done, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Hold,
}

impl SignalKind {
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalKind::EnterLong | SignalKind::EnterShort)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, SignalKind::ExitLong | SignalKind::ExitShort)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::EnterLong => "ENTER_LONG",
            SignalKind::EnterShort => "ENTER_SHORT",
            SignalKind::ExitLong => "EXIT_LONG",
            SignalKind::ExitShort => "EXIT_SHORT",
            SignalKind::Hold => "HOLD",
        }
    }
}

impl std::str::FromStr for SignalKind {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTER_LONG" => Ok(SignalKind::EnterLong),
            "ENTER_SHORT" => Ok(SignalKind::EnterShort),
            "EXIT_LONG" => Ok(SignalKind::ExitLong),
            "EXIT_SHORT" => Ok(SignalKind::ExitShort),
            "HOLD" => Ok(SignalKind::Hold),
            other => Err(crate::error::CoreError::InvalidInput(
                "signal_kind".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// The signal generator's view of the engine position. Updated by the engine
/// on fill confirmation only, never queried from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionView {
    #[default]
    Flat,
    Long,
    Short,
}

impl From<Side> for PositionView {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => PositionView::Long,
            Side::Short => PositionView::Short,
        }
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Z-score reverted through the exit threshold.
    ZExit,
    StopLoss,
    TakeProfit,
    /// Held past the configured maximum duration.
    DurationCap,
    /// Flattened outside signal logic (shutdown, reconciliation).
    ForceFlatten,
    /// Closed because the risk gate halted the session.
    RiskHalt,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ZExit => "Z_EXIT",
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::TakeProfit => "TAKE_PROFIT",
            CloseReason::DurationCap => "DURATION_CAP",
            CloseReason::ForceFlatten => "FORCE_FLATTEN",
            CloseReason::RiskHalt => "RISK_HALT",
        }
    }
}

impl std::str::FromStr for CloseReason {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Z_EXIT" => Ok(CloseReason::ZExit),
            "STOP_LOSS" => Ok(CloseReason::StopLoss),
            "TAKE_PROFIT" => Ok(CloseReason::TakeProfit),
            "DURATION_CAP" => Ok(CloseReason::DurationCap),
            "FORCE_FLATTEN" => Ok(CloseReason::ForceFlatten),
            "RISK_HALT" => Ok(CloseReason::RiskHalt),
            other => Err(crate::error::CoreError::InvalidInput(
                "close_reason".to_string(),
                other.to_string(),
            )),
        }
    }
}
