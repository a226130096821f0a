pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CloseReason, OrderSide, PositionView, Side, SignalKind};
pub use error::CoreError;
pub use structs::{serde_duration, Bar, DailySummary, Position, Signal, Trade};
