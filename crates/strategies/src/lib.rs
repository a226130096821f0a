//! # Meridian Strategy Library
//!
//! This crate contains the signal-side logic of the system: the streaming
//! rolling statistics and the mean-reversion signal generator built on them.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of
//!   brokers, persistence, or execution. It depends only on `core-types` and
//!   `configuration`.
//! - **Pure signal function:** `SignalGenerator` reads only its own rolling
//!   statistics and the position view the engine feeds it. Live and replayed
//!   runs over the same bar sequence therefore produce bit-identical signal
//!   streams.
//!
//! ## Public API
//!
//! - `RollingStats`: numerically stable sliding-window mean/std/Z-score.
//! - `SignalGenerator`: the hysteresis entry/exit state machine.
//! - `StrategyError`: the specific error types that can be returned from this crate.

pub mod error;
pub mod mean_reversion;
pub mod rolling;

pub use error::StrategyError;
pub use mean_reversion::SignalGenerator;
pub use rolling::RollingStats;
