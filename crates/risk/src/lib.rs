//! # Meridian Risk Crate
//!
//! The circuit-breaker layer: a pre-trade gate consulted before any order
//! intent leaves the engine, and the post-trade accounting that feeds it.
//!
//! A denial is not an error. The engine suppresses the intent, records why,
//! and keeps processing bars; only `reset_daily` (driven by the trading
//! calendar's session boundary, never wall-clock midnight) restores a halted
//! session.

pub mod error;
pub mod gate;

pub use error::RiskError;
pub use gate::{Decision, DenyReason, HaltReason, RiskGate, RiskState};
