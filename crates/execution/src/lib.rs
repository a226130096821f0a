//! # Meridian Execution Crate
//!
//! This crate provides the components that sit between signals and the
//! market: the `Broker` collaborator trait, the simulated broker used by
//! backtests and paper trading, the single-position P&L ledger, and the
//! synthetic market-data generator.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** brokers report fills; only the `Ledger`
//!   turns fills into position state and realized P&L. The ledger never
//!   talks to a broker.
//! - **Execution Abstraction:** the `Broker` trait lets the engine, the
//!   backtester, and paper trading share one code path. Intent ids are
//!   idempotency keys so a reconnecting adapter cannot double-submit.
//!
//! ## Public API
//!
//! - `Broker`: the collaborator trait for order routing.
//! - `SimBroker`: the virtual exchange for backtests and paper mode.
//! - `Ledger`: the single-position P&L accountant.
//! - `synthetic`: seeded OHLCV generation for seeding and paper mode.

pub mod broker;
pub mod error;
pub mod ledger;
pub mod sim;
pub mod synthetic;

pub use broker::{Broker, BrokerPosition, Fill, IntentId, OrderRequest, OrderType};
pub use error::ExecutionError;
pub use ledger::{calculate_pnl, Ledger};
pub use sim::SimBroker;
