//! # Meridian Analytics Crate
//!
//! A stateless calculator that turns a closed-trade list and an equity curve
//! into a standard performance report. Used identically by the backtester,
//! the walk-forward evaluator, and the CLI report command, so every surface
//! quotes the same numbers.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::PerformanceReport;
