use chrono::{DateTime, Duration, Utc};
use core_types::{CloseReason, Position, Side, Trade};

use crate::error::ExecutionError;

/// Point P&L in account currency: `(exit - entry) * size * multiplier` for
/// longs, mirrored for shorts.
pub fn calculate_pnl(entry: f64, exit: f64, side: Side, size: u32, multiplier: f64) -> f64 {
    let per_contract = match side {
        Side::Long => exit - entry,
        Side::Short => entry - exit,
    };
    per_contract * size as f64 * multiplier
}

/// The single-position P&L accountant.
///
/// At most one position exists at any time. The position is created on fill
/// confirmation, marked to market between fills, and consumed into a
/// [`Trade`] when the closing fill confirms. Nothing else mutates it.
#[derive(Debug, Clone)]
pub struct Ledger {
    multiplier: f64,
    position: Option<Position>,
}

impl Ledger {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            position: None,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Installs the freshly filled position.
    pub fn open(&mut self, position: Position) -> Result<&Position, ExecutionError> {
        if self.position.is_some() {
            return Err(ExecutionError::PositionAlreadyOpen);
        }
        self.position = Some(position);
        Ok(self.position.as_ref().unwrap())
    }

    /// Closes the open position at the given fill and returns the completed
    /// trade.
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_zscore: f64,
        reason: CloseReason,
    ) -> Result<Trade, ExecutionError> {
        let position = self
            .position
            .take()
            .ok_or(ExecutionError::NoOpenPosition("close"))?;

        let realized_pnl = calculate_pnl(
            position.entry_price,
            exit_price,
            position.side,
            position.size,
            self.multiplier,
        );

        Ok(Trade {
            open_time: position.entry_time,
            close_time: exit_time,
            side: position.side,
            size: position.size,
            entry_price: position.entry_price,
            exit_price,
            realized_pnl,
            z_on_entry: position.entry_zscore,
            z_on_exit: exit_zscore,
            close_reason: reason,
        })
    }

    /// Mark-to-market of the open position; zero when flat.
    pub fn mark(&self, price: f64) -> f64 {
        self.position
            .as_ref()
            .map(|p| p.unrealized_pnl(price, self.multiplier))
            .unwrap_or(0.0)
    }

    /// How long the open position has been held.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.position.as_ref().map(|p| p.duration(now))
    }

    /// Reinstates a position from a snapshot at restart.
    pub fn restore(&mut self, position: Option<Position>) {
        self.position = position;
    }
}
