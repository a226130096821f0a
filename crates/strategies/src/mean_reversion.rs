use configuration::StrategyConfig;
use core_types::{Bar, PositionView, Signal, SignalKind};

use crate::error::StrategyError;
use crate::rolling::RollingStats;

/// The mean-reversion signal state machine.
///
/// Entries fire when the Z-score stretches past `z_entry`; exits fire when it
/// reverts inside `z_exit`. The gap between the two thresholds is the
/// hysteresis band that stops a position from flapping around the entry
/// boundary.
///
/// The generator is a pure function of its rolling statistics, its
/// configured thresholds, and the position view the engine feeds it through
/// [`SignalGenerator::set_position`]. It never queries broker state, which
/// keeps live and replayed signal streams identical for the same bars.
pub struct SignalGenerator {
    stats: RollingStats,
    params: StrategyConfig,
    view: PositionView,
}

impl SignalGenerator {
    pub fn new(params: StrategyConfig) -> Result<Self, StrategyError> {
        if params.z_entry <= 0.0 {
            return Err(StrategyError::InvalidParameters(
                "z_entry must be positive".to_string(),
            ));
        }
        if params.z_exit < 0.0 || params.z_exit >= params.z_entry {
            return Err(StrategyError::InvalidParameters(format!(
                "z_exit {} must lie in [0, z_entry {})",
                params.z_exit, params.z_entry
            )));
        }
        Ok(Self {
            stats: RollingStats::new(params.lookback)?,
            params,
            view: PositionView::Flat,
        })
    }

    /// Folds a bar into the rolling window and evaluates the signal rules.
    ///
    /// Always returns a signal; `Hold` while warming up, under the volume
    /// floor, or when no threshold is crossed.
    pub fn on_bar(&mut self, bar: &Bar) -> Result<Signal, StrategyError> {
        let z = match self.stats.update(bar.close)? {
            Some(z) => z,
            None => return Ok(Signal::hold(bar, 0.0)),
        };

        if bar.volume < self.params.min_volume {
            return Ok(Signal::hold(bar, z));
        }

        let kind = match self.view {
            PositionView::Flat => {
                if z <= -self.params.z_entry {
                    SignalKind::EnterLong
                } else if z >= self.params.z_entry {
                    SignalKind::EnterShort
                } else {
                    SignalKind::Hold
                }
            }
            PositionView::Long => {
                if z >= -self.params.z_exit {
                    SignalKind::ExitLong
                } else {
                    SignalKind::Hold
                }
            }
            PositionView::Short => {
                if z <= self.params.z_exit {
                    SignalKind::ExitShort
                } else {
                    SignalKind::Hold
                }
            }
        };

        Ok(Signal {
            kind,
            timestamp: bar.timestamp,
            price: bar.close,
            zscore: z,
            volume: bar.volume,
        })
    }

    /// Informs the generator of a confirmed position transition. Called by
    /// the engine on fill confirmation only.
    pub fn set_position(&mut self, view: PositionView) {
        self.view = view;
    }

    pub fn position_view(&self) -> PositionView {
        self.view
    }

    pub fn is_ready(&self) -> bool {
        self.stats.is_ready()
    }

    pub fn stats(&self) -> &RollingStats {
        &self.stats
    }

    /// Rebuilds the rolling window from recorded prices, oldest first.
    /// Used at restart when the store still holds recent history.
    pub fn seed(&mut self, prices: &[f64]) -> Result<(), StrategyError> {
        self.stats.reset();
        for &price in prices {
            self.stats.update(price)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.stats.reset();
        self.view = PositionView::Flat;
    }
}
