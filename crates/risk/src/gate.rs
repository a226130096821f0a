use chrono::{DateTime, NaiveDate, Utc};
use configuration::RiskConfig;
use core_types::Trade;
use serde::{Deserialize, Serialize};

use crate::error::RiskError;

/// Outcome of the pre-trade gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Why an intent was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// An external halt is in force (broker failure, operator action).
    Halted(HaltReason),
    /// Session P&L has breached the daily loss limit.
    DailyLoss,
    /// A cooldown pause is in force for a reason other than the loss streak.
    Cooldown,
    DailyTradeCap,
    /// The consecutive-loss streak tripped; holds until its cooldown lapses.
    ConsecutiveLosses,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Halted(_) => "HALTED",
            DenyReason::DailyLoss => "DAILY_LOSS",
            DenyReason::Cooldown => "COOLDOWN",
            DenyReason::DailyTradeCap => "DAILY_TRADE_CAP",
            DenyReason::ConsecutiveLosses => "CONSECUTIVE_LOSSES",
        }
    }
}

/// Why the session was halted from outside the P&L accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    BrokerTimeout,
    BrokerUnavailable,
    ForceFlatten,
    Manual,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaltReason::BrokerTimeout => "BROKER_TIMEOUT",
            HaltReason::BrokerUnavailable => "BROKER_UNAVAILABLE",
            HaltReason::ForceFlatten => "FORCE_FLATTEN",
            HaltReason::Manual => "MANUAL",
        }
    }
}

/// Session-scoped risk accounting. Serialized whole into engine snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub session_date: NaiveDate,
    /// Realized P&L of trades closed this session.
    pub realized_pnl: f64,
    /// Last mark-to-market of the open position, zero when flat.
    pub open_mark: f64,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub wins_today: u32,
    pub losses_today: u32,
    /// High-water mark of session P&L, for the daily drawdown figure.
    pub peak_session_pnl: f64,
    pub max_drawdown_today: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub open_position_entry_time: Option<DateTime<Utc>>,
    pub halted: Option<HaltReason>,
    /// Latched when session P&L first breaches the daily loss limit; a
    /// recovery does not unlatch it. Only the daily reset clears it.
    pub daily_loss_triggered: bool,
}

impl RiskState {
    pub fn new(session_date: NaiveDate) -> Self {
        Self {
            session_date,
            realized_pnl: 0.0,
            open_mark: 0.0,
            consecutive_losses: 0,
            trades_today: 0,
            wins_today: 0,
            losses_today: 0,
            peak_session_pnl: 0.0,
            max_drawdown_today: 0.0,
            cooldown_until: None,
            open_position_entry_time: None,
            halted: None,
            daily_loss_triggered: false,
        }
    }

    /// Realized plus mark-to-market of any open position.
    pub fn session_pnl(&self) -> f64 {
        self.realized_pnl + self.open_mark
    }
}

/// The multi-dimensional pre-trade gate.
///
/// Check order when several conditions hold at once: external halt, then
/// daily loss, then cooldown, then trade cap. A cooldown caused by the loss
/// streak reports `ConsecutiveLosses` so the operator sees the cause rather
/// than the mechanism.
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
    state: RiskState,
}

impl RiskGate {
    pub fn new(config: RiskConfig, session_date: NaiveDate) -> Result<Self, RiskError> {
        if config.max_daily_loss <= 0.0 {
            return Err(RiskError::InvalidParameters(
                "max_daily_loss must be greater than 0".to_string(),
            ));
        }
        if config.max_consecutive_losses < 1 {
            return Err(RiskError::InvalidParameters(
                "max_consecutive_losses must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            state: RiskState::new(session_date),
        })
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn session_date(&self) -> NaiveDate {
        self.state.session_date
    }

    /// The pre-trade predicate. Consulted before any entry intent is sent.
    ///
    /// Takes `&mut self` because an expired loss-streak cooldown is cleared
    /// here: the first permitted check after the pause resets the streak.
    pub fn can_trade(&mut self, now: DateTime<Utc>) -> Decision {
        if let Some(reason) = self.state.halted {
            return Decision::Deny(DenyReason::Halted(reason));
        }

        if self.state.daily_loss_triggered {
            return Decision::Deny(DenyReason::DailyLoss);
        }

        if let Some(until) = self.state.cooldown_until {
            if now < until {
                if self.state.consecutive_losses >= self.config.max_consecutive_losses {
                    return Decision::Deny(DenyReason::ConsecutiveLosses);
                }
                return Decision::Deny(DenyReason::Cooldown);
            }
            tracing::info!("cooldown expired, resuming trading");
            self.state.cooldown_until = None;
            self.state.consecutive_losses = 0;
        }

        if self.state.trades_today >= self.config.max_daily_trades {
            return Decision::Deny(DenyReason::DailyTradeCap);
        }

        Decision::Allow
    }

    /// Post-trade accounting. Updates session P&L, the win/loss streak, and
    /// arms the cooldown when the streak trips.
    pub fn record(&mut self, trade: &Trade, now: DateTime<Utc>) {
        self.state.trades_today += 1;
        self.state.realized_pnl += trade.realized_pnl;
        self.state.open_mark = 0.0;

        if trade.is_win() {
            self.state.wins_today += 1;
            self.state.consecutive_losses = 0;
        } else {
            self.state.losses_today += 1;
            self.state.consecutive_losses += 1;

            if self.state.consecutive_losses >= self.config.max_consecutive_losses {
                let until = now + self.config.cooldown();
                self.state.cooldown_until = Some(until);
                tracing::warn!(
                    losses = self.state.consecutive_losses,
                    cooldown_until = %until,
                    "consecutive-loss limit reached, pausing entries"
                );
            }
        }

        self.update_drawdown();
        self.check_daily_loss();
    }

    /// Refreshes the open-position mark so the daily-loss check sees
    /// unrealized losses too.
    pub fn update_mark(&mut self, unrealized_pnl: f64) {
        self.state.open_mark = unrealized_pnl;
        self.update_drawdown();
        self.check_daily_loss();
    }

    fn check_daily_loss(&mut self) {
        if !self.state.daily_loss_triggered
            && self.state.session_pnl() <= -self.config.max_daily_loss
        {
            self.state.daily_loss_triggered = true;
            tracing::error!(
                session_pnl = self.state.session_pnl(),
                limit = -self.config.max_daily_loss,
                "daily loss limit reached, entries suppressed for the session"
            );
        }
    }

    fn update_drawdown(&mut self) {
        let pnl = self.state.session_pnl();
        if pnl > self.state.peak_session_pnl {
            self.state.peak_session_pnl = pnl;
        }
        let drawdown = self.state.peak_session_pnl - pnl;
        if drawdown > self.state.max_drawdown_today {
            self.state.max_drawdown_today = drawdown;
        }
    }

    /// True when the open position has been held past the duration cap.
    pub fn check_duration(&self, now: DateTime<Utc>) -> bool {
        match self.state.open_position_entry_time {
            Some(entry) => now - entry >= self.config.max_position_duration(),
            None => false,
        }
    }

    pub fn position_opened(&mut self, entry_time: DateTime<Utc>) {
        self.state.open_position_entry_time = Some(entry_time);
    }

    pub fn position_closed(&mut self) {
        self.state.open_position_entry_time = None;
        self.state.open_mark = 0.0;
    }

    pub fn halt(&mut self, reason: HaltReason) {
        tracing::error!(reason = reason.as_str(), "risk halt");
        self.state.halted = Some(reason);
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted.is_some()
    }

    /// Rolls the session over. Zeroes counters, clears cooldown and halts.
    /// The open-position entry time survives: a position held across the
    /// boundary is still subject to its duration cap.
    pub fn reset_daily(&mut self, session_date: NaiveDate) {
        let entry_time = self.state.open_position_entry_time;
        self.state = RiskState::new(session_date);
        self.state.open_position_entry_time = entry_time;
    }

    /// Reinstates session state from a snapshot at restart.
    pub fn restore(&mut self, state: RiskState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::{CloseReason, Side};

    fn config() -> RiskConfig {
        RiskConfig {
            max_daily_loss: 500.0,
            max_consecutive_losses: 3,
            cooldown_minutes: 30,
            max_daily_trades: 20,
            max_position_duration_minutes: 120,
            stop_loss_amount: 200.0,
            take_profit_amount: 300.0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap()
    }

    fn gate() -> RiskGate {
        RiskGate::new(config(), now().date_naive()).unwrap()
    }

    fn trade(pnl: f64) -> Trade {
        Trade {
            open_time: now(),
            close_time: now() + Duration::minutes(30),
            side: Side::Long,
            size: 1,
            entry_price: 5000.0,
            exit_price: 5000.0 + pnl / 5.0,
            realized_pnl: pnl,
            z_on_entry: -2.1,
            z_on_exit: 0.2,
            close_reason: CloseReason::ZExit,
        }
    }

    #[test]
    fn clean_state_allows() {
        let mut gate = gate();
        assert_eq!(gate.can_trade(now()), Decision::Allow);
    }

    #[test]
    fn consecutive_losses_deny_until_cooldown_lapses() {
        let mut gate = gate();
        for _ in 0..3 {
            gate.record(&trade(-50.0), now());
        }
        assert_eq!(
            gate.can_trade(now() + Duration::minutes(10)),
            Decision::Deny(DenyReason::ConsecutiveLosses)
        );
        // One minute past the 30-minute cooldown: allowed again, streak reset.
        assert_eq!(gate.can_trade(now() + Duration::minutes(31)), Decision::Allow);
        assert_eq!(gate.state().consecutive_losses, 0);
    }

    #[test]
    fn one_win_resets_the_streak() {
        let mut gate = gate();
        gate.record(&trade(-50.0), now());
        gate.record(&trade(-50.0), now());
        gate.record(&trade(25.0), now());
        assert_eq!(gate.state().consecutive_losses, 0);
        gate.record(&trade(-50.0), now());
        assert_eq!(gate.state().consecutive_losses, 1);
        assert_eq!(gate.can_trade(now()), Decision::Allow);
    }

    #[test]
    fn daily_loss_denies_for_the_rest_of_the_session() {
        let mut gate = gate();
        gate.record(&trade(-200.0), now());
        gate.record(&trade(-200.0), now());
        assert_eq!(gate.can_trade(now()), Decision::Allow);

        gate.record(&trade(-200.0), now());
        assert_eq!(
            gate.can_trade(now()),
            Decision::Deny(DenyReason::DailyLoss)
        );

        // The halt is latched: a win pulling pnl back to -400 does not
        // reopen the session.
        gate.record(&trade(200.0), now());
        assert_eq!(
            gate.can_trade(now()),
            Decision::Deny(DenyReason::DailyLoss)
        );
    }

    #[test]
    fn unrealized_losses_count_toward_the_daily_limit() {
        let mut gate = gate();
        gate.record(&trade(-300.0), now());
        assert_eq!(gate.can_trade(now()), Decision::Allow);
        gate.update_mark(-250.0);
        assert_eq!(
            gate.can_trade(now()),
            Decision::Deny(DenyReason::DailyLoss)
        );
    }

    #[test]
    fn trade_cap_denies_after_limit() {
        let mut gate = gate();
        for _ in 0..20 {
            gate.record(&trade(10.0), now());
        }
        assert_eq!(
            gate.can_trade(now()),
            Decision::Deny(DenyReason::DailyTradeCap)
        );
    }

    #[test]
    fn external_halt_outranks_everything() {
        let mut gate = gate();
        gate.record(&trade(-600.0), now());
        gate.halt(HaltReason::BrokerTimeout);
        assert_eq!(
            gate.can_trade(now()),
            Decision::Deny(DenyReason::Halted(HaltReason::BrokerTimeout))
        );
    }

    #[test]
    fn reset_daily_restores_allow_and_zeroes_counters() {
        let mut gate = gate();
        for _ in 0..3 {
            gate.record(&trade(-200.0), now());
        }
        gate.halt(HaltReason::Manual);
        gate.reset_daily(now().date_naive().succ_opt().unwrap());

        let state = gate.state();
        assert_eq!(state.realized_pnl, 0.0);
        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(state.trades_today, 0);
        assert!(state.cooldown_until.is_none());
        assert!(state.halted.is_none());
        assert_eq!(gate.can_trade(now()), Decision::Allow);
    }

    #[test]
    fn duration_cap_fires_only_past_the_limit() {
        let mut gate = gate();
        assert!(!gate.check_duration(now()));
        gate.position_opened(now());
        assert!(!gate.check_duration(now() + Duration::minutes(119)));
        assert!(gate.check_duration(now() + Duration::minutes(120)));
        gate.position_closed();
        assert!(!gate.check_duration(now() + Duration::minutes(240)));
    }

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        let mut gate = gate();
        gate.record(&trade(100.0), now());
        gate.record(&trade(-150.0), now());
        gate.record(&trade(30.0), now());
        assert_eq!(gate.state().max_drawdown_today, 150.0);
    }
}
