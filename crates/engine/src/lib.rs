//! # Meridian Engine Crate
//!
//! The per-instrument trading state machine. One logical task owns one
//! engine; the engine owns its signal generator, ledger, and risk gate, and
//! holds handles to the broker, the store, and the trading calendar.
//!
//! ## Architectural Principles
//!
//! - **Explicit state machine:** `Idle -> Entering -> Open -> Exiting ->
//!   Idle`, with the transient states resolved inside a single bar by
//!   awaiting the broker fill. Broker events are inputs to the machine,
//!   never direct mutators of ledger or risk state.
//! - **Gate before intent:** the risk gate is consulted before any order
//!   leaves the engine; a denial suppresses the intent and is recorded, not
//!   raised.
//! - **Durable before acknowledged:** every append for a bar commits before
//!   the engine moves to the next bar; a store failure stops consumption.

pub mod calendar;
pub mod error;
pub mod reconciler;
pub mod snapshot;

pub use calendar::{AlwaysOpen, FuturesCalendar, TradingCalendar};
pub use error::EngineError;
pub use reconciler::{reconcile, ReconcileOutcome};
pub use snapshot::{window_hash, EngineSnapshot};

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, Utc};
use configuration::{Config, StopTakeTieBreak};
use core_types::{
    Bar, CloseReason, DailySummary, Position, PositionView, Side, Signal, SignalKind,
};
use events::EngineEvent;
use execution::{Broker, Fill, Ledger, OrderRequest, OrderType};
use risk::{Decision, HaltReason, RiskGate};
use store::{SnapshotRecord, Store};
use strategies::SignalGenerator;
use tokio::sync::{broadcast, mpsc};

/// Stable states are `Idle` and `Open`; the transient states exist only
/// while a fill round trip is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Entering { side: Side },
    Open { side: Side },
    Exiting { side: Side },
}

pub struct Engine {
    config: Config,
    fingerprint: String,
    symbol: String,

    signal_gen: SignalGenerator,
    ledger: Ledger,
    risk: RiskGate,

    broker: Arc<dyn Broker>,
    store: Store,
    calendar: Box<dyn TradingCalendar>,
    event_tx: broadcast::Sender<EngineEvent>,

    state: EngineState,
    last_processed_bar_ts: Option<DateTime<Utc>>,
}

impl Engine {
    pub fn new(
        config: Config,
        broker: Arc<dyn Broker>,
        store: Store,
        calendar: Box<dyn TradingCalendar>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let fingerprint = config.fingerprint();
        let symbol = config.instrument.symbol.clone();
        let signal_gen = SignalGenerator::new(config.strategy.clone())?;
        let ledger = Ledger::new(config.instrument.multiplier);
        // The session date corrects itself on the first processed bar.
        let risk = RiskGate::new(config.risk.clone(), NaiveDate::default())?;

        Ok(Self {
            config,
            fingerprint,
            symbol,
            signal_gen,
            ledger,
            risk,
            broker,
            store,
            calendar,
            event_tx,
            state: EngineState::Idle,
            last_processed_bar_ts: None,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.ledger.position()
    }

    pub fn risk_state(&self) -> &risk::RiskState {
        self.risk.state()
    }

    pub fn last_processed_bar_ts(&self) -> Option<DateTime<Utc>> {
        self.last_processed_bar_ts
    }

    pub fn config_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn emit(&self, event: EngineEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    /// Seeds the rolling window from reference bars without evaluating any
    /// signal or touching risk state. Used by replay drivers whose fold
    /// layout provides preceding history.
    pub fn warm(&mut self, bars: &[Bar]) -> Result<(), EngineError> {
        if bars.is_empty() {
            return Ok(());
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.signal_gen.seed(&closes)?;
        self.last_processed_bar_ts = bars.last().map(|b| b.timestamp);
        Ok(())
    }

    // ---- per-bar procedure -----------------------------------------------

    /// Processes one bar through the full pipeline: validation, session
    /// roll, statistics, protective exits, the signal rules, the risk gate,
    /// order submission, and persistence.
    pub async fn on_bar(&mut self, bar: &Bar) -> Result<(), EngineError> {
        if let Err(e) = bar.validate() {
            tracing::warn!(error = %e, "rejecting malformed bar");
            return Ok(());
        }
        if let Some(last) = self.last_processed_bar_ts {
            if bar.timestamp <= last {
                tracing::warn!(
                    bar_ts = %bar.timestamp,
                    last_ts = %last,
                    "rejecting out-of-order bar"
                );
                return Ok(());
            }
        }
        self.last_processed_bar_ts = Some(bar.timestamp);

        // Record the bar first: restart rebuilds its window from these, and
        // a synthesized close marks against the newest one.
        self.store.save_bar(&self.symbol, bar).await?;

        // Session rollover is driven by the calendar, not wall-clock dates.
        let session = self.calendar.session_date(bar.timestamp);
        if session != self.risk.session_date() {
            self.roll_session(session).await?;
        }

        // The rolling window is updated on every bar, market open or not, so
        // the statistics stay calibrated across gaps.
        let signal = self.signal_gen.on_bar(bar)?;
        if !signal.zscore.is_finite() {
            // Fail loudly rather than trade on garbage.
            return Err(EngineError::Position(format!(
                "non-finite z-score at {}",
                bar.timestamp
            )));
        }

        if self.ledger.position().is_some() {
            self.risk.update_mark(self.ledger.mark(bar.close));
        }

        let market_open = self.calendar.is_open(bar.timestamp);
        let mut suppressed: Option<&'static str> = None;
        let mut closed_this_bar = false;

        if market_open {
            closed_this_bar = self.enforce_protective_exits(bar, signal.zscore).await?;

            if !closed_this_bar {
                if let EngineState::Open { side } = self.state {
                    if self.risk.check_duration(bar.timestamp) {
                        tracing::warn!("position exceeded duration cap, forcing flat");
                        closed_this_bar = self
                            .close_position(
                                side,
                                OrderType::Market,
                                None,
                                CloseReason::DurationCap,
                                signal.zscore,
                            )
                            .await?;
                    }
                }
            }

            suppressed = self.act_on_signal(bar, &signal, closed_this_bar).await?;
        } else {
            tracing::debug!(ts = %bar.timestamp, "market closed, no orders");
        }

        self.store
            .append_signal(&self.symbol, &signal, suppressed)
            .await?;

        Ok(())
    }

    /// Checks the open position's stop and take levels against this bar's
    /// range. When both are inside the range the configured tie-break
    /// decides; the default is stop-first, the conservative reading.
    async fn enforce_protective_exits(
        &mut self,
        bar: &Bar,
        zscore: f64,
    ) -> Result<bool, EngineError> {
        let EngineState::Open { side } = self.state else {
            return Ok(false);
        };
        let Some(position) = self.ledger.position() else {
            return Ok(false);
        };

        let (stop, take) = (position.stop_price, position.take_price);
        let stop_hit = stop.is_some_and(|level| match side {
            Side::Long => bar.low <= level,
            Side::Short => bar.high >= level,
        });
        let take_hit = take.is_some_and(|level| match side {
            Side::Long => bar.high >= level,
            Side::Short => bar.low <= level,
        });

        let (reason, level) = match (stop_hit, take_hit) {
            (false, false) => return Ok(false),
            (true, false) => (CloseReason::StopLoss, stop.unwrap()),
            (false, true) => (CloseReason::TakeProfit, take.unwrap()),
            (true, true) => match self.config.backtest.stop_take_tiebreak {
                StopTakeTieBreak::StopFirst => (CloseReason::StopLoss, stop.unwrap()),
                StopTakeTieBreak::TakeFirst => (CloseReason::TakeProfit, take.unwrap()),
            },
        };

        self.close_position(side, OrderType::Limit, Some(level), reason, zscore)
            .await
    }

    /// Routes the signal through the gate and the state machine. Returns the
    /// suppression reason when the gate denied an entry.
    async fn act_on_signal(
        &mut self,
        bar: &Bar,
        signal: &Signal,
        closed_this_bar: bool,
    ) -> Result<Option<&'static str>, EngineError> {
        match (signal.kind, self.state) {
            (SignalKind::EnterLong, EngineState::Idle)
            | (SignalKind::EnterShort, EngineState::Idle) => {
                let decision = self.risk.can_trade(bar.timestamp);
                if let Decision::Deny(reason) = decision {
                    tracing::info!(reason = reason.as_str(), "entry suppressed by risk gate");
                    self.emit(EngineEvent::SignalSuppressed {
                        kind: signal.kind,
                        reason: reason.as_str().to_string(),
                        time: bar.timestamp,
                    });
                    return Ok(Some(reason.as_str()));
                }
                let side = if signal.kind == SignalKind::EnterLong {
                    Side::Long
                } else {
                    Side::Short
                };
                self.open_position(side, signal).await?;
                Ok(None)
            }
            (SignalKind::ExitLong, EngineState::Open { side: Side::Long }) => {
                if !closed_this_bar {
                    self.close_position(
                        Side::Long,
                        OrderType::Market,
                        None,
                        CloseReason::ZExit,
                        signal.zscore,
                    )
                    .await?;
                }
                Ok(None)
            }
            (SignalKind::ExitShort, EngineState::Open { side: Side::Short }) => {
                if !closed_this_bar {
                    self.close_position(
                        Side::Short,
                        OrderType::Market,
                        None,
                        CloseReason::ZExit,
                        signal.zscore,
                    )
                    .await?;
                }
                Ok(None)
            }
            // A protective exit earlier in the bar superseded this signal,
            // or the signal does not apply to the current state.
            _ => Ok(None),
        }
    }

    // ---- transitions -----------------------------------------------------

    async fn open_position(&mut self, side: Side, signal: &Signal) -> Result<(), EngineError> {
        let size = self.config.execution.order_size;
        let request = OrderRequest::market(&self.symbol, side.opening_order(), size);
        self.state = EngineState::Entering { side };

        let Some(fill) = self.submit_and_await(&request).await? else {
            // Entry fill timed out: intent cancelled, session halted.
            self.state = EngineState::Idle;
            return Ok(());
        };

        let per_position = self.config.instrument.multiplier * size as f64;
        let stop_offset = self.config.risk.stop_loss_amount / per_position;
        let take_offset = self.config.risk.take_profit_amount / per_position;
        let (stop_price, take_price) = match side {
            Side::Long => (fill.price - stop_offset, fill.price + take_offset),
            Side::Short => (fill.price + stop_offset, fill.price - take_offset),
        };

        let position = Position {
            side,
            size,
            entry_time: fill.time,
            entry_price: fill.price,
            entry_zscore: signal.zscore,
            stop_price: Some(stop_price),
            take_price: Some(take_price),
            max_duration: self.config.risk.max_position_duration(),
        };
        self.ledger
            .open(position)
            .map_err(|e| EngineError::Position(e.to_string()))?;
        self.risk.position_opened(fill.time);
        self.signal_gen.set_position(PositionView::from(side));
        self.state = EngineState::Open { side };

        tracing::info!(
            side = %side,
            size,
            price = fill.price,
            zscore = signal.zscore,
            "position opened"
        );
        self.emit(EngineEvent::TradeOpened {
            symbol: self.symbol.clone(),
            side,
            size,
            price: fill.price,
            zscore: signal.zscore,
            time: fill.time,
        });
        self.persist_snapshot(fill.time).await?;
        Ok(())
    }

    /// Submits the flattening order and books the close. Returns false when
    /// the fill timed out and the position is still open.
    async fn close_position(
        &mut self,
        side: Side,
        order_type: OrderType,
        level: Option<f64>,
        reason: CloseReason,
        exit_zscore: f64,
    ) -> Result<bool, EngineError> {
        let size = self
            .ledger
            .position()
            .map(|p| p.size)
            .ok_or_else(|| EngineError::Position("close requested with no position".into()))?;

        let request = match order_type {
            OrderType::Market => OrderRequest::market(&self.symbol, side.closing_order(), size),
            OrderType::Limit => OrderRequest::limit(
                &self.symbol,
                side.closing_order(),
                size,
                level.ok_or(execution::ExecutionError::MissingLimitPrice)?,
            ),
        };

        self.state = EngineState::Exiting { side };
        let Some(fill) = self.submit_and_await(&request).await? else {
            // Exit fill timed out: the position is still real, show it.
            self.state = EngineState::Open { side };
            return Ok(false);
        };

        self.book_close(&fill, exit_zscore, reason).await?;
        Ok(true)
    }

    async fn book_close(
        &mut self,
        fill: &Fill,
        exit_zscore: f64,
        reason: CloseReason,
    ) -> Result<(), EngineError> {
        let trade = self
            .ledger
            .close(fill.price, fill.time, exit_zscore, reason)
            .map_err(|e| EngineError::Position(e.to_string()))?;

        self.risk.record(&trade, fill.time);
        self.risk.position_closed();
        self.signal_gen.set_position(PositionView::Flat);
        self.state = EngineState::Idle;

        tracing::info!(
            pnl = trade.realized_pnl,
            reason = reason.as_str(),
            "position closed"
        );
        self.store.append_trade(&self.symbol, &trade).await?;
        self.emit(EngineEvent::TradeClosed {
            symbol: self.symbol.clone(),
            trade,
        });
        self.persist_snapshot(fill.time).await?;
        Ok(())
    }

    /// Submits an order and awaits its fill under the configured timeout.
    /// `Ok(None)` means the fill timed out; the session is halted and the
    /// intent cancelled, and the caller unwinds its transient state.
    async fn submit_and_await(
        &mut self,
        request: &OrderRequest,
    ) -> Result<Option<Fill>, EngineError> {
        let mut placed = Err(execution::ExecutionError::NotConnected);
        for attempt in 0..3u32 {
            placed = self.broker.place_order(request).await;
            if placed.is_ok() {
                break;
            }
            tracing::warn!(attempt, error = %placed.as_ref().unwrap_err(), "order submission failed");
            tokio::time::sleep(StdDuration::from_millis(250 << attempt)).await;
        }
        let intent_id = match placed {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "order submission exhausted retries; halting");
                self.risk.halt(HaltReason::BrokerUnavailable);
                self.emit(EngineEvent::BreakerTripped {
                    reason: HaltReason::BrokerUnavailable.as_str().to_string(),
                    time: Utc::now(),
                });
                return Ok(None);
            }
        };

        let timeout = StdDuration::from_secs(self.config.execution.broker_fill_timeout_secs);
        match tokio::time::timeout(timeout, self.broker.await_fill(intent_id)).await {
            Ok(Ok(fill)) => Ok(Some(fill)),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "broker failed while filling; halting");
                self.risk.halt(HaltReason::BrokerUnavailable);
                self.emit(EngineEvent::BreakerTripped {
                    reason: HaltReason::BrokerUnavailable.as_str().to_string(),
                    time: Utc::now(),
                });
                Ok(None)
            }
            Err(_) => {
                tracing::error!(intent = %intent_id, "fill timed out; halting");
                let _ = self.broker.cancel(intent_id).await;
                self.risk.halt(HaltReason::BrokerTimeout);
                self.emit(EngineEvent::BreakerTripped {
                    reason: HaltReason::BrokerTimeout.as_str().to_string(),
                    time: Utc::now(),
                });
                Ok(None)
            }
        }
    }

    // ---- sessions --------------------------------------------------------

    /// Writes the finished session's summary and resets the risk gate.
    async fn roll_session(&mut self, new_session: NaiveDate) -> Result<(), EngineError> {
        let state = self.risk.state();
        if state.trades_today > 0 {
            let summary = DailySummary {
                date: state.session_date,
                trades: state.trades_today,
                wins: state.wins_today,
                losses: state.losses_today,
                pnl: state.realized_pnl,
                max_drawdown: state.max_drawdown_today,
            };
            self.store.upsert_daily_summary(&summary).await?;
            self.emit(EngineEvent::SessionClosed(summary));
        }
        tracing::info!(from = %self.risk.session_date(), to = %new_session, "session rollover");
        self.risk.reset_daily(new_session);
        Ok(())
    }

    // ---- persistence -----------------------------------------------------

    /// The snapshot the engine would persist right now, paired with its
    /// store record. Public so restart tests can compare state for identity.
    pub fn build_snapshot(
        &self,
        as_of: DateTime<Utc>,
    ) -> Option<(EngineSnapshot, SnapshotRecord)> {
        let last_bar_ts = self.last_processed_bar_ts.unwrap_or(as_of);
        let window = self.signal_gen.stats().contents();
        let snapshot = EngineSnapshot {
            last_bar_ts,
            position: self.ledger.position().cloned(),
            risk: self.risk.state().clone(),
            window,
        };
        let payload = serde_json::to_string(&snapshot).ok()?;
        let record = SnapshotRecord {
            created_at: as_of,
            last_bar_ts,
            config_fingerprint: self.fingerprint.clone(),
            window_hash: window_hash(&self.fingerprint, &snapshot.window),
            payload,
        };
        Some((snapshot, record))
    }

    async fn persist_snapshot(&self, as_of: DateTime<Utc>) -> Result<(), EngineError> {
        if let Some((_, record)) = self.build_snapshot(as_of) {
            self.store.append_snapshot(&record).await?;
        }
        Ok(())
    }

    // ---- restart ---------------------------------------------------------

    /// Loads the latest compatible snapshot, rebuilds the rolling window,
    /// and reconciles against the broker's positions. Broker truth wins.
    pub async fn restore(&mut self) -> Result<(), EngineError> {
        let record = self.store.latest_snapshot(&self.fingerprint).await?;

        match record {
            None => {
                if let Some(stale) = self.store.latest_snapshot_any().await? {
                    tracing::warn!(
                        snapshot_fingerprint = %stale.config_fingerprint,
                        "configuration changed since last snapshot; starting cold"
                    );
                }
                // Warm the window from recorded history when we have it.
                let bars = self
                    .store
                    .last_bars(&self.symbol, self.config.strategy.lookback as u32)
                    .await?;
                if !bars.is_empty() {
                    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                    self.signal_gen.seed(&closes)?;
                    self.last_processed_bar_ts = bars.last().map(|b| b.timestamp);
                    tracing::info!(bars = closes.len(), "rolling window rebuilt from stored bars");
                }
            }
            Some(record) => {
                let snapshot: EngineSnapshot = serde_json::from_str(&record.payload)?;
                if window_hash(&self.fingerprint, &snapshot.window) != record.window_hash {
                    return Err(EngineError::SnapshotMismatch);
                }

                self.signal_gen.seed(&snapshot.window)?;
                self.last_processed_bar_ts = Some(snapshot.last_bar_ts);
                self.risk.restore(snapshot.risk.clone());
                self.ledger.restore(snapshot.position.clone());
                if let Some(position) = &snapshot.position {
                    self.signal_gen.set_position(PositionView::from(position.side));
                    self.state = EngineState::Open {
                        side: position.side,
                    };
                }
                tracing::info!(last_bar = %snapshot.last_bar_ts, "snapshot restored");
            }
        }

        self.reconcile_with_broker().await
    }

    async fn reconcile_with_broker(&mut self) -> Result<(), EngineError> {
        let broker_positions = match self.broker.positions().await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!(error = %e, "broker unavailable for reconciliation");
                return Ok(());
            }
        };

        match reconcile(self.ledger.position(), &broker_positions, &self.symbol) {
            ReconcileOutcome::Resume => Ok(()),
            ReconcileOutcome::SynthesizeClose => self.synthesize_close().await,
            ReconcileOutcome::FlattenUnknown(remote) => self.flatten_unknown(remote).await,
            ReconcileOutcome::SynthesizeCloseAndFlatten(remote) => {
                self.synthesize_close().await?;
                self.flatten_unknown(remote).await
            }
        }
    }

    /// The broker is flat but the snapshot was open: accept broker truth and
    /// book a close at the last known mark (the newest window price).
    async fn synthesize_close(&mut self) -> Result<(), EngineError> {
        let last_recorded = self
            .store
            .last_bars(&self.symbol, 1)
            .await?
            .last()
            .map(|b| b.close);
        let mark = last_recorded
            .or_else(|| self.signal_gen.stats().contents().last().copied())
            .or_else(|| self.ledger.position().map(|p| p.entry_price))
            .ok_or_else(|| EngineError::Position("no mark for synthesized close".into()))?;
        let now = self.last_processed_bar_ts.unwrap_or_else(Utc::now);

        tracing::warn!(
            mark,
            "broker flat but snapshot open; booking synthesized close"
        );
        let fill = Fill {
            intent_id: execution::IntentId::new(),
            price: mark,
            time: now,
            size: self.ledger.position().map(|p| p.size).unwrap_or(0),
        };
        self.book_close(&fill, 0.0, CloseReason::ForceFlatten).await
    }

    /// The broker reports a position the snapshot knows nothing about.
    /// Flatten it without inventing a ledger entry for it.
    async fn flatten_unknown(
        &mut self,
        remote: execution::BrokerPosition,
    ) -> Result<(), EngineError> {
        tracing::error!(
            side = %remote.side,
            size = remote.size,
            "broker holds an untracked position; flattening it"
        );
        self.emit(EngineEvent::BreakerTripped {
            reason: "UNTRACKED_POSITION_FLATTENED".to_string(),
            time: Utc::now(),
        });
        let request =
            OrderRequest::market(&self.symbol, remote.side.closing_order(), remote.size);
        let _ = self.submit_and_await(&request).await?;
        Ok(())
    }

    // ---- run loop --------------------------------------------------------

    /// Consumes bars until the channel closes, then shuts down cleanly.
    pub async fn run(
        &mut self,
        mut bar_rx: mpsc::Receiver<Bar>,
        mode: &str,
    ) -> Result<(), EngineError> {
        self.emit(EngineEvent::Started {
            symbol: self.symbol.clone(),
            mode: mode.to_string(),
            time: Utc::now(),
        });
        tracing::info!(symbol = %self.symbol, mode, "engine running");

        while let Some(bar) = bar_rx.recv().await {
            self.on_bar(&bar).await?;
        }

        tracing::info!("bar stream ended");
        self.shutdown("bar stream ended").await
    }

    /// Flattens any open position, persists a final snapshot, and announces
    /// the stop. A flatten that cannot confirm within the shutdown timeout
    /// escalates to a halt so the operator knows exposure may remain.
    pub async fn shutdown(&mut self, reason: &str) -> Result<(), EngineError> {
        if let EngineState::Open { side } = self.state {
            let size = self.ledger.position().map(|p| p.size).unwrap_or(0);
            let request = OrderRequest::market(&self.symbol, side.closing_order(), size);
            let timeout =
                StdDuration::from_secs(self.config.execution.shutdown_flatten_timeout_secs);

            self.state = EngineState::Exiting { side };
            let intent = self.broker.place_order(&request).await;
            match intent {
                Ok(id) => match tokio::time::timeout(timeout, self.broker.await_fill(id)).await {
                    Ok(Ok(fill)) => {
                        self.book_close(&fill, 0.0, CloseReason::ForceFlatten).await?;
                    }
                    _ => {
                        tracing::error!("shutdown flatten unconfirmed; halting with open exposure");
                        self.state = EngineState::Open { side };
                        self.risk.halt(HaltReason::ForceFlatten);
                        self.emit(EngineEvent::BreakerTripped {
                            reason: HaltReason::ForceFlatten.as_str().to_string(),
                            time: Utc::now(),
                        });
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "shutdown flatten could not be submitted");
                    self.state = EngineState::Open { side };
                    self.risk.halt(HaltReason::ForceFlatten);
                }
            }
        }

        self.persist_snapshot(Utc::now()).await?;
        self.emit(EngineEvent::Stopped {
            reason: reason.to_string(),
            time: Utc::now(),
        });
        Ok(())
    }
}
