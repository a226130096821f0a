use core_types::Position;
use execution::BrokerPosition;

/// What start-up reconciliation decided, given the snapshot position and the
/// broker's report. Broker truth wins every disagreement; the engine never
/// infers entry details it does not have.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Snapshot and broker agree (both flat, or same side and size).
    Resume,
    /// Snapshot was open but the broker is flat (or holds something else):
    /// book a synthetic close for the snapshot position at the last known
    /// mark.
    SynthesizeClose,
    /// The broker holds a position the snapshot knows nothing about:
    /// flatten it immediately, record no trade.
    FlattenUnknown(BrokerPosition),
    /// Snapshot open, broker holds a different position: both corrections.
    SynthesizeCloseAndFlatten(BrokerPosition),
}

/// Compares the restored position against the broker's report for the
/// engine's instrument.
pub fn reconcile(snapshot: Option<&Position>, broker: &[BrokerPosition], symbol: &str) -> ReconcileOutcome {
    let broker_pos = broker.iter().find(|p| p.symbol == symbol);

    match (snapshot, broker_pos) {
        (None, None) => ReconcileOutcome::Resume,
        (Some(local), Some(remote)) => {
            if local.side == remote.side && local.size == remote.size {
                ReconcileOutcome::Resume
            } else {
                ReconcileOutcome::SynthesizeCloseAndFlatten(remote.clone())
            }
        }
        (Some(_), None) => ReconcileOutcome::SynthesizeClose,
        (None, Some(remote)) => ReconcileOutcome::FlattenUnknown(remote.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::Side;

    fn position(side: Side, size: u32) -> Position {
        Position {
            side,
            size,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
            entry_price: 5000.0,
            entry_zscore: -2.1,
            stop_price: Some(4960.0),
            take_price: Some(5060.0),
            max_duration: Duration::hours(2),
        }
    }

    fn broker_pos(side: Side, size: u32) -> BrokerPosition {
        BrokerPosition {
            symbol: "MES".to_string(),
            side,
            size,
        }
    }

    #[test]
    fn both_flat_resumes() {
        assert_eq!(reconcile(None, &[], "MES"), ReconcileOutcome::Resume);
    }

    #[test]
    fn matching_position_resumes() {
        let local = position(Side::Long, 1);
        let remote = [broker_pos(Side::Long, 1)];
        assert_eq!(reconcile(Some(&local), &remote, "MES"), ReconcileOutcome::Resume);
    }

    #[test]
    fn broker_flat_synthesizes_close() {
        let local = position(Side::Long, 1);
        assert_eq!(
            reconcile(Some(&local), &[], "MES"),
            ReconcileOutcome::SynthesizeClose
        );
    }

    #[test]
    fn unknown_broker_position_is_flattened() {
        let remote = [broker_pos(Side::Short, 2)];
        assert_eq!(
            reconcile(None, &remote, "MES"),
            ReconcileOutcome::FlattenUnknown(remote[0].clone())
        );
    }

    #[test]
    fn other_symbols_are_ignored() {
        let remote = [BrokerPosition {
            symbol: "MNQ".to_string(),
            side: Side::Long,
            size: 1,
        }];
        assert_eq!(reconcile(None, &remote, "MES"), ReconcileOutcome::Resume);
    }

    #[test]
    fn side_mismatch_corrects_both_ways() {
        let local = position(Side::Long, 1);
        let remote = [broker_pos(Side::Short, 1)];
        assert_eq!(
            reconcile(Some(&local), &remote, "MES"),
            ReconcileOutcome::SynthesizeCloseAndFlatten(remote[0].clone())
        );
    }
}
