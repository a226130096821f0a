use chrono::{Duration, TimeZone, Utc};
use core_types::{Bar, CloseReason, DailySummary, Side, Signal, SignalKind, Trade};
use store::{connect, connect_in_memory, SnapshotRecord, Store};

fn bar(minute: i64, close: f64) -> Bar {
    Bar {
        timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap() + Duration::minutes(minute),
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 250,
    }
}

fn trade(pnl: f64, minute: i64) -> Trade {
    let open = Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap() + Duration::minutes(minute);
    Trade {
        open_time: open,
        close_time: open + Duration::minutes(25),
        side: Side::Long,
        size: 1,
        entry_price: 5000.0,
        exit_price: 5000.0 + pnl / 5.0,
        realized_pnl: pnl,
        z_on_entry: -2.3,
        z_on_exit: 0.1,
        close_reason: CloseReason::ZExit,
    }
}

async fn memory_store() -> Store {
    let pool = connect_in_memory().await.unwrap();
    let store = Store::new(pool);
    store.init().await.unwrap();
    store
}

#[tokio::test]
async fn bars_round_trip_in_order_and_deduplicate() {
    let store = memory_store().await;
    let bars = vec![bar(0, 5000.0), bar(5, 5001.0), bar(10, 4999.5)];
    store.save_bars("MES", &bars).await.unwrap();
    // Saving the same bars again must be a no-op.
    store.save_bars("MES", &bars).await.unwrap();

    let from = bars[0].timestamp;
    let to = bars[2].timestamp;
    let loaded = store.bars_in_range("MES", from, to).await.unwrap();
    assert_eq!(loaded, bars);

    let tail = store.last_bars("MES", 2).await.unwrap();
    assert_eq!(tail, bars[1..]);
}

#[tokio::test]
async fn trades_round_trip_with_side_and_reason() {
    let store = memory_store().await;
    let mut short = trade(-40.0, 0);
    short.side = Side::Short;
    short.close_reason = CloseReason::StopLoss;
    store.append_trade("MES", &short).await.unwrap();
    store.append_trade("MES", &trade(35.0, 30)).await.unwrap();

    let recent = store.recent_trades(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    // Newest first.
    assert_eq!(recent[0].realized_pnl, 35.0);
    assert_eq!(recent[1].side, Side::Short);
    assert_eq!(recent[1].close_reason, CloseReason::StopLoss);

    let ranged = store
        .trades_in_range(short.open_time, short.close_time + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(ranged.len(), 2);
}

#[tokio::test]
async fn signals_keep_suppression_reason() {
    let store = memory_store().await;
    let signal = Signal {
        kind: SignalKind::EnterLong,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        price: 4990.0,
        zscore: -2.4,
        volume: 300,
    };
    store
        .append_signal("MES", &signal, Some("DAILY_LOSS"))
        .await
        .unwrap();

    let rows = store
        .signals_in_range(signal.timestamp, signal.timestamp)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, signal);
    assert_eq!(rows[0].1.as_deref(), Some("DAILY_LOSS"));
}

#[tokio::test]
async fn latest_snapshot_is_scoped_by_fingerprint() {
    let store = memory_store().await;
    let at = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();

    for (i, fingerprint) in [("a", "cfg-1"), ("b", "cfg-1"), ("c", "cfg-2")] {
        store
            .append_snapshot(&SnapshotRecord {
                created_at: at,
                last_bar_ts: at,
                config_fingerprint: fingerprint.to_string(),
                window_hash: format!("hash-{i}"),
                payload: format!("{{\"marker\":\"{i}\"}}"),
            })
            .await
            .unwrap();
    }

    let latest = store.latest_snapshot("cfg-1").await.unwrap().unwrap();
    assert_eq!(latest.window_hash, "hash-b");

    let any = store.latest_snapshot_any().await.unwrap().unwrap();
    assert_eq!(any.config_fingerprint, "cfg-2");

    assert!(store.latest_snapshot("cfg-3").await.unwrap().is_none());
}

#[tokio::test]
async fn daily_summary_upsert_replaces() {
    let store = memory_store().await;
    let date = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap().date_naive();

    let mut summary = DailySummary {
        date,
        trades: 3,
        wins: 1,
        losses: 2,
        pnl: -120.0,
        max_drawdown: 180.0,
    };
    store.upsert_daily_summary(&summary).await.unwrap();

    summary.trades = 4;
    summary.pnl = -90.0;
    store.upsert_daily_summary(&summary).await.unwrap();

    let loaded = store.daily_summary(date).await.unwrap().unwrap();
    assert_eq!(loaded, summary);

    let recent = store.recent_daily_summaries(5).await.unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meridian.db");
    let path = path.to_str().unwrap();

    {
        let pool = connect(path).await.unwrap();
        let store = Store::new(pool.clone());
        store.init().await.unwrap();
        store.append_trade("MES", &trade(25.0, 0)).await.unwrap();
        pool.close().await;
    }

    let pool = connect(path).await.unwrap();
    let store = Store::new(pool);
    store.init().await.unwrap();
    let trades = store.recent_trades(10).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].realized_pnl, 25.0);
}
