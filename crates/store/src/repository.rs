use chrono::{DateTime, NaiveDate, Utc};
use core_types::{Bar, CloseReason, DailySummary, Side, Signal, SignalKind, Trade};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::StoreError;

/// A persisted engine snapshot row. The payload is the engine's own JSON;
/// the store indexes it by fingerprint and keeps the newest per fingerprint
/// retrievable.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub created_at: DateTime<Utc>,
    pub last_bar_ts: DateTime<Utc>,
    pub config_fingerprint: String,
    pub window_hash: String,
    pub payload: String,
}

/// The high-level, application-specific interface to the embedded store.
/// Encapsulates all SQL and row mapping.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the schema. Idempotent; called once at startup.
    pub async fn init(&self) -> Result<(), StoreError> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS bars (
                symbol      TEXT NOT NULL,
                timestamp   TEXT NOT NULL,
                open        REAL NOT NULL,
                high        REAL NOT NULL,
                low         REAL NOT NULL,
                close       REAL NOT NULL,
                volume      INTEGER NOT NULL,
                PRIMARY KEY (symbol, timestamp)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol        TEXT NOT NULL,
                open_time     TEXT NOT NULL,
                close_time    TEXT NOT NULL,
                side          TEXT NOT NULL,
                size          INTEGER NOT NULL,
                entry_price   REAL NOT NULL,
                exit_price    REAL NOT NULL,
                realized_pnl  REAL NOT NULL,
                z_entry       REAL NOT NULL,
                z_exit        REAL NOT NULL,
                close_reason  TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol            TEXT NOT NULL,
                time              TEXT NOT NULL,
                kind              TEXT NOT NULL,
                price             REAL NOT NULL,
                zscore            REAL NOT NULL,
                volume            INTEGER NOT NULL,
                suppressed_reason TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at         TEXT NOT NULL,
                last_bar_ts        TEXT NOT NULL,
                config_fingerprint TEXT NOT NULL,
                window_hash        TEXT NOT NULL,
                payload            TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS daily_summaries (
                date         TEXT PRIMARY KEY,
                trades       INTEGER NOT NULL DEFAULT 0,
                wins         INTEGER NOT NULL DEFAULT 0,
                losses       INTEGER NOT NULL DEFAULT 0,
                pnl          REAL NOT NULL DEFAULT 0.0,
                max_drawdown REAL NOT NULL DEFAULT 0.0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS backtest_runs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at    TEXT NOT NULL,
                total_trades  INTEGER NOT NULL,
                total_pnl     REAL NOT NULL,
                win_rate      REAL,
                max_drawdown  REAL NOT NULL,
                profit_factor REAL NOT NULL,
                sharpe_ratio  REAL,
                parameters    TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS walkforward_runs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at   TEXT NOT NULL,
                folds        INTEGER NOT NULL,
                total_trades INTEGER NOT NULL,
                total_pnl    REAL NOT NULL,
                max_drawdown REAL NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS walkforward_folds (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id        INTEGER NOT NULL,
                fold          INTEGER NOT NULL,
                trades        INTEGER NOT NULL,
                pnl           REAL NOT NULL,
                win_rate      REAL,
                profit_factor REAL NOT NULL,
                max_drawdown  REAL NOT NULL,
                FOREIGN KEY (run_id) REFERENCES walkforward_runs (id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_trades_close_time ON trades (close_time)",
            "CREATE INDEX IF NOT EXISTS idx_signals_time ON signals (time)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_fingerprint ON snapshots (config_fingerprint, id)",
        ];
        for statement in ddl {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("store schema ready");
        Ok(())
    }

    // ---- bars ------------------------------------------------------------

    /// Saves one bar. `ON CONFLICT DO NOTHING` keeps replays idempotent.
    pub async fn save_bar(&self, symbol: &str, bar: &Bar) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bars (symbol, timestamp, open, high, low, close, volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (symbol, timestamp) DO NOTHING
            "#,
        )
        .bind(symbol)
        .bind(bar.timestamp)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bulk insert inside one transaction; used by `seed-data`.
    pub async fn save_bars(&self, symbol: &str, bars: &[Bar]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO bars (symbol, timestamp, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (symbol, timestamp) DO NOTHING
                "#,
            )
            .bind(symbol)
            .bind(bar.timestamp)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn bars_in_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, open, high, low, close, volume
            FROM bars
            WHERE symbol = ?1 AND timestamp >= ?2 AND timestamp <= ?3
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| Self::row_to_bar(&row)).collect()
    }

    /// The most recent `n` bars, oldest first. Used to rebuild the rolling
    /// window at restart.
    pub async fn last_bars(&self, symbol: &str, n: u32) -> Result<Vec<Bar>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, open, high, low, close, volume
            FROM bars
            WHERE symbol = ?1
            ORDER BY timestamp DESC
            LIMIT ?2
            "#,
        )
        .bind(symbol)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|row| Self::row_to_bar(&row))
            .collect::<Result<_, _>>()?;
        bars.reverse();
        Ok(bars)
    }

    fn row_to_bar(row: &sqlx::sqlite::SqliteRow) -> Result<Bar, StoreError> {
        Ok(Bar {
            timestamp: row.get("timestamp"),
            open: row.get("open"),
            high: row.get("high"),
            low: row.get("low"),
            close: row.get("close"),
            volume: row.get::<i64, _>("volume") as u64,
        })
    }

    // ---- trades ----------------------------------------------------------

    pub async fn append_trade(&self, symbol: &str, trade: &Trade) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                symbol, open_time, close_time, side, size,
                entry_price, exit_price, realized_pnl, z_entry, z_exit, close_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(symbol)
        .bind(trade.open_time)
        .bind(trade.close_time)
        .bind(trade.side.to_string())
        .bind(trade.size as i64)
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.realized_pnl)
        .bind(trade.z_on_entry)
        .bind(trade.z_on_exit)
        .bind(trade.close_reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT open_time, close_time, side, size, entry_price, exit_price,
                   realized_pnl, z_entry, z_exit, close_reason
            FROM trades
            ORDER BY close_time DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    pub async fn trades_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT open_time, close_time, side, size, entry_price, exit_price,
                   realized_pnl, z_entry, z_exit, close_reason
            FROM trades
            WHERE close_time >= ?1 AND close_time <= ?2
            ORDER BY close_time ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    /// All trades in append order. The backtester reads its result set back
    /// through this.
    pub async fn all_trades(&self) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT open_time, close_time, side, size, entry_price, exit_price,
                   realized_pnl, z_entry, z_exit, close_reason
            FROM trades
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Result<Trade, StoreError> {
        let side = match row.get::<String, _>("side").as_str() {
            "LONG" => Side::Long,
            "SHORT" => Side::Short,
            other => {
                return Err(StoreError::CorruptRecord(format!(
                    "unknown trade side {other}"
                )))
            }
        };
        let reason: CloseReason = row
            .get::<String, _>("close_reason")
            .parse()
            .map_err(|_| StoreError::CorruptRecord("unknown close reason".to_string()))?;

        Ok(Trade {
            open_time: row.get("open_time"),
            close_time: row.get("close_time"),
            side,
            size: row.get::<i64, _>("size") as u32,
            entry_price: row.get("entry_price"),
            exit_price: row.get("exit_price"),
            realized_pnl: row.get("realized_pnl"),
            z_on_entry: row.get("z_entry"),
            z_on_exit: row.get("z_exit"),
            close_reason: reason,
        })
    }

    // ---- signals ---------------------------------------------------------

    pub async fn append_signal(
        &self,
        symbol: &str,
        signal: &Signal,
        suppressed_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO signals (symbol, time, kind, price, zscore, volume, suppressed_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(symbol)
        .bind(signal.timestamp)
        .bind(signal.kind.as_str())
        .bind(signal.price)
        .bind(signal.zscore)
        .bind(signal.volume as i64)
        .bind(suppressed_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Signal rows in a time range, oldest first, as (signal, suppression).
    pub async fn signals_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(Signal, Option<String>)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT time, kind, price, zscore, volume, suppressed_reason
            FROM signals
            WHERE time >= ?1 AND time <= ?2
            ORDER BY time ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: SignalKind = row
                    .get::<String, _>("kind")
                    .parse()
                    .map_err(|_| StoreError::CorruptRecord("unknown signal kind".to_string()))?;
                Ok((
                    Signal {
                        kind,
                        timestamp: row.get("time"),
                        price: row.get("price"),
                        zscore: row.get("zscore"),
                        volume: row.get::<i64, _>("volume") as u64,
                    },
                    row.get::<Option<String>, _>("suppressed_reason"),
                ))
            })
            .collect()
    }

    // ---- snapshots -------------------------------------------------------

    pub async fn append_snapshot(&self, record: &SnapshotRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (created_at, last_bar_ts, config_fingerprint, window_hash, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(record.created_at)
        .bind(record.last_bar_ts)
        .bind(&record.config_fingerprint)
        .bind(&record.window_hash)
        .bind(&record.payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The newest snapshot written under the given configuration.
    pub async fn latest_snapshot(
        &self,
        config_fingerprint: &str,
    ) -> Result<Option<SnapshotRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT created_at, last_bar_ts, config_fingerprint, window_hash, payload
            FROM snapshots
            WHERE config_fingerprint = ?1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(config_fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SnapshotRecord {
            created_at: row.get("created_at"),
            last_bar_ts: row.get("last_bar_ts"),
            config_fingerprint: row.get("config_fingerprint"),
            window_hash: row.get("window_hash"),
            payload: row.get("payload"),
        }))
    }

    /// The newest snapshot regardless of configuration; used only to warn
    /// when a stale snapshot is being ignored.
    pub async fn latest_snapshot_any(&self) -> Result<Option<SnapshotRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT created_at, last_bar_ts, config_fingerprint, window_hash, payload
            FROM snapshots
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SnapshotRecord {
            created_at: row.get("created_at"),
            last_bar_ts: row.get("last_bar_ts"),
            config_fingerprint: row.get("config_fingerprint"),
            window_hash: row.get("window_hash"),
            payload: row.get("payload"),
        }))
    }

    // ---- daily summaries -------------------------------------------------

    pub async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (date, trades, wins, losses, pnl, max_drawdown)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (date) DO UPDATE SET
                trades = excluded.trades,
                wins = excluded.wins,
                losses = excluded.losses,
                pnl = excluded.pnl,
                max_drawdown = excluded.max_drawdown
            "#,
        )
        .bind(summary.date)
        .bind(summary.trades as i64)
        .bind(summary.wins as i64)
        .bind(summary.losses as i64)
        .bind(summary.pnl)
        .bind(summary.max_drawdown)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        let row = sqlx::query(
            "SELECT date, trades, wins, losses, pnl, max_drawdown FROM daily_summaries WHERE date = ?1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Self::row_to_summary(&row)))
    }

    /// Most recent daily summaries, newest first.
    pub async fn recent_daily_summaries(
        &self,
        limit: u32,
    ) -> Result<Vec<DailySummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT date, trades, wins, losses, pnl, max_drawdown
            FROM daily_summaries
            ORDER BY date DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_summary).collect())
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> DailySummary {
        DailySummary {
            date: row.get("date"),
            trades: row.get::<i64, _>("trades") as u32,
            wins: row.get::<i64, _>("wins") as u32,
            losses: row.get::<i64, _>("losses") as u32,
            pnl: row.get("pnl"),
            max_drawdown: row.get("max_drawdown"),
        }
    }

    // ---- run results -----------------------------------------------------

    pub async fn save_backtest_run(
        &self,
        created_at: DateTime<Utc>,
        total_trades: usize,
        total_pnl: f64,
        win_rate: Option<f64>,
        max_drawdown: f64,
        profit_factor: f64,
        sharpe_ratio: Option<f64>,
        parameters: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO backtest_runs (
                created_at, total_trades, total_pnl, win_rate,
                max_drawdown, profit_factor, sharpe_ratio, parameters
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(created_at)
        .bind(total_trades as i64)
        .bind(total_pnl)
        .bind(win_rate)
        .bind(max_drawdown)
        .bind(profit_factor)
        .bind(sharpe_ratio)
        .bind(parameters.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn save_walkforward_run(
        &self,
        created_at: DateTime<Utc>,
        folds: &[WalkForwardFoldRow],
        total_trades: usize,
        total_pnl: f64,
        max_drawdown: f64,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let run = sqlx::query(
            r#"
            INSERT INTO walkforward_runs (created_at, folds, total_trades, total_pnl, max_drawdown)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(created_at)
        .bind(folds.len() as i64)
        .bind(total_trades as i64)
        .bind(total_pnl)
        .bind(max_drawdown)
        .execute(&mut *tx)
        .await?;
        let run_id = run.last_insert_rowid();

        for row in folds {
            sqlx::query(
                r#"
                INSERT INTO walkforward_folds (
                    run_id, fold, trades, pnl, win_rate, profit_factor, max_drawdown
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(run_id)
            .bind(row.fold as i64)
            .bind(row.trades as i64)
            .bind(row.pnl)
            .bind(row.win_rate)
            .bind(row.profit_factor)
            .bind(row.max_drawdown)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(run_id)
    }
}

/// One fold's persisted aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardFoldRow {
    pub fold: usize,
    pub trades: usize,
    pub pnl: f64,
    pub win_rate: Option<f64>,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}
