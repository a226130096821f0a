use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub instrument: InstrumentConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub backtest: BacktestConfig,
    pub calendar: CalendarConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Content hash over the parameters that change trading behaviour.
    ///
    /// Persisted snapshots carry this value; a snapshot whose fingerprint
    /// does not match the running configuration is refused at startup.
    /// Logging, alerting, and database settings deliberately do not
    /// participate.
    pub fn fingerprint(&self) -> String {
        let relevant = serde_json::json!({
            "instrument": &self.instrument,
            "strategy": &self.strategy,
            "risk": &self.risk,
            "execution": &self.execution,
            "backtest": &self.backtest,
        });
        let mut hasher = Sha256::new();
        hasher.update(relevant.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The traded contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub exchange: String,
    /// Dollar value of one point of price movement per contract.
    pub multiplier: f64,
    pub tick_size: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: "MES".to_string(),
            exchange: "CME".to_string(),
            multiplier: 5.0,
            tick_size: 0.25,
        }
    }
}

/// Mean-reversion strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Rolling window length in bars. Must be at least 2.
    pub lookback: usize,
    /// Entry threshold in window standard deviations.
    pub z_entry: f64,
    /// Exit threshold; must be strictly below the entry threshold so that
    /// positions do not flap around the entry boundary.
    pub z_exit: f64,
    /// Bars with less volume than this are ignored for signalling.
    pub min_volume: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            z_entry: 2.0,
            z_exit: 0.5,
            min_volume: 100,
        }
    }
}

/// Circuit-breaker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Session halts once session P&L (realized plus open-position mark)
    /// reaches this loss.
    pub max_daily_loss: f64,
    pub max_consecutive_losses: u32,
    pub cooldown_minutes: i64,
    pub max_daily_trades: u32,
    pub max_position_duration_minutes: i64,
    /// Protective stop distance, in account currency per position.
    pub stop_loss_amount: f64,
    /// Profit target distance, in account currency per position.
    pub take_profit_amount: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: 500.0,
            max_consecutive_losses: 3,
            cooldown_minutes: 30,
            max_daily_trades: 20,
            max_position_duration_minutes: 120,
            stop_loss_amount: 200.0,
            take_profit_amount: 300.0,
        }
    }
}

impl RiskConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes)
    }

    pub fn max_position_duration(&self) -> Duration {
        Duration::minutes(self.max_position_duration_minutes)
    }
}

/// Order execution parameters shared by live and simulated paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Contracts per entry.
    pub order_size: u32,
    /// Assumed adverse move per side, in ticks, applied by the simulated
    /// broker to market fills.
    pub slippage_ticks: f64,
    pub broker_fill_timeout_secs: u64,
    pub shutdown_flatten_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_size: 1,
            slippage_ticks: 1.0,
            broker_fill_timeout_secs: 10,
            shutdown_flatten_timeout_secs: 30,
        }
    }
}

/// Whether simulated market fills pay slippage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageMode {
    None,
    /// Entry fills move against the order by `slippage_ticks * tick_size`;
    /// buys fill higher, sells fill lower.
    PerSide,
}

/// Which protective exit wins when one bar's range reaches both levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTakeTieBreak {
    StopFirst,
    TakeFirst,
}

/// Replay parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Bar timeframe in minutes. One run uses exactly one timeframe.
    pub bar_minutes: u32,
    pub slippage_mode: SlippageMode,
    pub stop_take_tiebreak: StopTakeTieBreak,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            bar_minutes: 5,
            slippage_mode: SlippageMode::PerSide,
            stop_take_tiebreak: StopTakeTieBreak::StopFirst,
        }
    }
}

/// Exchange session schedule inputs consumed by the trading calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// IANA zone the session schedule is defined in.
    pub timezone: String,
    /// Full-session holidays (exchange-local dates).
    pub holidays: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            holidays: Vec::new(),
        }
    }
}

/// Telegram alert configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: String,
    pub chat_id: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "meridian=debug,sqlx=warn".
    pub level: String,
    /// Optional log file; stdout when unset.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the embedded store file.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/meridian.db".to_string(),
        }
    }
}
