use std::path::Path;

use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BacktestConfig, CalendarConfig, Config, DatabaseConfig, ExecutionConfig, InstrumentConfig,
    LoggingConfig, RiskConfig, SlippageMode, StopTakeTieBreak, StrategyConfig, TelegramConfig,
};
pub use telemetry::init_tracing;

/// Loads the application configuration from the specified path.
///
/// # Arguments
/// * `config_path` - Optional path to the configuration file. If None, it will look for 'meridian.toml' in the current directory.
///
/// # Returns
/// A `Result` containing the deserialized `Config` if successful, or a `ConfigError` if loading or parsing fails.
pub fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = config_path.unwrap_or("meridian.toml");

    if !Path::new(config_path).exists() {
        return Err(ConfigError::FileNotFound(config_path.to_string()));
    }

    let builder = config::Config::builder()
        // Load configuration from the specified file
        .add_source(config::File::with_name(config_path).required(true))
        // Environment overrides, e.g. MERIDIAN_RISK__MAX_DAILY_LOSS=750
        .add_source(
            config::Environment::with_prefix("MERIDIAN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Deserialize the configuration into our strongly-typed struct
    let config: Config = builder.try_deserialize()?;

    // Validate the configuration values
    validate_config(&config)?;

    Ok(config)
}

/// Validates the configuration values after loading.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let strategy = &config.strategy;
    if strategy.lookback < 2 {
        return Err(ConfigError::ValidationError(
            "strategy.lookback must be at least 2".into(),
        ));
    }
    if strategy.z_entry <= 0.0 || !strategy.z_entry.is_finite() {
        return Err(ConfigError::ValidationError(
            "strategy.z_entry must be a positive finite number".into(),
        ));
    }
    if strategy.z_exit < 0.0 || strategy.z_exit >= strategy.z_entry {
        return Err(ConfigError::ValidationError(
            "strategy.z_exit must satisfy 0 <= z_exit < z_entry".into(),
        ));
    }

    let risk = &config.risk;
    if risk.max_daily_loss <= 0.0 {
        return Err(ConfigError::ValidationError(
            "risk.max_daily_loss must be greater than 0".into(),
        ));
    }
    if risk.max_consecutive_losses < 1 {
        return Err(ConfigError::ValidationError(
            "risk.max_consecutive_losses must be at least 1".into(),
        ));
    }
    if risk.max_daily_trades < 1 {
        return Err(ConfigError::ValidationError(
            "risk.max_daily_trades must be at least 1".into(),
        ));
    }
    if risk.cooldown_minutes < 0 {
        return Err(ConfigError::ValidationError(
            "risk.cooldown_minutes must not be negative".into(),
        ));
    }
    if risk.max_position_duration_minutes <= 0 {
        return Err(ConfigError::ValidationError(
            "risk.max_position_duration_minutes must be greater than 0".into(),
        ));
    }
    if risk.stop_loss_amount <= 0.0 || risk.take_profit_amount <= 0.0 {
        return Err(ConfigError::ValidationError(
            "risk.stop_loss_amount and risk.take_profit_amount must be greater than 0".into(),
        ));
    }

    let instrument = &config.instrument;
    if instrument.multiplier <= 0.0 {
        return Err(ConfigError::ValidationError(
            "instrument.multiplier must be greater than 0".into(),
        ));
    }
    if instrument.tick_size <= 0.0 {
        return Err(ConfigError::ValidationError(
            "instrument.tick_size must be greater than 0".into(),
        ));
    }

    let execution = &config.execution;
    if execution.order_size < 1 {
        return Err(ConfigError::ValidationError(
            "execution.order_size must be at least 1 contract".into(),
        ));
    }
    if execution.slippage_ticks < 0.0 {
        return Err(ConfigError::ValidationError(
            "execution.slippage_ticks must not be negative".into(),
        ));
    }

    if config.backtest.bar_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "backtest.bar_minutes must be greater than 0".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn exit_threshold_must_be_below_entry() {
        let mut config = Config::default();
        config.strategy.z_exit = config.strategy.z_entry;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn lookback_of_one_is_rejected() {
        let mut config = Config::default();
        config.strategy.lookback = 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn fingerprint_tracks_trading_parameters_only() {
        let base = Config::default();
        let mut logging_changed = Config::default();
        logging_changed.logging.level = "debug".to_string();
        assert_eq!(base.fingerprint(), logging_changed.fingerprint());

        let mut risk_changed = Config::default();
        risk_changed.risk.max_daily_loss = 750.0;
        assert_ne!(base.fingerprint(), risk_changed.fingerprint());
    }
}
