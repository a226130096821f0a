use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::settings::LoggingConfig;

/// Initialises the global tracing subscriber from the logging section.
///
/// Returns a guard that must be held for the lifetime of the process when a
/// log file is configured; dropping it flushes and stops the writer thread.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ConfigError::TracingError(format!("invalid log filter: {e}")))?;

    match &config.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| ConfigError::TracingError(format!("invalid log file: {file}")))?;
            std::fs::create_dir_all(dir)
                .map_err(|e| ConfigError::TracingError(format!("cannot create log dir: {e}")))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}
