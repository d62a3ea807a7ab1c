use crate::models::config::LoggingConfig;
use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "hwmon-insights.log";

/// Default filter when `RUST_LOG` is unset; HTTP plumbing is kept quiet.
fn default_filter(level: &str) -> String {
    format!("{},tower_http=warn,hyper=warn", level)
}

/// Installs the global subscriber: human-readable output on stdout plus,
/// when enabled, a daily-rolling JSON log under `config.directory`.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(&config.level)))?;

    let (file_layer, guard) = if config.json_file {
        std::fs::create_dir_all(&config.directory)?;
        let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout).with_ansi(true))
        .with(file_layer)
        .try_init()?;

    info!(
        level = %config.level,
        directory = %config.directory.display(),
        json_file = config.json_file,
        "Logging initialized"
    );
    Ok(guard)
}
