//! Tracing setup driven by the `[logging]` config section.
//!
//! On Linux the journal is used when `journald` is enabled and reachable.
//! Otherwise events go to a daily rolling `camtrap.log`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};

/// Overrides the configured level, e.g. `CAMTRAP_LOG=camtrap::ingest=trace`.
pub const LOG_ENV: &str = "CAMTRAP_LOG";

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Where file logs go: the configured directory, or `logs/` next to the config.
pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    config
        .dir
        .clone()
        .unwrap_or_else(|| Config::config_dir().join("logs"))
}

/// Install the global subscriber. Call once at startup.
pub fn init(config: &LoggingConfig) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if config.journald {
            if let Ok(journald_layer) = tracing_journald::layer() {
                tracing_subscriber::registry()
                    .with(env_filter(config))
                    .with(journald_layer.with_syslog_identifier("camtrap".to_string()))
                    .init();
                tracing::debug!("Logging to journald at level {}", config.level);
                return Ok(());
            }
        }
    }

    let dir = log_dir(config);
    std::fs::create_dir_all(&dir)?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "camtrap.log"));

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    tracing::debug!("Logging to {:?} at level {}", dir, config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_prefers_configured() {
        let config = LoggingConfig {
            dir: Some(PathBuf::from("/var/log/camtrap")),
            ..Default::default()
        };
        assert_eq!(log_dir(&config), PathBuf::from("/var/log/camtrap"));

        let config = LoggingConfig::default();
        assert_eq!(log_dir(&config), Config::config_dir().join("logs"));
    }
}
