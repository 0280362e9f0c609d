use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{Config, LogFormat, LoggingConfig};

/// Initializes the process-wide tracing subscriber.
pub fn init_telemetry(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level configuration")?;

    let registry = Registry::default().with(env_filter);

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true);

            registry.with(fmt_layer).init();
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_list(true)
                .flatten_event(true);

            registry.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false);

            registry.with(fmt_layer).init();
        }
    }

    tracing::info!(log_level = %config.level, log_format = ?config.format, "telemetry initialized");

    Ok(())
}

/// Span for a dispatcher pass (claim + hand-off + settle).
#[macro_export]
macro_rules! dispatch_span {
    ($operation:expr) => {
        tracing::info_span!("dispatch_operation", operation = $operation)
    };
    ($operation:expr, $($key:expr => $value:expr),*) => {
        tracing::info_span!("dispatch_operation", operation = $operation, $($key = $value),*)
    };
}

/// Span for a workflow engine operation (start, step, pause, resume).
#[macro_export]
macro_rules! workflow_span {
    ($operation:expr) => {
        tracing::info_span!("workflow_operation", operation = $operation)
    };
    ($operation:expr, $($key:expr => $value:expr),*) => {
        tracing::info_span!("workflow_operation", operation = $operation, $($key = $value),*)
    };
}

pub fn log_startup_info(config: &Config) {
    tracing::info!(
        storage_url = %config.storage_url(),
        max_connections = config.storage.max_connections,
        poll_interval_ms = config.dispatch.poll_interval_ms,
        offline_threshold_secs = config.dispatch.offline_threshold_secs,
        reclaim_threshold_secs = config.dispatch.reclaim_threshold_secs,
        "orchestrator starting up"
    );
}

pub fn log_shutdown_info() {
    tracing::info!("orchestrator shutting down gracefully");
}

pub fn log_config_validation(config: &Config) {
    match config.validate() {
        Ok(()) => tracing::info!("configuration validation passed"),
        Err(e) => tracing::error!(error = %e, "configuration validation failed"),
    }
}

/// Logs `error` along with its full cause chain.
#[allow(dead_code)]
pub fn report_error(error: &anyhow::Error, context: &str) {
    tracing::error!(error = %error, context = context, "operation failed");

    let mut current = error.source();
    let mut depth = 1;
    while let Some(err) = current {
        tracing::error!(error = %err, depth = depth, "error cause");
        current = err.source();
        depth += 1;
    }
}

/// Measures and logs the wall time of a named operation; warns if it runs
/// longer than a second.
#[allow(dead_code)]
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!(operation = %operation, "starting performance timer");
        Self { start: std::time::Instant::now(), operation }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        tracing::info!(operation = %self.operation, duration_ms = duration.as_millis(), "operation completed");

        if duration.as_millis() > 1000 {
            tracing::warn!(operation = %self.operation, duration_ms = duration.as_millis(), "slow operation detected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn performance_timer_does_not_panic() {
        let timer = PerformanceTimer::new("test_operation");
        std::thread::sleep(Duration::from_millis(5));
        timer.finish();
    }

    #[test]
    fn logging_config_formats_are_distinct() {
        let configs = [
            LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
            LoggingConfig { level: "debug".to_string(), format: LogFormat::Json },
            LoggingConfig { level: "warn".to_string(), format: LogFormat::Compact },
        ];

        for config in configs {
            assert!(matches!(config.format, LogFormat::Pretty | LogFormat::Json | LogFormat::Compact));
        }
    }
}
