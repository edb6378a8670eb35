//! Configuration types for forgepool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a task pool.
///
/// # Examples
///
/// ```rust
/// use forgepool::config::{PoolConfig, WorkerConfig};
///
/// let config = PoolConfig {
///     workers: WorkerConfig {
///         min_workers: 2,
///         max_workers: 8,
///         auto_scale: true,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolConfig {
    /// Worker pool sizing and lifecycle
    pub workers: WorkerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Workers spawned at pool start
    pub min_workers: usize,

    /// Upper bound on pool size when auto-scaling
    pub max_workers: usize,

    /// Grow the pool on demand up to `max_workers`. When false the pool
    /// stays fixed at `min_workers`.
    pub auto_scale: bool,

    /// Time to wait for worker tasks to settle during termination
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: num_cpus::get().max(1),
            auto_scale: false,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Fixed-size pool with exactly `count` workers.
    pub fn fixed(count: usize) -> Self {
        Self {
            min_workers: count,
            max_workers: count,
            auto_scale: false,
            ..Default::default()
        }
    }

    /// Pool that grows on demand between `min` and `max` workers.
    pub fn scaling(min: usize, max: usize) -> Self {
        Self {
            min_workers: min,
            max_workers: max,
            auto_scale: true,
            ..Default::default()
        }
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Enable colored output (ignored if json_format is true)
    pub colored: bool,

    /// Include target module in logs
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            colored: true,
            include_targets: false,
        }
    }
}

impl LoggingConfig {
    /// Install a global tracing subscriber built from this
    /// configuration. Quietly does nothing if one is already set.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::from(self.level))
            .with_target(self.include_targets);

        let result = if self.json_format {
            builder.json().try_init()
        } else {
            builder.with_ansi(self.colored).try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already installed");
        }
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl PoolConfig {
    /// Create a configuration for testing: single worker, short
    /// shutdown timeout, debug logging.
    pub fn testing() -> Self {
        Self {
            workers: WorkerConfig {
                min_workers: 1,
                max_workers: 1,
                auto_scale: false,
                shutdown_timeout: Duration::from_secs(5),
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: false,
                include_targets: true,
                ..Default::default()
            },
        }
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.workers.min_workers == 0 {
            errors.push("min_workers must be greater than 0".to_string());
        }

        if self.workers.min_workers > self.workers.max_workers {
            errors.push("min_workers must not exceed max_workers".to_string());
        }

        if self.workers.max_workers > 1024 {
            errors.push("max_workers should not exceed 1024".to_string());
        }

        if self.workers.shutdown_timeout.is_zero() {
            errors.push("shutdown_timeout must be greater than 0".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert!(config.workers.min_workers >= 1);
        assert!(config.workers.max_workers >= config.workers.min_workers);
        assert!(!config.workers.auto_scale);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = PoolConfig::testing();
        assert_eq!(config.workers.min_workers, 1);
        assert_eq!(config.workers.max_workers, 1);
        assert!(matches!(config.logging.level, LogLevel::Debug));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_config_builders() {
        let fixed = WorkerConfig::fixed(4);
        assert_eq!(fixed.min_workers, 4);
        assert_eq!(fixed.max_workers, 4);
        assert!(!fixed.auto_scale);

        let scaling = WorkerConfig::scaling(1, 8).with_shutdown_timeout(Duration::from_secs(10));
        assert_eq!(scaling.min_workers, 1);
        assert_eq!(scaling.max_workers, 8);
        assert!(scaling.auto_scale);
        assert_eq!(scaling.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_logging_init_is_idempotent() {
        let logging = PoolConfig::testing().logging;
        logging.init();
        // A second install attempt is a no-op, not a panic.
        logging.init();
    }

    #[test]
    fn test_config_validation() {
        let mut config = PoolConfig::default();
        assert!(config.validate().is_ok());

        config.workers.min_workers = 0;
        assert!(config.validate().is_err());

        config.workers.min_workers = 8;
        config.workers.max_workers = 2;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("max_workers")));
    }
}
