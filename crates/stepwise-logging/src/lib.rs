//! Logging setup for Stepwise binaries
//!
//! Wraps `tracing-subscriber` so every binary formats and filters logs the
//! same way.
//!
//! ```rust,ignore
//! use stepwise_logging::{init, LogConfig};
//!
//! // CLI: logs on stderr, stdout reserved for command output
//! init(LogConfig::cli(false))?;
//!
//! // From the [logging] section of stepwise.toml
//! let _guard = init_from_settings(&config.logging, debug)?;
//! ```

use std::io::IsTerminal;
use std::path::Path;
use stepwise_config::LoggingConfig;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

pub use tracing::{debug, error, info, instrument, trace, warn, Level};
pub use tracing_appender::non_blocking::WorkerGuard;

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// Default: stdout belongs to command output
    #[default]
    Stderr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Force debug level, ignoring `RUST_LOG`
    pub debug: bool,
    /// Level or directive used when `RUST_LOG` is not set
    pub default_level: String,
    pub output: LogOutput,
    pub show_target: bool,
    pub timestamp_format: TimestampFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: stepwise_config::DEFAULT_LOG_LEVEL.to_string(),
            output: LogOutput::default(),
            show_target: false,
            timestamp_format: TimestampFormat::default(),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn utc(self) -> Self {
        self.timestamp_format(TimestampFormat::Utc)
    }

    /// CLI usage: warnings only unless debugging, on stderr
    pub fn cli(debug: bool) -> Self {
        Self::new().debug(debug).default_level("warn")
    }

    /// Tests: debug level with targets
    pub fn test() -> Self {
        Self::new().default_level("debug").show_target(true)
    }

    /// Build from the `[logging]` section of the config file
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        let config = Self::new()
            .default_level(settings.level.clone())
            .show_target(settings.show_target);
        if settings.utc {
            config.utc()
        } else {
            config
        }
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level unless `debug` is set. Fails if a
/// subscriber is already installed.
pub fn init(config: LogConfig) -> Result<(), TryInitError> {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    macro_rules! with_timer_init {
        ($builder:expr, $ts_format:expr) => {
            match $ts_format {
                TimestampFormat::Utc => $builder.with_timer(UtcTime::rfc_3339()).finish().try_init(),
                TimestampFormat::Local => $builder.with_timer(LocalTime::rfc_3339()).finish().try_init(),
            }
        };
    }

    match config.output {
        LogOutput::Stdout => {
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(std::io::stdout().is_terminal());
            with_timer_init!(builder, config.timestamp_format)
        }
        LogOutput::Stderr => {
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal());
            with_timer_init!(builder, config.timestamp_format)
        }
    }
}

/// Install the global subscriber writing to a daily-rolling file.
///
/// Hold the returned guard until exit so buffered lines are flushed.
pub fn init_with_file(config: LogConfig, log_path: &Path) -> std::io::Result<WorkerGuard> {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    stepwise_config::paths::ensure_parent_dir(log_path)
        .map_err(|e| std::io::Error::other(format!("Failed to create log directory: {}", e)))?;

    let log_dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let log_filename = log_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("stepwise.log");

    // Files are named {prefix}.YYYY-MM-DD
    let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_writer(non_blocking)
        .with_ansi(false);

    let result = match config.timestamp_format {
        TimestampFormat::Utc => builder.with_timer(UtcTime::rfc_3339()).finish().try_init(),
        TimestampFormat::Local => builder.with_timer(LocalTime::rfc_3339()).finish().try_init(),
    };
    result.map_err(std::io::Error::other)?;

    Ok(guard)
}

/// Install logging from the config file section. Returns the file guard when
/// `[logging] file` is set.
pub fn init_from_settings(
    settings: &LoggingConfig,
    debug: bool,
) -> std::io::Result<Option<WorkerGuard>> {
    let config = LogConfig::from_settings(settings).debug(debug);
    match &settings.file {
        Some(path) => init_with_file(config, path).map(Some),
        None => init(config).map(|_| None).map_err(std::io::Error::other),
    }
}
