//! Logging setup for mention-explorer.
//!
//! Structured logging on top of `tracing`, always written to stderr so
//! `--format json` output on stdout stays machine-readable. One-shot CLI
//! commands log warnings only by default; `serve` logs requests at info.

use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level for this crate.
    pub level: LogLevel,
    /// Level for `tower_http` request traces.
    pub http_level: LogLevel,
    pub format: LogFormat,
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Log span close events with their duration.
    pub span_timing: bool,
    pub colors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line records.
    Compact,
    /// Multi-line records with source locations.
    Pretty,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            http_level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            span_timing: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Pick a configuration from the global CLI flags.
    ///
    /// `verbosity` counts `-v` flags: one enables debug, two or more trace.
    /// A long-running server always gets timestamps and request logging.
    #[must_use]
    pub fn for_command(quiet: bool, verbosity: u8, serving: bool) -> Self {
        let mut config = Self::default();

        if serving {
            config.level = LogLevel::Info;
            config.http_level = LogLevel::Info;
            config.timestamps = true;
        }

        if quiet {
            config.level = LogLevel::Error;
            config.http_level = LogLevel::Error;
            return config;
        }

        match verbosity {
            0 => {}
            1 => {
                config.level = LogLevel::Debug;
                config.http_level = config.http_level.max(LogLevel::Info);
                config.target = true;
            }
            _ => {
                config.level = LogLevel::Trace;
                config.http_level = LogLevel::Debug;
                config.format = LogFormat::Pretty;
                config.target = true;
                config.span_timing = true;
            }
        }
        config
    }

    /// `EnvFilter` directive covering this crate and the HTTP layer.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        format!(
            "mention_explorer={},tower_http={}",
            self.level.as_str(),
            self.http_level.as_str()
        )
    }
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

fn fmt_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target)
        .with_span_events(span_events);

    match (config.format, config.timestamps) {
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Pretty, _) => base
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured levels. Only the first
/// call installs a subscriber; later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(config))
        .try_init()
        .ok();
}

/// Logs the start and end of a long-running CLI operation.
pub struct OperationGuard {
    name: String,
    start: std::time::Instant,
}

impl OperationGuard {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(operation = %name, "Starting operation");
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    pub fn complete(self) {
        tracing::info!(
            operation = %self.name,
            duration_ms = self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }

    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.name,
            duration_ms = self.start.elapsed().as_millis(),
            error = %error,
            "Operation failed"
        );
    }

    /// Log completion or failure depending on `result`.
    pub fn finish<T, E: std::error::Error>(self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.complete(),
            Err(e) => self.fail(e),
        }
    }
}
