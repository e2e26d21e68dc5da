//! Keystone logging bootstrap
//!
//! Installs a `tracing-subscriber` pipeline for the events the dispatch core
//! emits. Output is written through a non-blocking `tracing-appender` writer;
//! keep the returned guard alive until shutdown so buffered lines are flushed.
//!
//! # Usage
//!
//! ```no_run
//! use keystone_log::{LogConfig, LogFormat, LogLevel};
//!
//! let _guard = LogConfig::from_env()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init();
//!
//! tracing::info!(port = 8080, "Server started");
//! ```
//!
//! # Environment Variables
//!
//! - `KEYSTONE_DEBUG=1` - Shorthand for the debug level
//! - `KEYSTONE_LOG_LEVEL=trace|debug|info|warn|error` - Set log level
//! - `KEYSTONE_LOG_FORMAT=json|plain|pretty|compact` - Set output format
//! - `KEYSTONE_LOG_OUTPUT=stdout|stderr|<file path>` - Set destination
//! - `KEYSTONE_LOG_FILTER=keystone_core=trace,...` - Directive filter
//!
//! Without `KEYSTONE_LOG_FILTER`, `RUST_LOG` is honoured before the level.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::FmtSpan, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use tracing::{debug, error, info, trace, warn};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Directive form understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    Plain,
    /// Multi-line, for development
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "plain" => Some(LogFormat::Plain),
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// Output destination for logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Append to a single file
    File(PathBuf),
}

impl LogOutput {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" => None,
            "stdout" => Some(LogOutput::Stdout),
            "stderr" => Some(LogOutput::Stderr),
            path => Some(LogOutput::File(PathBuf::from(path))),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("Cannot open log file: {0}")]
    Io(#[from] io::Error),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    /// Include target (module path)
    pub targets: bool,
    pub file_line: bool,
    /// Emit span close events with timings
    pub spans: bool,
    /// Enable ANSI colors (ignored for JSON)
    pub colors: bool,
    /// Directive filter; overrides `level` when set
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    /// JSON to STDOUT at INFO level
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            thread_ids: false,
            targets: true,
            file_line: false,
            spans: false,
            colors: false,
            env_filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the `KEYSTONE_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let debug = flag("KEYSTONE_DEBUG");
        let defaults = Self::default();

        Self {
            level: lookup("KEYSTONE_LOG_LEVEL")
                .and_then(|s| LogLevel::from_str(&s))
                .unwrap_or(if debug { LogLevel::Debug } else { defaults.level }),
            format: lookup("KEYSTONE_LOG_FORMAT")
                .and_then(|s| LogFormat::from_str(&s))
                .unwrap_or(defaults.format),
            output: lookup("KEYSTONE_LOG_OUTPUT")
                .and_then(|s| LogOutput::parse(&s))
                .unwrap_or(defaults.output),
            thread_ids: flag("KEYSTONE_LOG_THREAD_IDS"),
            spans: debug || flag("KEYSTONE_LOG_SPANS"),
            env_filter: lookup("KEYSTONE_LOG_FILTER").filter(|f| !f.trim().is_empty()),
            ..defaults
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_file_line(mut self, enable: bool) -> Self {
        self.file_line = enable;
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.spans = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    /// Set a directive filter such as `"keystone_core=trace,info"`.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// The filter this configuration installs.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter).map_err(|e| LogError::Filter {
                filter: filter.clone(),
                message: e.to_string(),
            }),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))),
        }
    }

    /// Install the global subscriber.
    ///
    /// Returns the flush guard; dropping it flushes buffered lines.
    pub fn try_init(self) -> Result<WorkerGuard, LogError> {
        let filter = self.filter()?;

        let (writer, guard) = match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(self.layer(writer))
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// Like [`LogConfig::try_init`], reporting failures on stderr instead.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => Some(guard),
            Err(err) => {
                eprintln!("keystone-log: {}", err);
                None
            }
        }
    }

    fn layer<S, W>(&self, writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let span_events = if self.spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.targets)
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_line)
            .with_line_number(self.file_line)
            .with_span_events(span_events);

        match self.format {
            LogFormat::Json => base
                .json()
                .with_current_span(self.spans)
                .with_span_list(self.spans)
                .boxed(),
            LogFormat::Plain => base.with_ansi(self.colors).boxed(),
            LogFormat::Pretty => base.pretty().with_ansi(self.colors).boxed(),
            LogFormat::Compact => base
                .compact()
                .with_file(false)
                .with_line_number(false)
                .with_ansi(self.colors)
                .boxed(),
        }
    }
}
