//! Logging configuration and setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON format for structured logging.
    Json,
}

/// Log output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stdout.
    Stdout,
    /// Log to stderr.
    #[default]
    Stderr,
    /// Write through `print!` so the test harness captures output.
    Test,
    /// Log to a single, never-rotated file `{directory}/{prefix}`.
    File {
        /// Directory holding the log file; created if missing.
        directory: PathBuf,
        /// File name.
        prefix: String,
    },
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "default_level")]
    pub level: String,
    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
    /// Log target.
    #[serde(default)]
    pub target: LogTarget,
    /// Whether to include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Whether to include file/line info.
    #[serde(default)]
    pub file_info: bool,
    /// Whether to emit span open/close events.
    #[serde(default)]
    pub span_events: bool,
    /// Whether to use ANSI colors.
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Directive overrides (e.g., `harbor_runtime=debug`).
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            timestamps: true,
            file_info: false,
            span_events: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Create a new log config with the specified level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Set the log format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log to `{directory}/{prefix}`. Disables ANSI colors.
    #[must_use]
    pub fn with_file(mut self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.target = LogTarget::File {
            directory: directory.into(),
            prefix: prefix.into(),
        };
        self.ansi = false;
        self
    }

    /// Add a directive override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Disable timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Enable file/line info.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span events.
    #[must_use]
    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;

        for directive in &self.directives {
            filter = filter.add_directive(directive.parse().map_err(
                |e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(e.to_string())
                },
            )?);
        }

        Ok(filter)
    }

    fn make_writer(&self) -> TelemetryResult<BoxMakeWriter> {
        Ok(match &self.target {
            LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogTarget::Test => BoxMakeWriter::new(fmt::TestWriter::new()),
            LogTarget::File { directory, prefix } => {
                std::fs::create_dir_all(directory).map_err(|e| {
                    TelemetryError::ConfigError(format!("failed to create log directory: {e}"))
                })?;
                BoxMakeWriter::new(tracing_appender::rolling::never(directory, prefix))
            },
        })
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn build_layer<S>(&self, writer: BoxMakeWriter) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info)
            .with_span_events(self.span_events());

        match (self.format, self.timestamps) {
            (LogFormat::Pretty, true) => layer.pretty().boxed(),
            (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => layer.compact().boxed(),
            (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
            (LogFormat::Json, true) => layer.json().boxed(),
            (LogFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// Install a global subscriber built from `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] for an invalid level, directive or
/// unwritable log directory, and [`TelemetryError::InitError`] if a global
/// subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;
    let writer = config.make_writer()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(config.build_layer(writer))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

/// Set up default logging (info level, stderr, pretty format).
///
/// # Errors
///
/// Returns an error if logging cannot be initialized.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}
