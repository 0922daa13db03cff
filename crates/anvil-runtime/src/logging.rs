//! Logging setup for the plugin host.
//!
//! One fmt layer plus an [`EnvFilter`] on a `tracing-subscriber` registry.
//! `RUST_LOG`, when set, replaces the configured base level; per-target
//! `filters` from the configuration are added on top of either.
//!
//! ```rust,ignore
//! use anvil_runtime::logging::LoggingBuilder;
//!
//! LoggingBuilder::from_config(&config.logging)
//!     .directive("anvil_runtime::publisher=trace")
//!     .init();
//! ```

use std::path::Path;

use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const DEFAULT_LOG_FILE: &str = "anvil.log";

/// Initializes logging from a [`LoggingConfig`].
///
/// A subscriber that is already installed (a second host, a test harness)
/// is left in place.
pub fn init_from_config(config: &LoggingConfig) {
    LoggingBuilder::from_config(config).init();
}

/// Maps the configured span events onto `FmtSpan` flags.
fn fmt_span(events: &SpanEventConfig) -> FmtSpan {
    [
        (events.new, FmtSpan::NEW),
        (events.enter, FmtSpan::ENTER),
        (events.exit, FmtSpan::EXIT),
        (events.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |acc, (_, flag)| acc | flag)
}

/// Builds and installs the global subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    directives: Vec<String>,
    with_target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact `info` lines on stdout.
    pub fn new() -> Self {
        Self::from_config(&LoggingConfig::default())
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut targets: Vec<_> = config.filters.iter().collect();
        targets.sort_by(|a, b| a.0.cmp(b.0));
        let directives = targets
            .into_iter()
            .map(|(target, level)| format!("{target}={level}"))
            .collect();

        Self {
            config: config.clone(),
            directives,
            with_target: true,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a filter directive such as `anvil_runtime::manager=trace`.
    ///
    /// Directives that do not parse are ignored.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn span_events(mut self, events: SpanEventConfig) -> Self {
        self.config.span_events = events;
        self
    }

    pub fn thread_ids(mut self, enabled: bool) -> Self {
        self.config.thread_ids = enabled;
        self
    }

    /// Adds file names and line numbers to every line.
    pub fn file_location(mut self, enabled: bool) -> Self {
        self.config.file_location = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Logs to `path`, rotated daily, keeping at most `max_files` files.
    pub fn log_file(mut self, path: impl AsRef<Path>, max_files: u32) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.as_ref().to_path_buf());
        self.config.max_files = max_files;
        self
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));
        for directive in self.directives.iter().filter_map(|d| d.parse::<Directive>().ok()) {
            filter = filter.add_directive(directive);
        }
        filter
    }

    fn writer(&self) -> BoxMakeWriter {
        match self.config.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File => match self.rolling_file() {
                Some(appender) => BoxMakeWriter::new(appender),
                None => BoxMakeWriter::new(std::io::stdout),
            },
        }
    }

    fn rolling_file(&self) -> Option<RollingFileAppender> {
        let path = self.config.file_path.as_deref()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());

        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .max_log_files(self.config.max_files.max(1) as usize)
            .build(dir)
            // No subscriber is installed yet, so this cannot go through tracing.
            .map_err(|e| eprintln!("cannot open log file {}: {e}", path.display()))
            .ok()
    }

    fn layer(&self) -> BoxedLayer {
        let config = &self.config;
        let layer = fmt::layer()
            .with_writer(self.writer())
            .with_span_events(fmt_span(&config.span_events))
            .with_target(self.with_target)
            .with_thread_ids(config.thread_ids)
            .with_file(config.file_location)
            .with_line_number(config.file_location);

        match config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }

    /// Installs the subscriber, leaving an existing one in place.
    pub fn init(self) {
        if let Err(e) = self.try_init() {
            warn!(error = %e, "Logging already initialized, keeping the existing subscriber");
        }
    }

    /// Installs the subscriber.
    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.layer())
            .with(self.filter())
            .try_init()
    }
}
