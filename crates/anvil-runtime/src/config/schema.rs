//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Periodic event settings.
    #[serde(default)]
    pub events: EventsConfig,

    /// Plugins to load at startup.
    #[serde(default)]
    pub plugin_settings: PluginSettings,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread IDs in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Log files are rotated daily; older ones beyond this count are removed.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-target levels, e.g. `{ "anvil_runtime::publisher" = "debug" }`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Events
// =============================================================================

/// Cadence of the periodic host events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Interval of the "Hello" timer event in milliseconds.
    #[serde(default = "default_hello_interval_ms")]
    pub hello_interval_ms: u64,

    /// Interval of the "World" update event in milliseconds.
    #[serde(default = "default_world_interval_ms")]
    pub world_interval_ms: u64,
}

impl EventsConfig {
    /// The "Hello" interval as a `Duration`.
    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.hello_interval_ms)
    }

    /// The "World" interval as a `Duration`.
    pub fn world_interval(&self) -> Duration {
        Duration::from_millis(self.world_interval_ms)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            hello_interval_ms: default_hello_interval_ms(),
            world_interval_ms: default_world_interval_ms(),
        }
    }
}

fn default_hello_interval_ms() -> u64 {
    3000
}

fn default_world_interval_ms() -> u64 {
    5000
}

// =============================================================================
// Plugins
// =============================================================================

/// The plugin list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginSettings {
    /// Directory that relative plugin paths are resolved against.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Plugins, loaded in order.
    #[serde(default)]
    pub plugins: Vec<PluginConfigEntry>,
}

/// One configured plugin module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginConfigEntry {
    /// Name given to every plugin found in the module.
    #[serde(default)]
    pub name: String,

    /// Library path, or `static:<name>` for a module linked into the host.
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PluginConfigEntry {
    /// Creates an enabled entry.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            enabled: true,
        }
    }

    /// Marks the entry disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_enabled() -> bool {
    true
}
