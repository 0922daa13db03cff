//! Host configuration.
//!
//! Figment-based loading from TOML (default), YAML or JSON files and `ANVIL_*`
//! environment variables, plus validation of the loaded values.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    EventsConfig, HostConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, PluginConfigEntry,
    PluginSettings, SpanEventConfig,
};
pub use validation::validate_config;
