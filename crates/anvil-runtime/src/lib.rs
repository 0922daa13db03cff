//! Anvil Runtime - the plugin host.
//!
//! This crate provides:
//! - Periodic event publishing (`EventPublisher`, `HelloEvents`, `WorldEvents`)
//! - Module loading from dynamic libraries or the static registry (`ModuleLoader`)
//! - Structural plugin discovery and constructor injection (`PluginManager`)
//! - Configuration loading and logging setup
//! - Host bootstrap (`PluginHost`)
//!
//! ```ignore
//! use anvil_runtime::PluginHost;
//!
//! #[tokio::main]
//! async fn main() -> anvil_runtime::RuntimeResult<()> {
//!     let mut host = PluginHost::builder().build()?;
//!     host.load_configured_plugins();
//!     host.run().await
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod logging;
pub mod manager;
pub mod publisher;
pub mod resolver;
pub mod services;

// Re-exports
pub use adapter::{InitConvention, PluginAdapter};
pub use config::{ConfigError, ConfigLoader, ConfigResult, HostConfig, PluginConfigEntry};
pub use error::{RuntimeError, RuntimeResult};
pub use host::{HostBuilder, PluginHost};
pub use loader::{
    DefaultModuleLoader, LibraryModuleLoader, LoadedModule, ModuleLoader, StaticModuleLoader,
};
pub use logging::LoggingBuilder;
pub use manager::{LoadReport, PluginManager};
pub use publisher::{DispatchSummary, EventPublisher, PublisherState};
pub use resolver::DependencyResolver;
pub use services::{HelloEvents, WORLD_MESSAGES, WorldEvents};

// Re-export tracing for plugins and hosts built on this crate
pub use tracing;

/// Logging macros for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
