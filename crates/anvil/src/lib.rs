//! # Anvil
//!
//! A small plugin host.
//!
//! ## Overview
//!
//! Plugins are matched structurally rather than through a compiled-in trait:
//! a module describes its types, and every concrete type exposing an
//! initializer and a name becomes a plugin.  Constructor parameters are
//! resolved from the host's service registry; initializers may receive the
//! registry itself and subscribe to the host's periodic events.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────────────────┐
//! │ anvil.toml   │────▶│ PluginManager │────▶│ Plugin "A" ──▶ Hello (3s) │
//! │ plugin list  │     │  (discovery)  │────▶│ Plugin "B" ──▶ World (5s) │
//! └──────────────┘     └───────────────┘     └──────────────────────────┘
//! ```
//!
//! - **Host**: loads configuration, starts the publishers, loads plugins
//! - **Modules**: dynamic libraries (`export_module!`) or modules linked into
//!   the host (`static_module!`, addressed as `static:<name>`)
//! - **Services**: `HelloEventService` and `WorldEventService`, looked up by
//!   capability type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use anvil::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anvil::runtime::RuntimeResult<()> {
//!     let mut host = PluginHost::builder().build()?;
//!     host.load_configured_plugins();
//!     host.run().await
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-config`: JSON configuration files
//! - `json-log`: JSON log output

pub use anvil_core as core;
pub use anvil_runtime as runtime;

pub use anvil_core::{export_module, static_module};

/// Prelude module for convenient imports.
///
/// Covers both sides: hosting plugins and writing them.
pub mod prelude {
    // Host side
    pub use anvil_runtime::{HostBuilder, LoadReport, PluginHost, PluginManager};

    // Plugin side
    pub use anvil_core::{
        BoxError, EventSource, HelloEventService, ModuleDescriptor, PluginError, PluginResult,
        ResolvedArgs, ServiceKey, ServiceProvider, TimerEventArgs, TypeDescriptor, TypeKind,
        WorldEventArgs, WorldEventService, handler,
    };

    // Logging macros
    pub use anvil_runtime::prelude::*;
}
