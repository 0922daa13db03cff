//! Host bootstrap.
//!
//! [`PluginHost`] wires everything together: logging, the two event services,
//! the service registry and the plugin manager.
//!
//! ```rust,ignore
//! use anvil_runtime::PluginHost;
//!
//! #[tokio::main]
//! async fn main() -> anvil_runtime::RuntimeResult<()> {
//!     let mut host = PluginHost::builder().config_file("anvil.toml").build()?;
//!     host.load_configured_plugins();
//!     host.run().await
//! }
//! ```
//!
//! # Shutdown order
//!
//! Subscriber handlers are code from plugin modules.  Shutting down (or
//! dropping) the host stops both publishers first, which releases every
//! handler, and only then drops the plugins and their modules.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anvil_core::{HelloEventService, ServiceProvider, ServiceRegistry, WorldEventService};
use figment::Provider;
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, warn};

use crate::adapter::PluginAdapter;
use crate::config::{ConfigLoader, HostConfig, validate_config};
use crate::error::RuntimeResult;
use crate::loader::{DefaultModuleLoader, ModuleLoader};
use crate::logging;
use crate::manager::{LoadReport, PluginManager};
use crate::services::{HelloEvents, WorldEvents};

/// The plugin host.
pub struct PluginHost {
    config: HostConfig,
    hello: Arc<HelloEvents>,
    world: Arc<WorldEvents>,
    services: Arc<ServiceRegistry>,
    manager: PluginManager,
}

impl PluginHost {
    /// Creates a builder loading configuration from the usual locations.
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// Creates a host from configuration, using the [`DefaultModuleLoader`].
    ///
    /// Must be called inside a tokio runtime: both publishers start ticking
    /// immediately.
    pub fn from_config(config: &HostConfig) -> RuntimeResult<Self> {
        let loader = DefaultModuleLoader::new(config.plugin_settings.base_dir.clone());
        Self::with_loader(config, loader)
    }

    /// Creates a host from configuration with a custom module loader.
    pub fn with_loader(
        config: &HostConfig,
        loader: impl ModuleLoader + 'static,
    ) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        let hello = Arc::new(HelloEvents::spawn(config.events.hello_interval())?);
        let world = Arc::new(WorldEvents::spawn(config.events.world_interval())?);

        let mut registry = ServiceRegistry::new();
        registry.insert::<dyn HelloEventService>(hello.clone());
        registry.insert::<dyn WorldEventService>(world.clone());
        let services = Arc::new(registry);

        let provider: Arc<dyn ServiceProvider> = services.clone();
        let manager = PluginManager::new(provider, loader);

        info!(
            log_level = %config.logging.level,
            hello_interval_ms = config.events.hello_interval_ms,
            world_interval_ms = config.events.world_interval_ms,
            services = services.len(),
            "Plugin host initialized"
        );

        Ok(Self {
            config: config.clone(),
            hello,
            world,
            services,
            manager,
        })
    }

    /// Loads every plugin listed in the configuration.
    pub fn load_configured_plugins(&mut self) -> Vec<LoadReport> {
        let entries = self.config.plugin_settings.plugins.clone();
        if entries.is_empty() {
            warn!("No plugins configured");
        } else {
            info!(count = entries.len(), "Found plugins in configuration");
        }

        let reports = self.manager.load_from_config(&entries);

        let plugins = self.manager.loaded_plugins();
        info!(count = plugins.len(), "Plugins loaded");
        for plugin in plugins {
            info!(
                "  - '{}' (type: {})",
                plugin.name(),
                plugin.plugin_type_name()
            );
        }
        reports
    }

    /// Registered plugins, in load order.
    pub fn loaded_plugins(&self) -> &[PluginAdapter] {
        self.manager.loaded_plugins()
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PluginManager {
        &mut self.manager
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn hello_events(&self) -> &Arc<HelloEvents> {
        &self.hello
    }

    pub fn world_events(&self) -> &Arc<WorldEvents> {
        &self.world
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Plugin host is running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.shutdown();
        Ok(())
    }

    /// Runs until `shutdown` completes, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown();
        Ok(())
    }

    /// Stops both publishers.  Idempotent.
    pub fn shutdown(&self) {
        self.hello.stop();
        self.world.stop();
        info!("Plugin host stopped");
    }
}

impl Drop for PluginHost {
    // Runs before the fields drop: no handler is still executing when
    // `manager` unloads the modules that provided it.
    fn drop(&mut self) {
        self.hello.stop();
        self.world.stop();
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl+C only");
            }
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Cannot listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// HostBuilder
// =============================================================================

/// Builder for a [`PluginHost`] with custom configuration sources.
pub struct HostBuilder {
    config_loader: ConfigLoader,
    loader: Option<Box<dyn ModuleLoader>>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            loader: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges a configuration provider over every other source.
    pub fn merge(mut self, provider: impl Provider) -> Self {
        self.config_loader = self.config_loader.merge(provider);
        self
    }

    /// Overrides one configuration value, e.g. `("events.hello_interval_ms", 1000)`.
    pub fn set(mut self, key: &str, value: impl Serialize) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Replaces the default module loader.
    pub fn module_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Loads configuration and builds the host.
    pub fn build(self) -> RuntimeResult<PluginHost> {
        let config = self.config_loader.load()?;
        match self.loader {
            Some(loader) => PluginHost::with_loader(&config, loader),
            None => PluginHost::from_config(&config),
        }
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}
