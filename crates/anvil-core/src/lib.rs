//! # Anvil Core
//!
//! The contract shared by the Anvil plugin host and the modules it loads.
//!
//! A plugin never implements a host trait.  A module describes its types
//! with [`TypeDescriptor`]s and the host matches them structurally:
//!
//! - **Services** ([`ServiceKey`], [`ServiceProvider`], [`ServiceRegistry`]):
//!   capability-keyed lookup used for constructor injection and at
//!   initialization time.
//! - **Events** ([`HelloEventService`], [`WorldEventService`], [`EventHandler`]):
//!   periodic host events plugins can subscribe to.
//! - **Modules** ([`ModuleDescriptor`], [`export_module!`], [`static_module!`]):
//!   how a module hands its type descriptions to the host.
//!
//! ```text
//! ┌──────────────┐  ModuleDescriptor  ┌──────────────┐  ServiceProvider  ┌──────────┐
//! │ plugin module│───────────────────▶│  host loader │──────────────────▶│  plugin  │
//! └──────────────┘                    └──────────────┘                   └──────────┘
//! ```

pub mod error;
pub mod events;
pub mod module;
pub mod service;

pub use error::{BoxError, PluginError, PluginResult};
pub use events::{
    EventArgs, EventHandler, EventSource, HelloEventService, TimerEventArgs, WorldEventArgs,
    WorldEventService, handler,
};
pub use module::{
    Constructor, Initializer, Instance, InstanceBox, MODULE_ENTRY_SYMBOL, ModuleDescriptor,
    ModuleEntryFn, STATIC_MODULES, StaticModule, TypeDescriptor, TypeKind, find_static_module,
};
pub use service::{ResolvedArgs, ServiceArc, ServiceKey, ServiceProvider, ServiceRegistry};

// Used by `static_module!` expansions in downstream crates.
#[doc(hidden)]
pub use linkme;

/// Exports a module from a dynamic library.
///
/// Generates the `_anvil_module` entry symbol the host looks up.  The plugin
/// crate must be built with `crate-type = ["cdylib"]`.
///
/// ```rust,ignore
/// fn build_module() -> anvil_core::ModuleDescriptor { /* ... */ }
///
/// anvil_core::export_module!(build_module);
/// ```
#[macro_export]
macro_rules! export_module {
    ($build:path) => {
        #[doc(hidden)]
        #[unsafe(no_mangle)]
        pub extern "C" fn _anvil_module() -> *mut $crate::module::ModuleDescriptor {
            let build: fn() -> $crate::module::ModuleDescriptor = $build;
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(build()))
        }
    };
}

/// Registers a module compiled into the host binary.
///
/// The module becomes loadable under the path `static:<name>`.
///
/// ```rust,ignore
/// anvil_core::static_module!(GREETER, "greeter", build_module);
/// ```
#[macro_export]
macro_rules! static_module {
    ($ident:ident, $name:literal, $build:path) => {
        #[$crate::linkme::distributed_slice($crate::module::STATIC_MODULES)]
        #[linkme(crate = $crate::linkme)]
        static $ident: $crate::module::StaticModule = $crate::module::StaticModule {
            name: $name,
            build: $build,
        };
    };
}
