//! Plugin discovery, instantiation and registration.
//!
//! For every module path the manager:
//!
//! 1. loads the module through its [`ModuleLoader`];
//! 2. keeps the concrete types exposing an initializer and a name;
//! 3. for each of them, independently: resolves constructor dependencies,
//!    instantiates, wraps the instance in a [`PluginAdapter`], forwards the
//!    configuration name, registers the adapter and initializes it.
//!
//! A failure at any step is logged and recorded in the [`LoadReport`]; it only
//! affects the type (or module) it happened in.  A plugin whose initializer
//! fails stays registered.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use anvil_core::{InstanceBox, ServiceProvider, TypeDescriptor};
use tracing::{debug, error, info, info_span, warn};

use crate::adapter::PluginAdapter;
use crate::config::PluginConfigEntry;
use crate::error::{RuntimeError, RuntimeResult, panic_message};
use crate::loader::{DefaultModuleLoader, LoadedModule, ModuleLoader};
use crate::resolver::DependencyResolver;

/// What happened while loading one module.
#[derive(Debug)]
pub struct LoadReport {
    /// Path the module was requested from.
    pub path: String,
    /// Module name, when the module could be loaded.
    pub module: Option<String>,
    /// Number of types matching the plugin shape.
    pub discovered: usize,
    /// Names of the plugins registered and initialized.
    pub loaded: Vec<String>,
    /// Errors, in the order they occurred.
    pub errors: Vec<RuntimeError>,
}

impl LoadReport {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            module: None,
            discovered: 0,
            loaded: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Returns `true` if nothing went wrong.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns the loaded plugins, in load order.
pub struct PluginManager {
    loader: Box<dyn ModuleLoader>,
    services: Arc<dyn ServiceProvider>,
    plugins: Vec<PluginAdapter>,
    // Modules stay loaded for the life of the manager, even when none of
    // their types became a plugin: a constructor may already have handed
    // module code to a host service.
    modules: Vec<Arc<LoadedModule>>,
}

impl PluginManager {
    /// Creates a manager resolving services from `services`.
    pub fn new(services: Arc<dyn ServiceProvider>, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            services,
            plugins: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Creates a manager with the [`DefaultModuleLoader`].
    pub fn with_default_loader(services: Arc<dyn ServiceProvider>, base_dir: Option<PathBuf>) -> Self {
        Self::new(services, DefaultModuleLoader::new(base_dir))
    }

    /// Loads every enabled entry with a path, in order.
    ///
    /// Each entry's `name` becomes the configuration name of the plugins found
    /// in its module.
    pub fn load_from_config(&mut self, entries: &[PluginConfigEntry]) -> Vec<LoadReport> {
        let mut reports = Vec::new();
        for entry in entries {
            if !entry.enabled {
                info!(plugin = %entry.name, path = %entry.path, "Plugin is disabled, skipping");
                continue;
            }
            if entry.path.trim().is_empty() {
                warn!(plugin = %entry.name, "Plugin has no path configured, skipping");
                continue;
            }
            reports.push(self.load_plugin(&entry.path, Some(&entry.name)));
        }
        reports
    }

    /// Loads a module and registers every plugin it contains.
    ///
    /// Never fails as a whole; see the returned report for what went wrong.
    pub fn load_plugin(&mut self, path: &str, configuration_name: Option<&str>) -> LoadReport {
        let configuration_name = configuration_name.filter(|name| !name.is_empty());
        let _span = info_span!("load_plugin", path, config_name = configuration_name).entered();
        let mut report = LoadReport::new(path);

        let module = match self.load_module(path) {
            Ok(module) => module,
            Err(e) => {
                error!(path, error = %e, "Failed to load plugin module");
                report.errors.push(e);
                return report;
            }
        };
        info!(
            path,
            module = module.name(),
            types = module.types().len(),
            "Plugin module loaded"
        );
        report.module = Some(module.name().to_string());

        let candidates: Vec<Arc<TypeDescriptor>> = module
            .types()
            .iter()
            .filter(|descriptor| descriptor.matches_plugin_shape())
            .cloned()
            .collect();
        report.discovered = candidates.len();
        if candidates.is_empty() {
            warn!(path, module = module.name(), "No plugin types found in module");
        }

        for descriptor in candidates {
            match self.load_type(&module, descriptor, configuration_name) {
                Ok(name) => report.loaded.push(name),
                Err(e) => report.errors.push(e),
            }
        }

        self.modules.push(module);
        report
    }

    fn load_module(&self, path: &str) -> RuntimeResult<Arc<LoadedModule>> {
        match catch_unwind(AssertUnwindSafe(|| self.loader.load(path))) {
            Ok(result) => result.map(Arc::new),
            Err(payload) => Err(RuntimeError::module_load(
                path,
                format!("panicked: {}", panic_message(payload)),
            )),
        }
    }

    fn load_type(
        &mut self,
        module: &Arc<LoadedModule>,
        descriptor: Arc<TypeDescriptor>,
        configuration_name: Option<&str>,
    ) -> RuntimeResult<String> {
        let plugin_type = descriptor.type_name().to_string();
        info!(plugin_type, "Creating plugin instance");

        let instance = self.instantiate(&descriptor).inspect_err(|e| {
            error!(plugin_type, error = %e, "Failed to create plugin instance");
        })?;

        let mut plugin = PluginAdapter::new(
            instance,
            descriptor,
            Arc::clone(module),
            configuration_name.map(str::to_string),
        )
        .inspect_err(|e| {
            error!(plugin_type, error = %e, "Plugin type rejected");
        })?;

        if let Some(name) = configuration_name
            && !plugin.set_configuration_name(name)
        {
            debug!(plugin_type, "Plugin type takes no configuration name");
        }

        let name = plugin.name();
        let self_name = plugin.plugin_type_name();
        info!(plugin = %name, plugin_type = %self_name, "Registering plugin");

        let services = Arc::clone(&self.services);
        let result = plugin.initialize(services.as_ref());
        self.plugins.push(plugin);

        match result {
            Ok(()) => {
                info!(plugin = %name, plugin_type = %self_name, "Plugin loaded and initialized");
                Ok(name)
            }
            Err(e) => {
                error!(plugin = %name, error = %e, "Plugin initialization failed");
                Err(e)
            }
        }
    }

    fn instantiate(&self, descriptor: &TypeDescriptor) -> RuntimeResult<InstanceBox> {
        let plugin_type = descriptor.type_name();
        let constructor =
            descriptor
                .get_constructor()
                .ok_or_else(|| RuntimeError::MissingConstructor {
                    plugin_type: plugin_type.to_string(),
                })?;

        let args = DependencyResolver::new(self.services.as_ref())
            .resolve(plugin_type, constructor.parameters())?;

        let reason = match catch_unwind(AssertUnwindSafe(|| constructor.invoke(args))) {
            Ok(Ok(instance)) => return Ok(instance),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload)),
        };
        Err(RuntimeError::Instantiation {
            plugin_type: plugin_type.to_string(),
            reason,
        })
    }

    /// Registered plugins, in registration order.
    pub fn loaded_plugins(&self) -> &[PluginAdapter] {
        &self.plugins
    }

    /// Finds a plugin by its effective name.
    pub fn plugin(&self, name: &str) -> Option<&PluginAdapter> {
        self.plugins.iter().find(|plugin| plugin.name() == name)
    }

    /// Modules loaded so far, in load order.
    pub fn loaded_modules(&self) -> &[Arc<LoadedModule>] {
        &self.modules
    }

    /// The services plugins are resolved against.
    pub fn services(&self) -> &Arc<dyn ServiceProvider> {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anvil_core::{
        HelloEventService, ModuleDescriptor, PluginError, ServiceKey, ServiceRegistry, TypeKind,
    };
    use parking_lot::Mutex;

    use super::*;
    use crate::services::HelloEvents;

    trait Clock: Send + Sync {}

    struct Plain {
        label: String,
    }

    /// Loader serving modules built in memory and recording every request.
    struct MemoryLoader {
        modules: HashMap<&'static str, fn() -> ModuleDescriptor>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl MemoryLoader {
        fn new(modules: &[(&'static str, fn() -> ModuleDescriptor)]) -> Self {
            Self {
                modules: modules.iter().copied().collect(),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ModuleLoader for MemoryLoader {
        fn load(&self, path: &str) -> RuntimeResult<LoadedModule> {
            self.requests.lock().push(path.to_string());
            let build = self
                .modules
                .get(path)
                .ok_or_else(|| RuntimeError::module_load(path, "file not found"))?;
            Ok(LoadedModule::from_descriptor(path, build()))
        }
    }

    fn plugin_type(type_name: &'static str, parameters: Vec<ServiceKey>) -> TypeDescriptor {
        TypeDescriptor::new(type_name)
            .constructor(parameters, move |_| {
                Ok(Plain {
                    label: String::new(),
                })
            })
            .initializer_with_services(|_: &mut Plain, services| {
                services
                    .get::<dyn HelloEventService>()
                    .map(|_| ())
                    .ok_or_else(|| PluginError::failed("hello service missing"))
            })
            .name_property(|p: &Plain| p.label.clone())
            .name_setter(|p: &mut Plain, name| p.label = name.to_string())
    }

    fn hello_key() -> ServiceKey {
        ServiceKey::of::<dyn HelloEventService>()
    }

    fn mixed_module() -> ModuleDescriptor {
        ModuleDescriptor::new("mixed")
            .with_type(plugin_type("First", vec![hello_key()]))
            .with_type(plugin_type("NeedsClock", vec![ServiceKey::of::<dyn Clock>()]))
            .with_type(plugin_type("Second", vec![]))
            .with_type(plugin_type(
                "NeedsBoth",
                vec![hello_key(), ServiceKey::of::<dyn Clock>()],
            ))
            .with_type(plugin_type("Base", vec![]).kind(TypeKind::Abstract))
            .with_type(TypeDescriptor::new("Helper").initializer(|_: &mut Plain| Ok(())))
    }

    fn simple_module() -> ModuleDescriptor {
        ModuleDescriptor::new("simple").with_type(
            TypeDescriptor::new("Simple")
                .constructor([], |_| Ok(Plain { label: String::new() }))
                .initializer(|_: &mut Plain| Ok(()))
                .name_property(|_: &Plain| "Simple V1".to_string()),
        )
    }

    fn faulty_module() -> ModuleDescriptor {
        ModuleDescriptor::new("faulty")
            .with_type(
                TypeDescriptor::new("BadInit")
                    .constructor([], |_| Ok(Plain { label: String::new() }))
                    .initializer(|_: &mut Plain| Err(PluginError::failed("init refused")))
                    .name_property(|_: &Plain| "BadInit".to_string()),
            )
            .with_type(
                TypeDescriptor::new("PanicCtor")
                    .constructor([], |_| -> Result<Plain, PluginError> {
                        panic!("constructor bug")
                    })
                    .initializer(|_: &mut Plain| Ok(()))
                    .name_property(|_: &Plain| "PanicCtor".to_string()),
            )
            .with_type(
                TypeDescriptor::new("NoCtor")
                    .initializer(|_: &mut Plain| Ok(()))
                    .name_property(|_: &Plain| "NoCtor".to_string()),
            )
            .with_type(
                TypeDescriptor::new("WrongInit")
                    .constructor([], |_| Ok(Plain { label: String::new() }))
                    .raw_initializer(vec![hello_key()], |_, _| Ok(()))
                    .name_property(|_: &Plain| "WrongInit".to_string()),
            )
            .with_type(
                TypeDescriptor::new("Fine")
                    .constructor([], |_| Ok(Plain { label: String::new() }))
                    .initializer(|_: &mut Plain| Ok(()))
                    .name_property(|_: &Plain| "Fine".to_string()),
            )
    }

    fn manager(loader: MemoryLoader) -> PluginManager {
        let registry =
            ServiceRegistry::new().with::<dyn HelloEventService>(Arc::new(HelloEvents::default()));
        PluginManager::new(Arc::new(registry), loader)
    }

    #[test]
    fn test_unresolvable_types_are_skipped() {
        let mut manager = manager(MemoryLoader::new(&[("mixed", mixed_module)]));

        let report = manager.load_plugin("mixed", None);

        assert_eq!(report.module.as_deref(), Some("mixed"));
        assert_eq!(report.discovered, 4);
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.errors.len(), 2);
        assert!(
            report
                .errors
                .iter()
                .all(|e| matches!(e, RuntimeError::DependencyUnresolved { .. }))
        );
        let types: Vec<_> = manager
            .loaded_plugins()
            .iter()
            .map(PluginAdapter::type_name)
            .collect();
        assert_eq!(types, ["First", "Second"]);
    }

    #[test]
    fn test_disabled_entry_never_reaches_loader() {
        let loader = MemoryLoader::new(&[("modA", simple_module), ("modB", simple_module)]);
        let requests = Arc::clone(&loader.requests);
        let mut manager = manager(loader);

        let reports = manager.load_from_config(&[
            PluginConfigEntry::new("A", "modA"),
            PluginConfigEntry::new("B", "modB").disabled(),
            PluginConfigEntry::new("C", "  "),
        ]);

        assert_eq!(*requests.lock(), ["modA"]);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].loaded, ["A"]);
        assert_eq!(manager.loaded_plugins().len(), 1);
    }

    #[test]
    fn test_configuration_name_takes_precedence() {
        let mut manager = manager(MemoryLoader::new(&[("simple", simple_module)]));

        manager.load_plugin("simple", Some("Configured"));
        manager.load_plugin("simple", None);
        manager.load_plugin("simple", Some(""));

        let names: Vec<_> = manager
            .loaded_plugins()
            .iter()
            .map(PluginAdapter::name)
            .collect();
        assert_eq!(names, ["Configured", "Simple V1", "Simple V1"]);
        let plugin = manager.plugin("Configured").unwrap();
        assert_eq!(plugin.configuration_name(), Some("Configured"));
        assert_eq!(plugin.plugin_type_name(), "Simple V1");
    }

    #[test]
    fn test_name_setter_receives_configuration_name() {
        let mut manager = manager(MemoryLoader::new(&[("mixed", mixed_module)]));

        let report = manager.load_plugin("mixed", Some("Shared"));

        assert_eq!(report.loaded, ["Shared", "Shared"]);
        for plugin in manager.loaded_plugins() {
            assert_eq!(plugin.plugin_type_name(), "Shared");
        }
    }

    #[test]
    fn test_faults_are_contained_per_type() {
        let mut manager = manager(MemoryLoader::new(&[("faulty", faulty_module)]));

        let report = manager.load_plugin("faulty", None);

        assert_eq!(report.discovered, 5);
        assert_eq!(report.loaded, ["Fine"]);
        assert!(matches!(
            report.errors.as_slice(),
            [
                RuntimeError::Initialization { .. },
                RuntimeError::Instantiation { .. },
                RuntimeError::MissingConstructor { .. },
                RuntimeError::UnsupportedInitializerSignature { .. },
            ]
        ));
        // A failed initializer leaves the plugin registered.
        let names: Vec<_> = manager
            .loaded_plugins()
            .iter()
            .map(PluginAdapter::name)
            .collect();
        assert_eq!(names, ["BadInit", "Fine"]);
    }

    #[test]
    fn test_module_failure_does_not_stop_later_modules() {
        let mut manager = manager(MemoryLoader::new(&[("simple", simple_module)]));

        let reports = manager.load_from_config(&[
            PluginConfigEntry::new("Missing", "nowhere"),
            PluginConfigEntry::new("Present", "simple"),
        ]);

        assert!(matches!(
            reports[0].errors.as_slice(),
            [RuntimeError::ModuleLoad { .. }]
        ));
        assert!(reports[0].module.is_none());
        assert!(reports[1].is_success());
        assert_eq!(manager.loaded_plugins().len(), 1);
        assert_eq!(manager.loaded_modules().len(), 1);
    }

    #[test]
    fn test_initializer_receives_registry() {
        let mut empty = PluginManager::new(
            Arc::new(ServiceRegistry::new()),
            MemoryLoader::new(&[("mixed", mixed_module)]),
        );

        let report = empty.load_plugin("mixed", None);

        // "Second" resolves (no parameters) but its initializer finds no hello service.
        assert!(report.loaded.is_empty());
        assert!(
            report
                .errors
                .iter()
                .any(|e| matches!(e, RuntimeError::Initialization { .. }))
        );
    }
}
