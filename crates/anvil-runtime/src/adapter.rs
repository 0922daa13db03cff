//! Uniform wrapper around a structurally-matched plugin instance.
//!
//! The adapter verifies the initializer's calling convention once, at
//! construction, and afterwards only exposes what it verified.  Calls into
//! plugin code are guarded with `catch_unwind`.
//!
//! Name precedence: [`PluginAdapter::name`] is the configuration name when one
//! was given, otherwise the instance's own name, otherwise the type name.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anvil_core::{InstanceBox, ServiceKey, ServiceProvider, TypeDescriptor};
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult, panic_message};
use crate::loader::LoadedModule;

/// How the plugin's initializer is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitConvention {
    /// `initialize()`
    Parameterless,
    /// `initialize(&dyn ServiceProvider)`
    WithServices,
}

impl InitConvention {
    /// Selects the convention from the declared initializer parameters.
    pub fn detect(descriptor: &TypeDescriptor) -> RuntimeResult<Self> {
        let unsupported = |parameters: String| RuntimeError::UnsupportedInitializerSignature {
            plugin_type: descriptor.type_name().to_string(),
            parameters,
        };

        let initializer = descriptor
            .get_initializer()
            .ok_or_else(|| unsupported("no initializer".to_string()))?;

        match initializer.parameters() {
            [] => Ok(Self::Parameterless),
            [key] if *key == ServiceKey::of::<dyn ServiceProvider>() => Ok(Self::WithServices),
            other => Err(unsupported(
                other
                    .iter()
                    .map(ServiceKey::name)
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }
}

/// A loaded plugin.
pub struct PluginAdapter {
    configuration_name: Option<String>,
    instance: InstanceBox,
    convention: InitConvention,
    descriptor: Arc<TypeDescriptor>,
    // Declared last: the instance and descriptor run code owned by the module.
    module: Arc<LoadedModule>,
}

impl PluginAdapter {
    /// Wraps `instance`, verifying its initializer signature.
    ///
    /// An empty `configuration_name` counts as none.
    pub fn new(
        instance: InstanceBox,
        descriptor: Arc<TypeDescriptor>,
        module: Arc<LoadedModule>,
        configuration_name: Option<String>,
    ) -> RuntimeResult<Self> {
        let convention = InitConvention::detect(&descriptor)?;
        Ok(Self {
            configuration_name: configuration_name.filter(|name| !name.is_empty()),
            instance,
            convention,
            descriptor,
            module,
        })
    }

    /// Calls the plugin's initializer with the verified convention.
    pub fn initialize(&mut self, services: &dyn ServiceProvider) -> RuntimeResult<()> {
        let plugin = self.name();
        let services = match self.convention {
            InitConvention::Parameterless => None,
            InitConvention::WithServices => Some(services),
        };
        let Some(initializer) = self.descriptor.get_initializer() else {
            return Err(RuntimeError::Initialization {
                plugin,
                reason: "no initializer".to_string(),
            });
        };

        let instance = self.instance.as_mut();
        let reason = match catch_unwind(AssertUnwindSafe(|| initializer.invoke(instance, services))) {
            Ok(Ok(())) => {
                debug!(plugin = %plugin, convention = ?self.convention, "Plugin initialized");
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload)),
        };
        Err(RuntimeError::Initialization { plugin, reason })
    }

    /// Forwards `name` to the instance's name setter.
    ///
    /// Returns `false` when the type has no setter or the setter failed.
    pub fn set_configuration_name(&mut self, name: &str) -> bool {
        let descriptor = &self.descriptor;
        let instance = self.instance.as_mut();
        match catch_unwind(AssertUnwindSafe(|| descriptor.write_name(instance, name))) {
            Ok(None) => false,
            Ok(Some(Ok(()))) => true,
            Ok(Some(Err(e))) => {
                warn!(plugin_type = descriptor.type_name(), error = %e, "Name setter failed");
                false
            }
            Err(payload) => {
                warn!(
                    plugin_type = descriptor.type_name(),
                    error = %panic_message(payload),
                    "Name setter panicked"
                );
                false
            }
        }
    }

    /// Effective name: configuration name, else [`plugin_type_name`](Self::plugin_type_name).
    pub fn name(&self) -> String {
        self.configuration_name
            .clone()
            .unwrap_or_else(|| self.plugin_type_name())
    }

    /// The instance's self-reported name, or the bare type name when it
    /// reports nothing.
    pub fn plugin_type_name(&self) -> String {
        let instance = self.instance.as_ref();
        catch_unwind(AssertUnwindSafe(|| self.descriptor.read_name(instance)))
            .ok()
            .flatten()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.descriptor.type_name().to_string())
    }

    /// Name supplied by the host configuration, if any.
    pub fn configuration_name(&self) -> Option<&str> {
        self.configuration_name.as_deref()
    }

    /// Bare type name from the descriptor.
    pub fn type_name(&self) -> &str {
        self.descriptor.type_name()
    }

    /// Path of the module the plugin came from.
    pub fn module_path(&self) -> &str {
        self.module.path()
    }

    /// Verified initializer convention.
    pub fn convention(&self) -> InitConvention {
        self.convention
    }
}

impl fmt::Debug for PluginAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginAdapter")
            .field("name", &self.name())
            .field("type_name", &self.type_name())
            .field("convention", &self.convention)
            .field("module", &self.module_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use anvil_core::{ModuleDescriptor, PluginError, ServiceRegistry};

    use super::*;

    #[derive(Default)]
    struct Probe {
        label: Option<String>,
        initialized: Arc<AtomicBool>,
    }

    fn module() -> Arc<LoadedModule> {
        Arc::new(LoadedModule::from_descriptor(
            "static:adapter-test",
            ModuleDescriptor::new("adapter-test"),
        ))
    }

    fn probe_type() -> TypeDescriptor {
        TypeDescriptor::new("Probe")
            .initializer(|p: &mut Probe| {
                p.initialized.store(true, Ordering::SeqCst);
                Ok(())
            })
            .name_property(|p: &Probe| p.label.clone().unwrap_or_default())
            .name_setter(|p: &mut Probe, name| p.label = Some(format!("probe:{name}")))
    }

    fn adapter(descriptor: TypeDescriptor, name: Option<&str>) -> PluginAdapter {
        PluginAdapter::new(
            Box::new(Probe::default()),
            Arc::new(descriptor),
            module(),
            name.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn test_detect_conventions() {
        assert_eq!(
            InitConvention::detect(&probe_type()).unwrap(),
            InitConvention::Parameterless
        );
        let with_services = TypeDescriptor::new("WithServices")
            .initializer_with_services(|_: &mut Probe, _| Ok(()));
        assert_eq!(
            InitConvention::detect(&with_services).unwrap(),
            InitConvention::WithServices
        );
    }

    #[test]
    fn test_unsupported_signature_rejected() {
        trait Clock: Send + Sync {}
        let descriptor = TypeDescriptor::new("TwoArgs").raw_initializer(
            vec![
                ServiceKey::of::<dyn ServiceProvider>(),
                ServiceKey::of::<dyn Clock>(),
            ],
            |_, _| Ok(()),
        );

        let result = PluginAdapter::new(Box::new(Probe::default()), Arc::new(descriptor), module(), None);
        match result {
            Err(RuntimeError::UnsupportedInitializerSignature {
                plugin_type,
                parameters,
            }) => {
                assert_eq!(plugin_type, "TwoArgs");
                assert!(parameters.contains("Clock"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_name_precedence() {
        let unnamed = adapter(probe_type(), None);
        assert_eq!(unnamed.name(), "Probe");
        assert_eq!(unnamed.plugin_type_name(), "Probe");

        let blank = adapter(probe_type(), Some(""));
        assert_eq!(blank.configuration_name(), None);

        let mut named = adapter(probe_type(), Some("Primary"));
        assert_eq!(named.name(), "Primary");
        assert!(named.set_configuration_name("Primary"));
        assert_eq!(named.name(), "Primary");
        assert_eq!(named.plugin_type_name(), "probe:Primary");
        assert_eq!(named.type_name(), "Probe");
        assert_eq!(named.module_path(), "static:adapter-test");
    }

    #[test]
    fn test_setter_absent() {
        let descriptor = TypeDescriptor::new("NoSetter")
            .initializer(|_: &mut Probe| Ok(()))
            .name_property(|_: &Probe| "fixed".to_string());
        let mut plugin = adapter(descriptor, None);

        assert!(!plugin.set_configuration_name("ignored"));
        assert_eq!(plugin.name(), "fixed");
    }

    #[test]
    fn test_initialize_parameterless() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut plugin = PluginAdapter::new(
            Box::new(Probe {
                label: None,
                initialized: Arc::clone(&flag),
            }),
            Arc::new(probe_type()),
            module(),
            None,
        )
        .unwrap();

        plugin.initialize(&ServiceRegistry::new()).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_initialize_failure_and_panic() {
        let failing = TypeDescriptor::new("Failing")
            .initializer(|_: &mut Probe| Err(PluginError::failed("not today")));
        let mut plugin = adapter(failing, Some("F"));
        let err = plugin.initialize(&ServiceRegistry::new()).unwrap_err();
        assert!(
            matches!(err, RuntimeError::Initialization { ref plugin, ref reason } if plugin == "F" && reason == "not today")
        );

        let panicking = TypeDescriptor::new("Panicking")
            .initializer_with_services(|_: &mut Probe, _| panic!("init bug"));
        let mut plugin = adapter(panicking, None);
        let err = plugin.initialize(&ServiceRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("init bug"));
    }
}
