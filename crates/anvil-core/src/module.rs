//! Module and type descriptors: the structural plugin contract.
//!
//! A plugin module never implements a host-defined trait.  Instead it
//! *describes* the types it contains with [`TypeDescriptor`]s, each listing
//! the operations the type exposes:
//!
//! | Capability | Builder method | Required for discovery |
//! |------------|----------------|------------------------|
//! | constructor with service parameters | [`constructor`](TypeDescriptor::constructor) | no (checked at instantiation) |
//! | initializer, no parameters | [`initializer`](TypeDescriptor::initializer) | yes (one of the two) |
//! | initializer taking the services | [`initializer_with_services`](TypeDescriptor::initializer_with_services) | yes (one of the two) |
//! | readable name | [`name_property`](TypeDescriptor::name_property) | yes |
//! | name setter | [`name_setter`](TypeDescriptor::name_setter) | no |
//!
//! The host probes which capabilities are present and only treats concrete
//! types exposing an initializer and a name as plugins.
//!
//! # Exporting a module
//!
//! ```rust,ignore
//! fn build_module() -> ModuleDescriptor {
//!     ModuleDescriptor::new("greeter").with_type(
//!         TypeDescriptor::new("GreeterPlugin")
//!             .constructor([ServiceKey::of::<dyn HelloEventService>()], |args| {
//!                 Ok(GreeterPlugin::new(args.take()?))
//!             })
//!             .initializer_with_services(GreeterPlugin::initialize)
//!             .name_property(|p: &GreeterPlugin| p.name().to_string()),
//!     )
//! }
//!
//! // As a dynamic library (`crate-type = ["cdylib"]`):
//! anvil_core::export_module!(build_module);
//!
//! // Or compiled into the host, addressed as `static:greeter`:
//! anvil_core::static_module!(GREETER_MODULE, "greeter", build_module);
//! ```

use std::any::Any;
use std::fmt;

use linkme::distributed_slice;

use crate::error::{PluginError, PluginResult};
use crate::service::{ResolvedArgs, ServiceKey, ServiceProvider};

/// A type-erased plugin instance.
pub type Instance = dyn Any + Send + Sync;

/// Owned plugin instance, as produced by a [`Constructor`].
pub type InstanceBox = Box<Instance>;

type ConstructFn = Box<dyn Fn(ResolvedArgs) -> PluginResult<InstanceBox> + Send + Sync>;
type InitializeFn =
    Box<dyn Fn(&mut Instance, Option<&dyn ServiceProvider>) -> PluginResult<()> + Send + Sync>;
type NameGetterFn = Box<dyn Fn(&Instance) -> Option<String> + Send + Sync>;
type NameSetterFn = Box<dyn Fn(&mut Instance, &str) -> PluginResult<()> + Send + Sync>;

/// Name of the symbol a dynamic plugin library exports.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"_anvil_module";

/// Signature of the exported module entry point.
///
/// Returns a `Box<ModuleDescriptor>` turned into a raw pointer; the host takes
/// ownership of it.
pub type ModuleEntryFn = extern "C" fn() -> *mut ModuleDescriptor;

fn downcast_mut<T: Any>(instance: &mut Instance) -> PluginResult<&mut T> {
    instance
        .downcast_mut::<T>()
        .ok_or(PluginError::InstanceMismatch {
            expected: std::any::type_name::<T>(),
        })
}

// =============================================================================
// TypeKind
// =============================================================================

/// What kind of type a descriptor describes.
///
/// Only [`TypeKind::Concrete`] types can be instantiated; the others may still
/// be listed by a module (helpers, shared bases) and are skipped by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    /// A type that can be constructed.
    #[default]
    Concrete,
    /// A type that only serves as a base for others.
    Abstract,
    /// A pure interface.
    Interface,
}

// =============================================================================
// Constructor / Initializer
// =============================================================================

/// A constructor: an ordered list of service parameters plus a factory.
pub struct Constructor {
    parameters: Vec<ServiceKey>,
    create: ConstructFn,
}

impl Constructor {
    /// Declared parameters, in order.
    pub fn parameters(&self) -> &[ServiceKey] {
        &self.parameters
    }

    /// Runs the factory with resolved arguments.
    pub fn invoke(&self, args: ResolvedArgs) -> PluginResult<InstanceBox> {
        (self.create)(args)
    }
}

/// An initializer: its declared parameter list plus an invoker.
///
/// The host only supports two shapes: no parameters, or a single
/// `dyn ServiceProvider` parameter.
pub struct Initializer {
    parameters: Vec<ServiceKey>,
    invoke: InitializeFn,
}

impl Initializer {
    /// Declared parameters, in order.
    pub fn parameters(&self) -> &[ServiceKey] {
        &self.parameters
    }

    /// Calls the initializer on `instance`.
    ///
    /// `services` is `None` for the parameterless calling convention.
    pub fn invoke(
        &self,
        instance: &mut Instance,
        services: Option<&dyn ServiceProvider>,
    ) -> PluginResult<()> {
        (self.invoke)(instance, services)
    }
}

// =============================================================================
// TypeDescriptor
// =============================================================================

/// Reflective description of one type inside a module.
pub struct TypeDescriptor {
    type_name: String,
    kind: TypeKind,
    constructor: Option<Constructor>,
    initializer: Option<Initializer>,
    name_getter: Option<NameGetterFn>,
    name_setter: Option<NameSetterFn>,
}

impl TypeDescriptor {
    /// Starts describing a concrete type with no capabilities.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: TypeKind::Concrete,
            constructor: None,
            initializer: None,
            name_getter: None,
            name_setter: None,
        }
    }

    /// Sets the type kind.
    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares the constructor.
    ///
    /// `create` receives the resolved services in the order of `parameters`
    /// and takes them with [`ResolvedArgs::take`].
    pub fn constructor<T, F>(
        mut self,
        parameters: impl IntoIterator<Item = ServiceKey>,
        create: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut ResolvedArgs) -> PluginResult<T> + Send + Sync + 'static,
    {
        self.constructor = Some(Constructor {
            parameters: parameters.into_iter().collect(),
            create: Box::new(move |mut args: ResolvedArgs| {
                create(&mut args).map(|value| Box::new(value) as InstanceBox)
            }),
        });
        self
    }

    /// Declares a parameterless initializer.
    pub fn initializer<T, F>(mut self, init: F) -> Self
    where
        T: Any,
        F: Fn(&mut T) -> PluginResult<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Initializer {
            parameters: Vec::new(),
            invoke: Box::new(
                move |instance: &mut Instance, _services: Option<&dyn ServiceProvider>| {
                    init(downcast_mut::<T>(instance)?)
                },
            ),
        });
        self
    }

    /// Declares an initializer that receives the host's services.
    pub fn initializer_with_services<T, F>(mut self, init: F) -> Self
    where
        T: Any,
        F: Fn(&mut T, &dyn ServiceProvider) -> PluginResult<()> + Send + Sync + 'static,
    {
        let parameter = ServiceKey::of::<dyn ServiceProvider>();
        self.initializer = Some(Initializer {
            parameters: vec![parameter],
            invoke: Box::new(
                move |instance: &mut Instance, services: Option<&dyn ServiceProvider>| {
                    let services = services.ok_or(PluginError::MissingArgument {
                        expected: parameter.name(),
                    })?;
                    init(downcast_mut::<T>(instance)?, services)
                },
            ),
        });
        self
    }

    /// Declares an initializer with an arbitrary parameter list.
    ///
    /// The host rejects any shape other than the two supported ones when it
    /// wraps the instance, so this is mostly useful for describing types the
    /// host must refuse.
    pub fn raw_initializer<F>(mut self, parameters: Vec<ServiceKey>, invoke: F) -> Self
    where
        F: Fn(&mut Instance, Option<&dyn ServiceProvider>) -> PluginResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.initializer = Some(Initializer {
            parameters,
            invoke: Box::new(invoke),
        });
        self
    }

    /// Declares the readable name property.
    pub fn name_property<T, F>(mut self, getter: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.name_getter = Some(Box::new(move |instance: &Instance| {
            instance.downcast_ref::<T>().map(&getter)
        }));
        self
    }

    /// Declares the name setter used to pass a configuration name down.
    pub fn name_setter<T, F>(mut self, setter: F) -> Self
    where
        T: Any,
        F: Fn(&mut T, &str) + Send + Sync + 'static,
    {
        self.name_setter = Some(Box::new(move |instance: &mut Instance, name: &str| {
            setter(downcast_mut::<T>(instance)?, name);
            Ok(())
        }));
        self
    }

    /// The type's bare name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The type's kind.
    pub fn type_kind(&self) -> TypeKind {
        self.kind
    }

    /// The constructor, if the type exposes one.
    pub fn get_constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// The initializer, if the type exposes one.
    pub fn get_initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    /// Returns `true` if the type exposes a readable name.
    pub fn has_name_property(&self) -> bool {
        self.name_getter.is_some()
    }

    /// Returns `true` if the type exposes a name setter.
    pub fn has_name_setter(&self) -> bool {
        self.name_setter.is_some()
    }

    /// Reads the instance's self-reported name.
    ///
    /// `None` when the type has no name property or `instance` is not of this
    /// type.
    pub fn read_name(&self, instance: &Instance) -> Option<String> {
        self.name_getter.as_ref().and_then(|get| get(instance))
    }

    /// Forwards `name` to the instance's setter.
    ///
    /// `None` when the type has no setter.
    pub fn write_name(&self, instance: &mut Instance, name: &str) -> Option<PluginResult<()>> {
        self.name_setter.as_ref().map(|set| set(instance, name))
    }

    /// Structural plugin check: a concrete type exposing an initializer and a
    /// readable name.
    pub fn matches_plugin_shape(&self) -> bool {
        self.kind == TypeKind::Concrete && self.initializer.is_some() && self.name_getter.is_some()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field(
                "constructor",
                &self.constructor.as_ref().map(Constructor::parameters),
            )
            .field(
                "initializer",
                &self.initializer.as_ref().map(Initializer::parameters),
            )
            .field("name_property", &self.has_name_property())
            .field("name_setter", &self.has_name_setter())
            .finish()
    }
}

// =============================================================================
// ModuleDescriptor
// =============================================================================

/// Everything a module exposes to the host.
#[derive(Debug)]
pub struct ModuleDescriptor {
    name: String,
    types: Vec<TypeDescriptor>,
}

impl ModuleDescriptor {
    /// Creates an empty module description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    /// Adds a type (builder style).
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Adds a type.
    pub fn add_type(&mut self, descriptor: TypeDescriptor) {
        self.types.push(descriptor);
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Described types, in declaration order.
    pub fn types(&self) -> &[TypeDescriptor] {
        &self.types
    }

    /// Splits the descriptor into its name and types.
    pub fn into_parts(self) -> (String, Vec<TypeDescriptor>) {
        (self.name, self.types)
    }
}

// =============================================================================
// Static module registry (linkme distributed slice)
// =============================================================================

/// A module compiled into the host binary.
pub struct StaticModule {
    /// Name used in `static:<name>` plugin paths.
    pub name: &'static str,
    /// Builds the module description.
    pub build: fn() -> ModuleDescriptor,
}

/// Registry of modules linked into the binary.
/// Each crate that calls [`static_module!`](crate::static_module) contributes one entry.
#[distributed_slice]
pub static STATIC_MODULES: [StaticModule];

/// Finds a linked module by name.  The first registration wins.
pub fn find_static_module(name: &str) -> Option<&'static StaticModule> {
    STATIC_MODULES.iter().find(|module| module.name == name)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::ServiceRegistry;

    trait Prefix: Send + Sync {
        fn prefix(&self) -> &str;
    }

    struct Dash;

    impl Prefix for Dash {
        fn prefix(&self) -> &str {
            "-"
        }
    }

    struct Sample {
        label: String,
        initialized: bool,
    }

    fn sample_type() -> TypeDescriptor {
        TypeDescriptor::new("Sample")
            .constructor([ServiceKey::of::<dyn Prefix>()], |args| {
                let prefix = args.take::<dyn Prefix>()?;
                Ok(Sample {
                    label: format!("{}sample", prefix.prefix()),
                    initialized: false,
                })
            })
            .initializer(|s: &mut Sample| {
                s.initialized = true;
                Ok(())
            })
            .name_property(|s: &Sample| s.label.clone())
            .name_setter(|s: &mut Sample, name| s.label = name.to_string())
    }

    #[test]
    fn test_plugin_shape_requires_initializer_and_name() {
        assert!(sample_type().matches_plugin_shape());
        assert!(!sample_type().kind(TypeKind::Abstract).matches_plugin_shape());
        assert!(
            !TypeDescriptor::new("NoName")
                .initializer(|_: &mut Sample| Ok(()))
                .matches_plugin_shape()
        );
        assert!(
            !TypeDescriptor::new("NoInit")
                .name_property(|s: &Sample| s.label.clone())
                .matches_plugin_shape()
        );
    }

    #[test]
    fn test_construct_initialize_and_rename() {
        let descriptor = sample_type();
        let registry = ServiceRegistry::new().with::<dyn Prefix>(Arc::new(Dash));
        let key = ServiceKey::of::<dyn Prefix>();
        let args = ResolvedArgs::new(vec![
            crate::service::ServiceProvider::get_service(&registry, &key).unwrap(),
        ]);

        let constructor = descriptor.get_constructor().unwrap();
        assert_eq!(constructor.parameters(), &[key]);
        let mut instance = constructor.invoke(args).unwrap();
        assert_eq!(descriptor.read_name(instance.as_ref()).unwrap(), "-sample");

        let initializer = descriptor.get_initializer().unwrap();
        assert!(initializer.parameters().is_empty());
        initializer.invoke(instance.as_mut(), None).unwrap();
        assert!(instance.downcast_ref::<Sample>().unwrap().initialized);

        descriptor
            .write_name(instance.as_mut(), "renamed")
            .unwrap()
            .unwrap();
        assert_eq!(descriptor.read_name(instance.as_ref()).unwrap(), "renamed");
    }

    #[test]
    fn test_services_initializer_declares_provider_parameter() {
        let descriptor = TypeDescriptor::new("WithServices")
            .initializer_with_services(|_: &mut Sample, _services| Ok(()));
        let initializer = descriptor.get_initializer().unwrap();
        assert_eq!(
            initializer.parameters(),
            &[ServiceKey::of::<dyn ServiceProvider>()]
        );

        let mut instance: InstanceBox = Box::new(Sample {
            label: String::new(),
            initialized: false,
        });
        assert!(matches!(
            initializer.invoke(instance.as_mut(), None),
            Err(PluginError::MissingArgument { .. })
        ));
        let registry = ServiceRegistry::new();
        assert!(initializer.invoke(instance.as_mut(), Some(&registry)).is_ok());
    }

    #[test]
    fn test_operations_reject_foreign_instance() {
        let descriptor = sample_type();
        let mut foreign: InstanceBox = Box::new(42_u32);

        assert!(descriptor.read_name(foreign.as_ref()).is_none());
        let result = descriptor
            .get_initializer()
            .unwrap()
            .invoke(foreign.as_mut(), None);
        assert!(matches!(result, Err(PluginError::InstanceMismatch { .. })));
    }

    #[test]
    fn test_module_descriptor_keeps_order() {
        let module = ModuleDescriptor::new("mod")
            .with_type(TypeDescriptor::new("A"))
            .with_type(TypeDescriptor::new("B"));
        let names: Vec<_> = module.types().iter().map(|t| t.type_name()).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(module.name(), "mod");
    }
}
