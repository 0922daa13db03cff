//! Capability-keyed service lookup.
//!
//! A service is registered as an `Arc<T>`, where `T` is usually a trait
//! object (`dyn HelloEventService`).  Its key is the [`ServiceKey`] of `T`:
//! the type's name, plus its `TypeId` for the current build.
//!
//! Plugins loaded from a dynamic library are compiled separately from the
//! host, and `TypeId` values differ between compilations.  Keys therefore
//! compare by type name, and [`ServiceArc::downcast`] only uses the `TypeId`
//! as a fast path.
//!
//! ```rust,ignore
//! let mut registry = ServiceRegistry::new();
//! registry.insert::<dyn HelloEventService>(hello);
//!
//! let provider: &dyn ServiceProvider = &registry;
//! let hello = provider.get::<dyn HelloEventService>().unwrap();
//! ```

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{PluginError, PluginResult};

// =============================================================================
// ServiceKey
// =============================================================================

/// Identity of a service capability.
///
/// Equality and hashing only consider the type name, which stays the same
/// when host and plugin are built separately.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ServiceKey {
    name: &'static str,
    id: TypeId,
}

impl ServiceKey {
    /// Key for the capability type `T` (typically `dyn SomeTrait`).
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    /// The `TypeId` of the capability type in the build that created the key.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified name of the capability type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if both keys were created by the same compilation of
    /// the type.
    pub fn same_build(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// ServiceArc
// =============================================================================

/// A type-erased service together with the key it was created for.
///
/// The erased value is always the `Arc<T>` for the `T` named by the key.
#[repr(C)]
#[derive(Clone)]
pub struct ServiceArc {
    key: ServiceKey,
    value: Arc<dyn Any + Send + Sync>,
}

impl ServiceArc {
    /// Erases `service` under the key of `T`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(service: Arc<T>) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            value: Arc::new(service),
        }
    }

    /// Key of the erased service.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Recovers the `Arc<T>`, or `None` if the service was created for
    /// another type.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        if self.key != ServiceKey::of::<T>() {
            return None;
        }
        if let Some(service) = self.value.downcast_ref::<Arc<T>>() {
            return Some(service.clone());
        }
        // Same type name from another build of `T`.
        // SAFETY: `new` only ever stores an `Arc<T>` for the `T` named by
        // `self.key`, and that name equals the name of the requested `T`.
        let service = Arc::as_ptr(&self.value) as *const Arc<T>;
        Some(unsafe { (*service).clone() })
    }
}

impl fmt::Debug for ServiceArc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceArc").field(&self.key.name).finish()
    }
}

// =============================================================================
// ServiceProvider
// =============================================================================

/// Read-only capability lookup supplied by the host.
///
/// Plugins receive a `&dyn ServiceProvider` in their initializer; the host
/// uses the same trait to resolve constructor parameters.
pub trait ServiceProvider: Send + Sync {
    /// Returns the service registered under `key`, if any.
    fn get_service(&self, key: &ServiceKey) -> Option<ServiceArc>;
}

impl dyn ServiceProvider + '_ {
    /// Typed lookup: returns the `Arc<T>` registered for `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_service(&ServiceKey::of::<T>())
            .and_then(|service| service.downcast::<T>())
    }
}

// =============================================================================
// ServiceRegistry
// =============================================================================

/// The host's service map.
///
/// Built once during bootstrap and shared read-only afterwards; the host owns
/// its lifetime.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<ServiceKey, ServiceArc>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under the key of `T`, returning the service it
    /// replaced, if any.
    pub fn insert<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        service: Arc<T>,
    ) -> Option<ServiceArc> {
        let service = ServiceArc::new(service);
        self.services.insert(service.key(), service)
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.insert(service);
        self
    }

    /// Typed lookup.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&ServiceKey::of::<T>())
            .and_then(ServiceArc::downcast::<T>)
    }

    /// Returns `true` if a service is registered under `key`.
    pub fn contains_key(&self, key: &ServiceKey) -> bool {
        self.services.contains_key(key)
    }

    /// Keys of all registered services, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.services.keys()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceProvider for ServiceRegistry {
    fn get_service(&self, key: &ServiceKey) -> Option<ServiceArc> {
        self.services.get(key).cloned()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.services.keys()).finish()
    }
}

// =============================================================================
// ResolvedArgs
// =============================================================================

/// Constructor arguments resolved by the host, in declared parameter order.
///
/// A plugin's factory consumes them front to back with [`take`](Self::take),
/// naming the same types it declared.
pub struct ResolvedArgs {
    values: VecDeque<ServiceArc>,
}

impl ResolvedArgs {
    /// Wraps an ordered list of resolved services.
    pub fn new(values: Vec<ServiceArc>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Argument list for a parameterless constructor.
    pub fn empty() -> Self {
        Self {
            values: VecDeque::new(),
        }
    }

    /// Number of arguments not yet taken.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when every argument has been taken.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Takes the next argument as an `Arc<T>`.
    pub fn take<T: ?Sized + Send + Sync + 'static>(&mut self) -> PluginResult<Arc<T>> {
        let expected = ServiceKey::of::<T>();
        let value = self
            .values
            .pop_front()
            .ok_or(PluginError::MissingArgument {
                expected: expected.name(),
            })?;

        value.downcast().ok_or(PluginError::ArgumentMismatch {
            expected: expected.name(),
            found: value.key().name(),
        })
    }
}

impl fmt::Debug for ResolvedArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(ServiceArc::key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    trait Counter: Send + Sync {
        fn count(&self) -> usize;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct Fixed(usize);

    // Stands in for `Greeter` as compiled into a separately built plugin.
    mod foreign {
        pub trait Greeter: Send + Sync {
            fn greet(&self) -> String;
        }
    }

    impl foreign::Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    fn foreign_key<T: ?Sized + 'static>() -> ServiceKey {
        ServiceKey {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<dyn foreign::Greeter>(),
        }
    }

    impl Counter for Fixed {
        fn count(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_key_equality_uses_name() {
        let a = ServiceKey::of::<dyn Greeter>();
        let b = ServiceKey::of::<dyn Greeter>();
        assert_eq!(a, b);
        assert!(a.same_build(&b));
        assert_ne!(a, ServiceKey::of::<dyn Counter>());
        assert!(a.name().contains("Greeter"));

        let other_build = foreign_key::<dyn Greeter>();
        assert_eq!(a, other_build);
        assert!(!a.same_build(&other_build));
    }

    #[test]
    fn test_lookup_with_key_from_other_build() {
        let registry = ServiceRegistry::new().with::<dyn Greeter>(Arc::new(English));

        let service = registry
            .get_service(&foreign_key::<dyn Greeter>())
            .unwrap();
        assert_eq!(service.downcast::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_downcast_service_from_other_build() {
        let greeter: Arc<dyn foreign::Greeter> = Arc::new(English);
        let service = ServiceArc {
            key: foreign_key::<dyn Greeter>(),
            value: Arc::new(greeter),
        };

        let greeter = service.downcast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(service.downcast::<dyn Counter>().is_none());

        let mut args = ResolvedArgs::new(vec![service]);
        assert_eq!(args.take::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_registry_typed_lookup() {
        let registry = ServiceRegistry::new().with::<dyn Greeter>(Arc::new(English));

        let greeter = registry.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(registry.get::<dyn Counter>().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_provider_lookup_through_trait_object() {
        let registry = ServiceRegistry::new().with::<dyn Counter>(Arc::new(Fixed(7)));
        let provider: &dyn ServiceProvider = &registry;

        assert_eq!(provider.get::<dyn Counter>().unwrap().count(), 7);
        assert!(provider.get::<dyn Greeter>().is_none());
        assert!(
            provider
                .get_service(&ServiceKey::of::<dyn Counter>())
                .is_some()
        );
    }

    #[test]
    fn test_insert_replaces_previous() {
        let mut registry = ServiceRegistry::new();
        assert!(registry.insert::<dyn Counter>(Arc::new(Fixed(1))).is_none());
        assert!(registry.insert::<dyn Counter>(Arc::new(Fixed(2))).is_some());
        assert_eq!(registry.get::<dyn Counter>().unwrap().count(), 2);
    }

    #[test]
    fn test_resolved_args_in_order() {
        let registry = ServiceRegistry::new()
            .with::<dyn Greeter>(Arc::new(English))
            .with::<dyn Counter>(Arc::new(Fixed(3)));
        let mut args = ResolvedArgs::new(vec![
            registry
                .get_service(&ServiceKey::of::<dyn Greeter>())
                .unwrap(),
            registry
                .get_service(&ServiceKey::of::<dyn Counter>())
                .unwrap(),
        ]);

        assert_eq!(args.take::<dyn Greeter>().unwrap().greet(), "hello");
        assert_eq!(args.take::<dyn Counter>().unwrap().count(), 3);
        assert!(args.is_empty());
        assert!(matches!(
            args.take::<dyn Counter>(),
            Err(PluginError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_resolved_args_type_mismatch() {
        let mut args = ResolvedArgs::new(vec![ServiceArc::new::<dyn Greeter>(Arc::new(English))]);

        assert!(matches!(
            args.take::<dyn Counter>(),
            Err(PluginError::ArgumentMismatch { .. })
        ));
    }
}
