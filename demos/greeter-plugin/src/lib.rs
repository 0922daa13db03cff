//! Example plugin module.
//!
//! Built as a `cdylib` it exports `_anvil_module`; linked into a host it is
//! also available as `static:greeter`.
//!
//! | Type | Constructor | Initializer | Name setter |
//! |------|-------------|-------------|-------------|
//! | `GreeterPlugin` | `dyn HelloEventService` | with services | yes |
//! | `LegacyPlugin` | none | parameterless | no |
//! | `GreeterBase` | abstract, never loaded | | |
//!
//! When loaded from a dynamic library the plugin has its own copy of
//! `tracing`, so its log lines only show up if it installs a subscriber.

use std::sync::Arc;

use anvil_core::{
    EventArgs, EventHandler, HelloEventService, ModuleDescriptor, PluginResult, ServiceKey,
    ServiceProvider, TimerEventArgs, TypeDescriptor, TypeKind, WorldEventArgs,
    WorldEventService, handler,
};
use tracing::{info, warn};

const GREETER_TYPE: &str = "Greeter V1";
const LEGACY_TYPE: &str = "Legacy V1";

/// Logs every Hello and World event it receives.
pub struct GreeterPlugin {
    hello: Arc<dyn HelloEventService>,
    world: Option<Arc<dyn WorldEventService>>,
    configuration_name: Option<String>,
    timer_handler: Option<EventHandler<TimerEventArgs>>,
    world_handler: Option<EventHandler<WorldEventArgs>>,
}

impl GreeterPlugin {
    pub fn new(hello: Arc<dyn HelloEventService>) -> Self {
        Self {
            hello,
            world: None,
            configuration_name: None,
            timer_handler: None,
            world_handler: None,
        }
    }

    /// Configured name, or the plugin type.
    pub fn name(&self) -> &str {
        self.configuration_name.as_deref().unwrap_or(GREETER_TYPE)
    }

    pub fn set_configuration_name(&mut self, name: &str) {
        self.configuration_name = Some(name.to_string());
        info!(plugin = name, plugin_type = GREETER_TYPE, "Configuration name set");
    }

    pub fn initialize(&mut self, services: &dyn ServiceProvider) -> PluginResult<()> {
        let name = self.name().to_string();
        info!(plugin = %name, plugin_type = GREETER_TYPE, "Plugin initialized");

        let plugin = name.clone();
        let on_timer = handler(move |_, args: &TimerEventArgs| {
            info!(
                plugin = %plugin,
                text = args.message(),
                timestamp = %args.timestamp(),
                "Received timer event"
            );
            Ok(())
        });
        self.hello.subscribe_to_timer(on_timer.clone());
        self.timer_handler = Some(on_timer);
        info!(plugin = %name, "Subscribed to Hello events");

        match services.get::<dyn WorldEventService>() {
            Some(world) => {
                let plugin = name.clone();
                let on_world = handler(move |_, args: &WorldEventArgs| {
                    info!(
                        plugin = %plugin,
                        world = args.world_message(),
                        timestamp = %args.timestamp(),
                        "Received World update"
                    );
                    Ok(())
                });
                world.subscribe_to_world_updates(on_world.clone());
                info!(plugin = %name, world = %world.get_world_message(), "Current World");
                self.world_handler = Some(on_world);
                self.world = Some(world);
            }
            None => {
                warn!(plugin = %name, "World event service is not available");
            }
        }

        Ok(())
    }
}

impl Drop for GreeterPlugin {
    fn drop(&mut self) {
        if let Some(h) = self.timer_handler.take() {
            self.hello.unsubscribe_from_timer(&h);
        }
        if let (Some(world), Some(h)) = (&self.world, self.world_handler.take()) {
            world.unsubscribe_from_world_updates(&h);
        }
    }
}

/// A plugin with a parameterless initializer and no name setter.
#[derive(Debug, Default)]
pub struct LegacyPlugin {
    initialized: bool,
}

impl LegacyPlugin {
    pub fn initialize(&mut self) -> PluginResult<()> {
        self.initialized = true;
        info!(plugin_type = LEGACY_TYPE, "Legacy plugin initialized");
        Ok(())
    }
}

pub fn build_module() -> ModuleDescriptor {
    ModuleDescriptor::new("greeter")
        .with_type(
            TypeDescriptor::new("GreeterBase")
                .kind(TypeKind::Abstract)
                .initializer_with_services(GreeterPlugin::initialize)
                .name_property(|p: &GreeterPlugin| p.name().to_string()),
        )
        .with_type(
            TypeDescriptor::new("GreeterPlugin")
                .constructor([ServiceKey::of::<dyn HelloEventService>()], |args| {
                    Ok(GreeterPlugin::new(args.take()?))
                })
                .initializer_with_services(GreeterPlugin::initialize)
                .name_property(|p: &GreeterPlugin| p.name().to_string())
                .name_setter(GreeterPlugin::set_configuration_name),
        )
        .with_type(
            TypeDescriptor::new("LegacyPlugin")
                .constructor([], |_| Ok(LegacyPlugin::default()))
                .initializer(LegacyPlugin::initialize)
                .name_property(|_: &LegacyPlugin| LEGACY_TYPE.to_string()),
        )
}

anvil_core::export_module!(build_module);
anvil_core::static_module!(GREETER_MODULE, "greeter", build_module);

#[cfg(test)]
mod tests {
    use anvil_core::{EventSource, ResolvedArgs, ServiceArc, ServiceRegistry};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeHello {
        handlers: Mutex<Vec<EventHandler<TimerEventArgs>>>,
    }

    impl HelloEventService for FakeHello {
        fn subscribe_to_timer(&self, handler: EventHandler<TimerEventArgs>) {
            self.handlers.lock().push(handler);
        }

        fn unsubscribe_from_timer(&self, handler: &EventHandler<TimerEventArgs>) {
            self.handlers.lock().retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    #[derive(Default)]
    struct FakeWorld {
        handlers: Mutex<Vec<EventHandler<WorldEventArgs>>>,
    }

    impl WorldEventService for FakeWorld {
        fn get_world_message(&self) -> String {
            "Earth".to_string()
        }

        fn subscribe_to_world_updates(&self, handler: EventHandler<WorldEventArgs>) {
            self.handlers.lock().push(handler);
        }

        fn unsubscribe_from_world_updates(&self, handler: &EventHandler<WorldEventArgs>) {
            self.handlers.lock().retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    #[test]
    fn test_module_shape() {
        let module = build_module();
        let plugins: Vec<_> = module
            .types()
            .iter()
            .filter(|t| t.matches_plugin_shape())
            .map(|t| t.type_name())
            .collect();
        assert_eq!(plugins, ["GreeterPlugin", "LegacyPlugin"]);
    }

    #[test]
    fn test_greeter_subscribes_and_unsubscribes() {
        let hello = Arc::new(FakeHello::default());
        let world = Arc::new(FakeWorld::default());
        let registry = ServiceRegistry::new()
            .with::<dyn HelloEventService>(hello.clone())
            .with::<dyn WorldEventService>(world.clone());

        let mut plugin = GreeterPlugin::new(hello.clone());
        plugin.set_configuration_name("Primary");
        assert_eq!(plugin.name(), "Primary");
        plugin.initialize(&registry).unwrap();
        assert_eq!(hello.handlers.lock().len(), 1);
        assert_eq!(world.handlers.lock().len(), 1);

        drop(plugin);
        assert!(hello.handlers.lock().is_empty());
        assert!(world.handlers.lock().is_empty());
    }

    #[test]
    fn test_greeter_handlers_accept_events() {
        let hello = Arc::new(FakeHello::default());
        let world = Arc::new(FakeWorld::default());
        let registry = ServiceRegistry::new()
            .with::<dyn HelloEventService>(hello.clone())
            .with::<dyn WorldEventService>(world.clone());

        let mut plugin = GreeterPlugin::new(hello.clone());
        plugin.initialize(&registry).unwrap();

        let source = EventSource::new("test");
        let now = chrono::Local::now();
        let on_timer = hello.handlers.lock()[0].clone();
        assert!(on_timer(&source, &TimerEventArgs::new("Hello", now)).is_ok());
        let on_world = world.handlers.lock()[0].clone();
        assert!(on_world(&source, &WorldEventArgs::new("Galaxy", now)).is_ok());
    }

    #[test]
    fn test_greeter_without_world_service() {
        let hello = Arc::new(FakeHello::default());
        let registry = ServiceRegistry::new().with::<dyn HelloEventService>(hello.clone());

        let mut plugin = GreeterPlugin::new(hello.clone());
        plugin.initialize(&registry).unwrap();
        assert_eq!(plugin.name(), GREETER_TYPE);
        assert_eq!(hello.handlers.lock().len(), 1);
    }

    #[test]
    fn test_descriptor_builds_greeter() {
        let hello: Arc<dyn HelloEventService> = Arc::new(FakeHello::default());
        let module = build_module();
        let descriptor = &module.types()[1];

        let args = ResolvedArgs::new(vec![ServiceArc::new(hello)]);
        let mut instance = descriptor.get_constructor().unwrap().invoke(args).unwrap();
        descriptor
            .write_name(&mut *instance, "FromConfig")
            .unwrap()
            .unwrap();
        assert_eq!(descriptor.read_name(&*instance).unwrap(), "FromConfig");
    }
}
