//! Module loading.
//!
//! A plugin path names either a dynamic library or a module compiled into the
//! host:
//!
//! | Path | Loader |
//! |------|--------|
//! | `static:<name>` | [`StaticModuleLoader`], looks `<name>` up in [`STATIC_MODULES`](anvil_core::STATIC_MODULES) |
//! | anything else | [`LibraryModuleLoader`], opens the file with `libloading` |
//!
//! Relative library paths are resolved against the configured base directory.
//! A path without an extension is also tried with the platform's library file
//! name, so `plugins/greeter` finds `plugins/libgreeter.so` on Linux.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_core::{MODULE_ENTRY_SYMBOL, ModuleDescriptor, ModuleEntryFn, TypeDescriptor};
use libloading::{Library, Symbol};
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Path prefix selecting a module linked into the host binary.
pub const STATIC_PREFIX: &str = "static:";

/// Loads a module from a configured path.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &str) -> RuntimeResult<LoadedModule>;
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for Box<L> {
    fn load(&self, path: &str) -> RuntimeResult<LoadedModule> {
        (**self).load(path)
    }
}

// =============================================================================
// LoadedModule
// =============================================================================

/// A loaded module: its type descriptors and the library backing them.
///
/// The descriptors' code lives in the library, so the library is declared last
/// and dropped after them.  Adapters keep an `Arc<LoadedModule>` for the same
/// reason.
pub struct LoadedModule {
    name: String,
    path: String,
    types: Vec<Arc<TypeDescriptor>>,
    library: Option<Library>,
}

impl LoadedModule {
    /// Wraps a descriptor built in-process.
    pub fn from_descriptor(path: impl Into<String>, descriptor: ModuleDescriptor) -> Self {
        let (name, types) = descriptor.into_parts();
        Self {
            name,
            path: path.into(),
            types: types.into_iter().map(Arc::new).collect(),
            library: None,
        }
    }

    fn from_library(path: impl Into<String>, descriptor: ModuleDescriptor, library: Library) -> Self {
        let mut module = Self::from_descriptor(path, descriptor);
        module.library = Some(library);
        module
    }

    /// Module name, as reported by the module itself.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the module was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Described types, in declaration order.
    pub fn types(&self) -> &[Arc<TypeDescriptor>] {
        &self.types
    }

    /// Returns `true` if the module came from a dynamic library.
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("types", &self.types.len())
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}

// =============================================================================
// Loaders
// =============================================================================

/// Opens plugin modules from dynamic libraries.
#[derive(Debug, Clone, Default)]
pub struct LibraryModuleLoader {
    base_dir: Option<PathBuf>,
}

impl LibraryModuleLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    /// Maps a configured path to an existing file.
    pub fn resolve_path(&self, path: &str) -> RuntimeResult<PathBuf> {
        let raw = Path::new(path);
        let full = match &self.base_dir {
            Some(base) if raw.is_relative() => base.join(raw),
            _ => raw.to_path_buf(),
        };

        if full.is_file() {
            return Ok(full);
        }

        if full.extension().is_none()
            && let Some(file_name) = full.file_name()
        {
            let candidate = full.with_file_name(libloading::library_filename(file_name));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(RuntimeError::module_load(
            path,
            format!("file not found: {}", full.display()),
        ))
    }
}

impl ModuleLoader for LibraryModuleLoader {
    fn load(&self, path: &str) -> RuntimeResult<LoadedModule> {
        let file = self.resolve_path(path)?;
        debug!(path, file = %file.display(), "Opening plugin library");

        // SAFETY: opening a library runs its initializers. Plugins are trusted
        // code the operator listed in the host configuration.
        let library = unsafe { Library::new(&file) }.map_err(|e| RuntimeError::module_load(path, e))?;

        let raw = {
            // SAFETY: `export_module!` defines the symbol with this exact signature.
            let entry: Symbol<ModuleEntryFn> = unsafe { library.get(MODULE_ENTRY_SYMBOL) }
                .map_err(|e| RuntimeError::module_load(path, e))?;
            entry()
        };
        if raw.is_null() {
            return Err(RuntimeError::module_load(
                path,
                "module entry returned a null descriptor",
            ));
        }
        // SAFETY: non-null pointers returned by the entry come from
        // `Box::into_raw` in `export_module!`, and ownership passes to us.
        let descriptor = unsafe { Box::from_raw(raw) };

        Ok(LoadedModule::from_library(path, *descriptor, library))
    }
}

/// Builds modules registered with [`anvil_core::static_module!`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticModuleLoader;

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, path: &str) -> RuntimeResult<LoadedModule> {
        let name = path.strip_prefix(STATIC_PREFIX).unwrap_or(path);
        let module = anvil_core::find_static_module(name).ok_or_else(|| {
            RuntimeError::module_load(path, format!("no static module named '{name}'"))
        })?;
        debug!(path, module = module.name, "Building static module");
        Ok(LoadedModule::from_descriptor(path, (module.build)()))
    }
}

/// Routes `static:` paths to [`StaticModuleLoader`] and everything else to
/// [`LibraryModuleLoader`].
#[derive(Debug, Clone, Default)]
pub struct DefaultModuleLoader {
    libraries: LibraryModuleLoader,
    statics: StaticModuleLoader,
}

impl DefaultModuleLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self {
            libraries: LibraryModuleLoader::new(base_dir),
            statics: StaticModuleLoader,
        }
    }
}

impl ModuleLoader for DefaultModuleLoader {
    fn load(&self, path: &str) -> RuntimeResult<LoadedModule> {
        if path.starts_with(STATIC_PREFIX) {
            self.statics.load(path)
        } else {
            self.libraries.load(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use anvil_core::TypeKind;

    use super::*;

    fn build_test_module() -> ModuleDescriptor {
        ModuleDescriptor::new("loader-test")
            .with_type(TypeDescriptor::new("Helper").kind(TypeKind::Abstract))
            .with_type(TypeDescriptor::new("Thing"))
    }

    anvil_core::static_module!(LOADER_TEST_MODULE, "loader-test", build_test_module);

    #[test]
    fn test_static_module_lookup() {
        let module = DefaultModuleLoader::default()
            .load("static:loader-test")
            .unwrap();

        assert_eq!(module.name(), "loader-test");
        assert_eq!(module.path(), "static:loader-test");
        assert_eq!(module.types().len(), 2);
        assert!(!module.is_dynamic());
    }

    #[test]
    fn test_unknown_static_module() {
        let err = StaticModuleLoader.load("static:nope").unwrap_err();
        assert!(matches!(err, RuntimeError::ModuleLoad { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_missing_library_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DefaultModuleLoader::new(Some(dir.path().to_path_buf()));

        let err = loader.load("missing.so").unwrap_err();
        assert!(matches!(err, RuntimeError::ModuleLoad { ref path, .. } if path == "missing.so"));
    }

    #[test]
    fn test_resolve_platform_library_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(libloading::library_filename("greeter"));
        std::fs::write(&file, b"").unwrap();
        let loader = LibraryModuleLoader::new(Some(dir.path().to_path_buf()));

        assert_eq!(loader.resolve_path("greeter").unwrap(), file);
        assert_eq!(
            loader.resolve_path(file.to_str().unwrap()).unwrap(),
            file
        );
    }

    #[test]
    fn test_invalid_library_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(libloading::library_filename("garbage"));
        std::fs::write(&file, b"definitely not a shared object").unwrap();
        let loader = LibraryModuleLoader::new(Some(dir.path().to_path_buf()));

        assert!(matches!(
            loader.load("garbage"),
            Err(RuntimeError::ModuleLoad { .. })
        ));
    }
}
