//! Runtime error types.
//!
//! Nothing in the load or dispatch path is fatal to the host: the manager and
//! the publishers log these errors and carry on.  They are still returned in
//! [`LoadReport`](crate::manager::LoadReport)s so callers and tests can see
//! exactly what went wrong.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while hosting plugins.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The module could not be loaded (missing file, bad library, missing
    /// entry symbol, null descriptor, unknown static module).
    #[error("Failed to load module '{path}': {reason}")]
    ModuleLoad { path: String, reason: String },

    /// A constructor parameter has no matching service.
    #[error("Cannot resolve service {service} required by plugin type '{plugin_type}'")]
    DependencyUnresolved {
        service: &'static str,
        plugin_type: String,
    },

    /// The initializer takes something other than nothing or the service provider.
    #[error("Plugin type '{plugin_type}' has an unsupported initializer signature ({parameters})")]
    UnsupportedInitializerSignature {
        plugin_type: String,
        parameters: String,
    },

    /// The type matched the plugin shape but exposes no constructor.
    #[error("Plugin type '{plugin_type}' has no constructor")]
    MissingConstructor { plugin_type: String },

    /// The constructor failed or panicked.
    #[error("Failed to instantiate plugin type '{plugin_type}': {reason}")]
    Instantiation { plugin_type: String, reason: String },

    /// The plugin's initializer failed or panicked.
    #[error("Failed to initialize plugin '{plugin}': {reason}")]
    Initialization { plugin: String, reason: String },

    /// A subscriber failed while handling an event.
    #[error("Subscriber #{index} of publisher '{publisher}' failed: {reason}")]
    SubscriberDispatch {
        publisher: &'static str,
        index: usize,
        reason: String,
    },

    /// A publisher was started outside of a tokio runtime.
    #[error("Cannot start publisher '{publisher}': no tokio runtime is active")]
    NoAsyncRuntime { publisher: &'static str },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Creates a module load error.
    pub fn module_load(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
