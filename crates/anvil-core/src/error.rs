//! Error types returned by plugin code.
//!
//! Host-side failures (module loading, dependency resolution, ...) live in
//! `anvil-runtime`; this module only covers what a plugin's constructor,
//! initializer or event handler can report back to the host.

use thiserror::Error;

/// Boxed error type accepted from plugin callbacks and event handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that plugin code reports to the host.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A resolved constructor argument was requested as the wrong service type.
    #[error("constructor argument mismatch: expected {expected}, found {found}")]
    ArgumentMismatch {
        /// Service type the plugin asked for.
        expected: &'static str,
        /// Service type that was resolved at this position.
        found: &'static str,
    },

    /// The plugin asked for more constructor arguments than it declared.
    #[error("missing constructor argument: {expected}")]
    MissingArgument {
        /// Service type the plugin asked for.
        expected: &'static str,
    },

    /// An operation was invoked on an instance of a different concrete type.
    #[error("plugin instance is not a {expected}")]
    InstanceMismatch {
        /// Concrete type the operation was declared for.
        expected: &'static str,
    },

    /// Generic failure with a message.
    #[error("{0}")]
    Failed(String),

    /// Any other error raised by plugin code.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl PluginError {
    /// Creates a [`PluginError::Failed`] from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
