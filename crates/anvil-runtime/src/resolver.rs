//! Constructor dependency resolution.

use anvil_core::{ResolvedArgs, ServiceKey, ServiceProvider};
use tracing::trace;

use crate::error::{RuntimeError, RuntimeResult};

/// Resolves a constructor's declared parameters against a service provider.
///
/// Resolution is total or nothing: the first missing service aborts it, and
/// nothing is cached between calls.
pub struct DependencyResolver<'a> {
    provider: &'a dyn ServiceProvider,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(provider: &'a dyn ServiceProvider) -> Self {
        Self { provider }
    }

    /// Looks up every parameter once, in declared order.
    pub fn resolve(
        &self,
        plugin_type: &str,
        parameters: &[ServiceKey],
    ) -> RuntimeResult<ResolvedArgs> {
        let mut values = Vec::with_capacity(parameters.len());
        for key in parameters {
            let service = self.provider.get_service(key).ok_or_else(|| {
                RuntimeError::DependencyUnresolved {
                    service: key.name(),
                    plugin_type: plugin_type.to_string(),
                }
            })?;
            trace!(plugin_type, service = %key, "Resolved constructor dependency");
            values.push(service);
        }
        Ok(ResolvedArgs::new(values))
    }
}
