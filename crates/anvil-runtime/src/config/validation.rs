//! Configuration validation utilities.

use tracing::warn;

use super::error::{ConfigError, ConfigResult};
use super::schema::{EventsConfig, HostConfig, LogOutput, LoggingConfig, PluginConfigEntry};

/// Validates the entire configuration.
///
/// Plugin entries are only checked for things worth a warning: disabled
/// entries and entries without a path are skipped at load time anyway.
pub fn validate_config(config: &HostConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_events_config(&config.events)?;
    inspect_plugin_entries(&config.plugin_settings.plugins);
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        warn!("logging.output is 'file' but no logging.file_path is set, stdout will be used");
    }

    Ok(())
}

fn validate_events_config(events: &EventsConfig) -> ConfigResult<()> {
    if events.hello_interval_ms == 0 {
        return Err(ConfigError::validation(
            "events.hello_interval_ms must be greater than 0",
        ));
    }

    if events.world_interval_ms == 0 {
        return Err(ConfigError::validation(
            "events.world_interval_ms must be greater than 0",
        ));
    }

    Ok(())
}

fn inspect_plugin_entries(entries: &[PluginConfigEntry]) {
    for (index, entry) in entries.iter().enumerate() {
        if entry.enabled && entry.path.trim().is_empty() {
            warn!(
                index,
                plugin = %entry.name,
                "Plugin entry has no path and will be skipped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&HostConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = HostConfig::default();
        config.events.world_interval_ms = 0;

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("world_interval_ms"));
    }

    #[test]
    fn test_zero_max_files_rejected() {
        let mut config = HostConfig::default();
        config.logging.max_files = 0;

        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_odd_plugin_entries_only_warn() {
        let mut config = HostConfig::default();
        config.plugin_settings.plugins = vec![
            PluginConfigEntry::new("NoPath", ""),
            PluginConfigEntry::new("Off", "libs/off.so").disabled(),
        ];

        assert!(validate_config(&config).is_ok());
    }
}
