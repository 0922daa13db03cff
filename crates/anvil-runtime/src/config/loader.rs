//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: `anvil.toml`, `config.toml`
//! - `yaml-config`: `anvil.yaml`, `anvil.yml`
//! - `json-config`: `anvil.json`, `appsettings.json`
//!
//! Every enabled format is searched; the first base file found per format wins.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`anvil.{profile}.toml`, ...)
//! 3. Main config file (`anvil.toml`, ...)
//! 4. Environment variables (`ANVIL_*`)
//! 5. Programmatic overrides ([`ConfigLoader::merge`], [`ConfigLoader::set`])
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `ANVIL_` prefix with `__` as separator:
//!
//! - `ANVIL_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `ANVIL_EVENTS__HELLO_INTERVAL_MS=1000` → `events.hello_interval_ms = 1000`
//! - `ANVIL_PLUGIN_SETTINGS__BASE_DIR=/opt/plugins` → `plugin_settings.base_dir`
//!
//! # Example
//!
//! ```rust,ignore
//! use anvil_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//!
//! let config = ConfigLoader::new()
//!     .file("./config/anvil.toml")
//!     .without_env()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::{Figment, Provider};
#[cfg(any(
    feature = "toml-config",
    feature = "yaml-config",
    feature = "json-config"
))]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::HostConfig;

/// Environment variable selecting the configuration profile.
pub const PROFILE_ENV: &str = "ANVIL_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Parses a profile name; `prod`/`dev` are accepted as shorthands.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads the profile from `ANVIL_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a provider over every other source.
    ///
    /// Only the keys the provider sets are overridden, so pass a partial
    /// source such as `Serialized::default("events", events)` rather than a
    /// whole [`HostConfig`].
    pub fn merge(mut self, provider: impl Provider) -> Self {
        self.figment = self.figment.merge(provider);
        self
    }

    /// Overrides a single value, addressed by its dotted key path.
    pub fn set(self, key: &str, value: impl Serialize) -> Self {
        self.merge(Serialized::default(key, value))
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<HostConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: HostConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            plugins = config.plugin_settings.plugins.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let overrides = std::mem::take(&mut self.figment);
        let mut figment = Figment::from(Serialized::defaults(HostConfig::default()));

        figment = match self.config_file.take() {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                let format = FileFormat::for_path(&path)?;
                (format.merge)(figment, &path)
            }
            Some(path) => return Err(ConfigError::FileNotFound(path)),
            None => self.merge_search_paths(figment),
        };

        if self.load_env {
            trace!("Loading environment variables with ANVIL_ prefix");
            figment = figment.merge(
                Env::prefixed("ANVIL_")
                    .ignore(&["PROFILE"])
                    .split("__")
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
        }

        Ok(figment.merge(overrides))
    }

    /// Explicit search paths, or the current and user config directories.
    pub(crate) fn search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("anvil")))
            .collect()
    }

    /// For every enabled format, merges the first base file found (and its
    /// profile variant, underneath it).
    fn merge_search_paths(&self, mut figment: Figment) -> Figment {
        let search_paths = self.search_paths();
        let mut found = false;

        for format in FORMATS {
            if let Some(base) = self.find_base_file(format, &search_paths) {
                let profile_file = profile_variant(&base, self.profile.as_str());
                if profile_file.is_file() {
                    debug!(path = %profile_file.display(), "Loading profile-specific config");
                    figment = (format.merge)(figment, &profile_file);
                }
                info!(path = %base.display(), "Loading configuration file");
                figment = (format.merge)(figment, &base);
                found = true;
            }
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }

    fn find_base_file(&self, format: &FileFormat, search_paths: &[PathBuf]) -> Option<PathBuf> {
        search_paths
            .iter()
            .flat_map(|dir| format.base_names.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }
}

/// `anvil.toml` -> `anvil.<profile>.toml`
fn profile_variant(base: &Path, profile: &str) -> PathBuf {
    let stem = base.file_stem().unwrap_or_default().to_string_lossy();
    match base.extension() {
        Some(ext) => base.with_file_name(format!("{stem}.{profile}.{}", ext.to_string_lossy())),
        None => base.with_file_name(format!("{stem}.{profile}")),
    }
}

// =============================================================================
// File formats
// =============================================================================

/// A configuration file format compiled into this build.
struct FileFormat {
    extensions: &'static [&'static str],
    base_names: &'static [&'static str],
    merge: fn(Figment, &Path) -> Figment,
}

impl FileFormat {
    fn for_path(path: &Path) -> ConfigResult<&'static FileFormat> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        FORMATS
            .iter()
            .find(|format| format.extensions.contains(&ext))
            .ok_or_else(|| {
                ConfigError::ParseError(format!(
                    "Unsupported or disabled configuration file format: .{ext}"
                ))
            })
    }
}

/// Enabled formats, in merge order.
static FORMATS: &[FileFormat] = &[
    #[cfg(feature = "toml-config")]
    FileFormat {
        extensions: &["toml"],
        base_names: &["anvil.toml", "config.toml"],
        merge: |figment, path| figment.merge(figment::providers::Toml::file(path)),
    },
    #[cfg(feature = "yaml-config")]
    FileFormat {
        extensions: &["yaml", "yml"],
        base_names: &["anvil.yaml", "anvil.yml"],
        merge: |figment, path| figment.merge(figment::providers::Yaml::file(path)),
    },
    #[cfg(feature = "json-config")]
    FileFormat {
        extensions: &["json"],
        base_names: &["anvil.json", "appsettings.json"],
        merge: |figment, path| figment.merge(figment::providers::Json::file(path)),
    },
];

// =============================================================================
// Tests
// =============================================================================
