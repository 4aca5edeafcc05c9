//! Application settings with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. Built-in defaults
//! 2. Config file: `route-injector.toml` in the working directory, or an explicit path
//! 3. Environment variables: `ROUTE_INJECTOR_*` (`__` separates nested keys)
//!
//! ```toml
//! app_name = "orders"
//! debug = true
//! max_dependency_depth = 64
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [extra]
//! database_url = "postgres://localhost/orders"
//! ```
//!
//! Settings are built once and handed to [`App`](crate::App); handlers and
//! providers receive them through a `Settings`-typed parameter.

use crate::logging::LogFormat;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::Path;

/// Default file name looked up by [`Settings::load`].
pub const CONFIG_FILE: &str = "route-injector.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ROUTE_INJECTOR_";

/// Default limit on nested `Depends` chains.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root settings structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name used in log output.
    pub app_name: String,
    /// Debug mode: error responses carry the full error text.
    pub debug: bool,
    /// Maximum nesting of `Depends` chains accepted at decoration time.
    pub max_dependency_depth: usize,
    pub logging: LogSettings,
    /// Free-form values for application code.
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    pub format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "route-injector".to_string(),
            debug: false,
            max_dependency_depth: DEFAULT_MAX_DEPTH,
            logging: LogSettings::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered resolution (defaults → `route-injector.toml` → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Same as [`load`](Self::load) with an explicit config file.
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(path))
    }

    /// The layered figment used by [`load_from`](Self::load_from).
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract settings from a caller-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(ConfigError::from)
    }

    /// Look up and deserialize a value from `extra`.
    pub fn extra<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_dependency_depth, DEFAULT_MAX_DEPTH);
        assert!(!settings.debug);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_from_figment_layers_toml_over_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(
            Toml::string(
                r#"
                app_name = "orders"
                max_dependency_depth = 8

                [logging]
                format = "pretty"

                [extra]
                region = "eu-west-1"
                "#,
            ),
        );

        let settings = Settings::from_figment(figment).unwrap();
        assert_eq!(settings.app_name, "orders");
        assert_eq!(settings.max_dependency_depth, 8);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.extra::<String>("region").as_deref(), Some("eu-west-1"));
        assert_eq!(settings.extra::<String>("missing"), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debug = true\napp_name = \"from-file\"").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.app_name, "from-file");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.max_dependency_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string("max_dependency_depth = \"deep\""));

        let err = Settings::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("max_dependency_depth"));
    }
}
