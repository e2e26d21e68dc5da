//! Typed settings for the dispatch core.
//!
//! ```toml
//! [dispatch]
//! expose_internal_errors = false
//! max_body_bytes = 1048576
//!
//! [controllers]
//! "app::users::UserController" = "src/users.rs"
//! ```
//!
//! Flat keys override the `dispatch` table, so `KEYSTONE_MAX_BODY_BYTES=4096`
//! works with a `KEYSTONE` prefix.

use crate::{ConfigError, ConfigService, ConfigValidator, Result, Validate};
use keystone_core::{DispatchSettings, SourceManifest};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeystoneConfig {
    pub dispatch: DispatchSettings,
    /// Source files of comment-annotated controllers
    pub controllers: SourceManifest,
}

impl KeystoneConfig {
    /// Read the `dispatch` and `controllers` keys; absent keys keep defaults.
    pub fn from_service(service: &ConfigService) -> Result<Self> {
        let mut dispatch: DispatchSettings = service.get_opt("dispatch")?.unwrap_or_default();
        let controllers: SourceManifest = service.get_opt("controllers")?.unwrap_or_default();

        if let Some(raw) = service.get_opt::<serde_json::Value>("expose_internal_errors")? {
            dispatch.expose_internal_errors = flat_bool("expose_internal_errors", &raw)?;
        }
        if let Some(raw) = service.get_opt::<serde_json::Value>("max_body_bytes")? {
            dispatch.max_body_bytes = Some(flat_usize("max_body_bytes", &raw)?);
        }

        let config = Self {
            dispatch,
            controllers,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Validate for KeystoneConfig {
    fn validate(&self) -> Result<()> {
        if let Some(limit) = self.dispatch.max_body_bytes {
            ConfigValidator::positive(limit, "dispatch.max_body_bytes")?;
        }
        for type_path in self.controllers.type_paths() {
            ConfigValidator::not_empty(type_path, "controllers key")?;
            let file = self
                .controllers
                .file(type_path)
                .map(|path| path.to_string_lossy())
                .unwrap_or_default();
            ConfigValidator::not_empty(&file, type_path)?;
        }
        Ok(())
    }
}

/// Environment values arrive as strings; files may carry real booleans.
fn flat_bool(key: &str, raw: &serde_json::Value) -> Result<bool> {
    match raw {
        serde_json::Value::Bool(value) => Ok(*value),
        serde_json::Value::String(text) => match text.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, raw)),
        },
        _ => Err(invalid(key, raw)),
    }
}

fn flat_usize(key: &str, raw: &serde_json::Value) -> Result<usize> {
    match raw {
        serde_json::Value::Number(number) => number
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid(key, raw)),
        serde_json::Value::String(text) => text.trim().parse().map_err(|_| invalid(key, raw)),
        _ => Err(invalid(key, raw)),
    }
}

fn invalid(key: &str, raw: &serde_json::Value) -> ConfigError {
    ConfigError::ValidationError(format!("invalid value {} for {}", raw, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigLoader, ConfigManager, FileFormat};
    use std::path::Path;

    fn service(toml: &str) -> ConfigService {
        let manager = ConfigManager::new();
        manager
            .load_value(ConfigLoader::new(FileFormat::Toml).parse(toml).unwrap())
            .unwrap();
        ConfigService::from_manager(manager)
    }

    #[test]
    fn test_defaults_when_absent() {
        let config = KeystoneConfig::from_service(&ConfigService::new()).unwrap();
        assert_eq!(config, KeystoneConfig::default());
    }

    #[test]
    fn test_tables() {
        let config = service(
            r#"
            [dispatch]
            expose_internal_errors = true
            max_body_bytes = 2048

            [controllers]
            "app::UserController" = "src/users.rs"
            "#,
        )
        .keystone()
        .unwrap();

        assert!(config.dispatch.expose_internal_errors);
        assert_eq!(config.dispatch.max_body_bytes, Some(2048));
        assert_eq!(
            config.controllers.file("app::UserController"),
            Some(Path::new("src/users.rs"))
        );
    }

    #[test]
    fn test_flat_overrides() {
        let service = service("[dispatch]\nmax_body_bytes = 2048");
        service.manager().set("max_body_bytes", "512").unwrap();
        service.manager().set("expose_internal_errors", "yes").unwrap();

        let config = service.keystone().unwrap();
        assert_eq!(config.dispatch.max_body_bytes, Some(512));
        assert!(config.dispatch.expose_internal_errors);
    }

    #[test]
    fn test_invalid_values() {
        let service = ConfigService::new();
        service.manager().set("max_body_bytes", "lots").unwrap();
        assert!(matches!(
            service.keystone(),
            Err(ConfigError::ValidationError(_))
        ));

        let zero = self::service("[dispatch]\nmax_body_bytes = 0");
        assert!(matches!(
            zero.keystone(),
            Err(ConfigError::ValidationError(_))
        ));

        let shape = self::service("dispatch = 3");
        assert!(matches!(
            shape.keystone(),
            Err(ConfigError::DeserializationError(_))
        ));
    }
}
