// Configuration management for the Keystone dispatch framework

pub mod config_service;
pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use config_service::{ConfigService, ConfigServiceBuilder};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::KeystoneConfig;
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Layered key/value store; later loads override earlier ones.
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only environment variables starting with `prefix` are loaded.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let vars = EnvLoader::new(self.env_prefix.clone()).load()?;
        self.extend(vars.into_iter().map(|(k, v)| (k, Value::String(v))));
        Ok(())
    }

    /// Load a `.env` file into the process environment, then the environment.
    ///
    /// Without a path a missing `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        self.load_env()
    }

    /// Load the top-level keys of a configuration file.
    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path)?;
        self.load_value(data)
    }

    /// Load the top-level keys of an object value.
    pub fn load_value(&self, data: Value) -> Result<()> {
        match data {
            Value::Object(map) => {
                self.extend(map);
                Ok(())
            }
            other => Err(ConfigError::ParseError(format!(
                "configuration root must be an object, found {}",
                other
            ))),
        }
    }

    fn extend(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.config.write().extend(entries);
    }

    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        self.config.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .config
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    /// The value under `key`, or `None` when the key is absent.
    ///
    /// A present value of the wrong shape is still an error.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.config.read().keys().cloned().collect()
    }

    /// Copy every entry of `other` over this manager's entries.
    pub fn merge(&self, other: &ConfigManager) {
        let entries: Vec<(String, Value)> = other
            .config
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.extend(entries);
    }

    /// Deserialize every entry as one object and validate it.
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let value = Value::Object(
            self.config
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let validated: T = serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        validated.validate()?;
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("test_key", "test_value").unwrap();

        let value: String = manager.get("test_key").unwrap();
        assert_eq!(value, "test_value");
        assert!(manager.has("test_key"));
        assert!(!manager.has("missing_key"));
    }

    #[test]
    fn test_get_opt() {
        let manager = ConfigManager::new();
        manager.set("limit", "many").unwrap();

        assert_eq!(manager.get_opt::<u64>("missing").unwrap(), None);
        assert!(matches!(
            manager.get_opt::<u64>("limit"),
            Err(ConfigError::DeserializationError(_))
        ));
        assert_eq!(manager.get_or("missing", 7u64), 7);
    }

    #[test]
    fn test_load_value_requires_object() {
        let manager = ConfigManager::new();
        manager
            .load_value(json!({ "dispatch": { "max_body_bytes": 10 } }))
            .unwrap();
        assert!(manager.has("dispatch"));

        assert!(matches!(
            manager.load_value(json!([1, 2])),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_merge_overrides() {
        let base = ConfigManager::new();
        base.set("a", 1).unwrap();
        base.set("b", 1).unwrap();

        let overrides = ConfigManager::new();
        overrides.set("b", 2).unwrap();

        base.merge(&overrides);
        assert_eq!(base.get::<i64>("a").unwrap(), 1);
        assert_eq!(base.get::<i64>("b").unwrap(), 2);
    }
}
