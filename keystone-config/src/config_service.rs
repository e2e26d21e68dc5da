// ConfigService - High-level configuration service

use crate::{ConfigManager, FileFormat, KeystoneConfig, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Read-only view over a loaded [`ConfigManager`].
#[derive(Clone, Default)]
pub struct ConfigService {
    manager: ConfigManager,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manager(manager: ConfigManager) -> Self {
        Self { manager }
    }

    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.manager.get(key)
    }

    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.manager.get_opt(key)
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.manager.get_or(key, default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.manager.get_string(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.manager.get_bool(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.manager.has(key)
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    /// Typed settings for the dispatch core.
    pub fn keystone(&self) -> Result<KeystoneConfig> {
        KeystoneConfig::from_service(self)
    }
}

/// Builder for ConfigService
///
/// Sources are applied in a fixed order: `.env` file, environment, then
/// files in the order they were added. Later sources win.
#[derive(Default)]
pub struct ConfigServiceBuilder {
    manager: ConfigManager,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    config_files: Vec<(PathBuf, Option<FileFormat>)>,
}

impl ConfigServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set environment variable prefix, e.g. `KEYSTONE`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manager = ConfigManager::with_prefix(prefix);
        self
    }

    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    pub fn add_file(mut self, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        self.config_files.push((path.into(), Some(format)));
        self
    }

    /// Add a file whose format follows from its extension
    pub fn add_auto_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push((path.into(), None));
        self
    }

    pub fn build(self) -> Result<ConfigService> {
        if self.load_dotenv {
            self.manager.load_dotenv(self.dotenv_path.as_deref())?;
        } else if self.load_env {
            self.manager.load_env()?;
        }

        for (path, format) in self.config_files {
            let format = match format {
                Some(format) => format,
                None => crate::ConfigLoader::auto(&path)?.format(),
            };
            self.manager.load_file(&path, format)?;
        }

        Ok(ConfigService::from_manager(self.manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    #[test]
    fn test_missing_file_fails_build() {
        let result = ConfigService::builder()
            .add_file("/nonexistent/keystone.json", FileFormat::Json)
            .build();
        assert!(matches!(result, Err(ConfigError::LoadError(_))));

        let result = ConfigService::builder()
            .add_auto_file("/nonexistent/keystone.ini")
            .build();
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_service_reads_manager() {
        let manager = ConfigManager::new();
        manager.set("name", "keystone").unwrap();

        let service = ConfigService::from_manager(manager);
        assert_eq!(service.get_string("name").unwrap(), "keystone");
        assert!(!service.has("missing"));
        assert!(service.get_opt::<String>("missing").unwrap().is_none());
    }
}
