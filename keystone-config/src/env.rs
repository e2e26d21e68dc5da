// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Environment variable loader
///
/// With a prefix, only `PREFIX_*` variables are kept and the prefix is
/// stripped. Keys are lowercased: `KEYSTONE_MAX_BODY_BYTES` becomes
/// `max_body_bytes`.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load every matching variable of the process environment
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.load_from(env::vars()))
    }

    /// Load every matching variable from an explicit source
    pub fn load_from(
        &self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        vars.into_iter()
            .filter_map(|(key, value)| match &self.prefix {
                Some(prefix) => key
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_lowercase(), value)),
                None => Some((key.to_lowercase(), value)),
            })
            .collect()
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefix_is_stripped() {
        let loader = EnvLoader::new(Some("KEYSTONE".to_string()));
        let loaded = loader.load_from(vars(&[
            ("KEYSTONE_MAX_BODY_BYTES", "1024"),
            ("KEYSTONEX_OTHER", "skip"),
            ("KEYSTONE_", "skip"),
            ("PATH", "/bin"),
        ]));

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("max_body_bytes").map(String::as_str), Some("1024"));
    }

    #[test]
    fn test_without_prefix() {
        let loaded = EnvLoader::default().load_from(vars(&[("HOME", "/root")]));
        assert_eq!(loaded.get("home").map(String::as_str), Some("/root"));
    }

    #[test]
    fn test_missing_var() {
        let loader = EnvLoader::new(Some("KEYSTONE_TEST".to_string()));
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
        assert_eq!(loader.load_var_or("MISSING_VAR_67890", "fallback"), "fallback");
    }
}
