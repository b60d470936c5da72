//! # Configuration
//!
//! LabRS keeps configuration in a minimal string key/value store.
//! Applications layer values however they like (hardcoded defaults,
//! env, a file loader) and subsystems read typed option structs from
//! an immutable snapshot.
//!
//! ## Setting and reading values
//! ```rust
//! use lab_core::LabConfig;
//! let mut config = LabConfig::new();
//!
//! config.set("cache.capacity", "1000");
//! config.set("auth.issuer", "labrs");
//!
//! assert_eq!(config.get("cache.capacity"), Some("1000"));
//! ```
//!
//! ## Environment overrides
//! `load_env` maps prefixed variables onto dotted keys:
//!
//! ```bash
//! export LAB__DATABASE__URL=postgres://localhost/labs
//! export LAB__CACHE__CAPACITY=5000
//! ```
//!
//! becomes `database.url` and `cache.capacity`.
//!
//! Higher-level loaders (TOML, Consul, Vault, ...) are intentionally
//! kept out of the core so each deployment stays free to choose its
//! own strategy.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct LabConfig {
    values: HashMap<String, String>,
}

impl LabConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    ///
    /// Example: config.set("cache.capacity", "1000")
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only if it is not already present.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    ///
    /// Returns None if the key is not present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Load process env vars with the given prefix.
    ///
    /// `LAB__DATABASE__URL` with prefix `LAB__` lands on `database.url`.
    pub fn load_env(&mut self, prefix: &str) {
        for (key, value) in std::env::vars() {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.values.insert(normalized, value);
            }
        }
    }

    pub fn snapshot(&self) -> LabConfigSnapshot {
        LabConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabConfigSnapshot {
    map: HashMap<String, String>,
}

impl LabConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse::<u32>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }

    /// Read a whole-second duration (keys conventionally end in `_secs`).
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_default_does_not_override() {
        let mut config = LabConfig::new();
        config.set("auth.issuer", "labrs");
        config.set_default("auth.issuer", "other");
        config.set_default("auth.audience", "labrs-api");

        assert_eq!(config.get("auth.issuer"), Some("labrs"));
        assert_eq!(config.get("auth.audience"), Some("labrs-api"));
    }

    #[test]
    fn env_vars_map_onto_dotted_keys() {
        std::env::set_var("LABCFGTEST__DATABASE__URL", "postgres://localhost/labs");
        std::env::set_var("LABCFGTEST__CACHE__CAPACITY", "5000");

        let mut config = LabConfig::new();
        config.set_default("cache.capacity", "1000");
        config.load_env("LABCFGTEST__");

        assert_eq!(config.get("database.url"), Some("postgres://localhost/labs"));
        // Env wins over a default.
        assert_eq!(config.get("cache.capacity"), Some("5000"));
    }

    #[test]
    fn snapshot_parses_typed_values() {
        let mut config = LabConfig::new();
        config.set("cache.capacity", "1000");
        config.set("cache.ttl_secs", "300");
        config.set("tenancy.retry", "nope");

        let snap = config.snapshot();
        assert_eq!(snap.get_u64("cache.capacity"), Some(1000));
        assert_eq!(
            snap.get_duration_secs("cache.ttl_secs"),
            Some(Duration::from_secs(300))
        );
        assert_eq!(snap.get_u32("tenancy.retry"), None);
        assert_eq!(snap.get("missing"), None);
    }
}
