//! Typed, namespaced configuration for the transport and both signalling
//! applications. A [`ConfigStore`] holds one [`Realm`] per namespace
//! (conventionally `"natfw"`, `"qos"`, `"transport"`); each realm is a
//! `String`-keyed map of [`ConfigValue`]s. `dump`/`load` round-trip through
//! `serde_json` byte-for-byte rather than a hand-rolled encoder.

#![deny(missing_docs)]

pub mod error;

use std::collections::BTreeMap;
use std::net::IpAddr;

pub use error::ConfigError;

/// A single configuration value. Deliberately closed (no nested maps or
/// lists of lists) — realms are flat key/value stores, not general JSON.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValue {
    /// A boolean flag.
    Bool(bool),
    /// A fixed-width unsigned integer (timeouts, retry limits, ports).
    U64(u64),
    /// A floating-point value (backoff multipliers, rate limits).
    F64(f64),
    /// A UTF-8 string.
    Str(String),
    /// A single host address.
    Addr(IpAddr),
    /// An ordered list of host addresses.
    AddrList(Vec<IpAddr>),
}

impl ConfigValue {
    fn variant_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U64(_) => "u64",
            Self::F64(_) => "f64",
            Self::Str(_) => "str",
            Self::Addr(_) => "addr",
            Self::AddrList(_) => "addr_list",
        }
    }

    /// View as a `bool`, or a [`ConfigError::TypeMismatch`]-shaped `None`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// View as a `u64`.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// View as an `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// View as a `str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// View as a single `IpAddr`.
    #[must_use]
    pub fn as_addr(&self) -> Option<IpAddr> {
        match self {
            Self::Addr(v) => Some(*v),
            _ => None,
        }
    }

    /// View as a list of `IpAddr`.
    #[must_use]
    pub fn as_addr_list(&self) -> Option<&[IpAddr]> {
        match self {
            Self::AddrList(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// One namespaced, ordered map of configuration keys to values. `BTreeMap`
/// rather than `HashMap` so `dump()` is deterministic across runs — the
/// byte-exact round-trip invariant would otherwise depend on hash iteration
/// order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Realm {
    values: BTreeMap<String, ConfigValue>,
}

impl Realm {
    /// An empty realm.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, overwriting any prior value under it.
    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.values.insert(key.into(), value);
    }

    /// Remove a key, returning its prior value if one was set.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.values.remove(key)
    }

    /// Look up a key's raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// All keys currently set, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    fn typed<'a, T>(
        &'a self,
        realm: &str,
        key: &str,
        project: impl Fn(&'a ConfigValue) -> Option<T>,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        let value = self.values.get(key).ok_or_else(|| ConfigError::MissingKey {
            realm: realm.to_string(),
            key: key.to_string(),
        })?;
        project(value).ok_or_else(|| ConfigError::TypeMismatch {
            realm: realm.to_string(),
            key: key.to_string(),
            found: value.variant_name(),
            expected,
        })
    }
}

/// A store of named [`Realm`]s — one per application plus one for the
/// transport. Realms are created implicitly by [`ConfigStore::realm_mut`];
/// there is no separate registration step.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfigStore {
    realms: BTreeMap<String, Realm>,
}

impl ConfigStore {
    /// An empty store with no realms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a realm, if it has ever been created.
    #[must_use]
    pub fn realm(&self, name: &str) -> Option<&Realm> {
        self.realms.get(name)
    }

    /// Mutably borrow a realm, creating it empty on first access.
    pub fn realm_mut(&mut self, name: &str) -> &mut Realm {
        self.realms.entry(name.to_string()).or_default()
    }

    /// Look up a typed value in a named realm, with the errors
    /// [`crate::error::ConfigError`] distinguishes (unknown realm, missing
    /// key, wrong type).
    pub fn get(&self, realm: &str, key: &str) -> Result<&ConfigValue, ConfigError> {
        let r = self.realms.get(realm).ok_or_else(|| ConfigError::UnknownRealm(realm.to_string()))?;
        r.get(key).ok_or_else(|| ConfigError::MissingKey { realm: realm.to_string(), key: key.to_string() })
    }

    /// Look up a `bool` in a named realm.
    pub fn get_bool(&self, realm: &str, key: &str) -> Result<bool, ConfigError> {
        let r = self.realms.get(realm).ok_or_else(|| ConfigError::UnknownRealm(realm.to_string()))?;
        r.typed(realm, key, ConfigValue::as_bool, "bool")
    }

    /// Look up a `u64` in a named realm.
    pub fn get_u64(&self, realm: &str, key: &str) -> Result<u64, ConfigError> {
        let r = self.realms.get(realm).ok_or_else(|| ConfigError::UnknownRealm(realm.to_string()))?;
        r.typed(realm, key, ConfigValue::as_u64, "u64")
    }

    /// Look up an `f64` in a named realm.
    pub fn get_f64(&self, realm: &str, key: &str) -> Result<f64, ConfigError> {
        let r = self.realms.get(realm).ok_or_else(|| ConfigError::UnknownRealm(realm.to_string()))?;
        r.typed(realm, key, ConfigValue::as_f64, "f64")
    }

    /// Look up a `str` in a named realm.
    pub fn get_str<'a>(&'a self, realm: &str, key: &str) -> Result<&'a str, ConfigError> {
        let r = self.realms.get(realm).ok_or_else(|| ConfigError::UnknownRealm(realm.to_string()))?;
        r.typed(realm, key, ConfigValue::as_str, "str")
    }

    /// Serialise the whole store to its deterministic JSON encoding.
    pub fn dump(&self) -> Result<Vec<u8>, ConfigError> {
        serde_json::to_vec(self).map_err(|e| ConfigError::Serde(e.to_string()))
    }

    /// Inverse of [`ConfigStore::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(bytes).map_err(|e| ConfigError::Serde(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn dump_load_round_trips_byte_exact() {
        let mut store = ConfigStore::new();
        let qos = store.realm_mut("qos");
        qos.set("enabled", ConfigValue::Bool(true));
        qos.set("max_lifetime_secs", ConfigValue::U64(3600));
        qos.set("backoff_multiplier", ConfigValue::F64(2.0));
        qos.set("listen", ConfigValue::Addr(IpAddr::V4(Ipv4Addr::new(141, 3, 70, 4))));
        qos.set(
            "peers",
            ConfigValue::AddrList(vec![
                IpAddr::V4(Ipv4Addr::new(141, 3, 70, 5)),
                IpAddr::V4(Ipv4Addr::new(141, 3, 70, 6)),
            ]),
        );

        let first_dump = store.dump().unwrap();
        let reloaded = ConfigStore::load(&first_dump).unwrap();
        assert_eq!(store, reloaded);

        let second_dump = reloaded.dump().unwrap();
        assert_eq!(first_dump, second_dump);
    }

    #[test]
    fn unknown_realm_and_missing_key_are_distinct_errors() {
        let store = ConfigStore::new();
        assert_eq!(store.get_u64("qos", "max_lifetime_secs"), Err(ConfigError::UnknownRealm("qos".to_string())));

        let mut store = ConfigStore::new();
        store.realm_mut("qos");
        assert_eq!(
            store.get_u64("qos", "max_lifetime_secs"),
            Err(ConfigError::MissingKey { realm: "qos".to_string(), key: "max_lifetime_secs".to_string() })
        );
    }

    #[test]
    fn type_mismatch_names_both_variants() {
        let mut store = ConfigStore::new();
        store.realm_mut("transport").set("reliable", ConfigValue::Bool(true));
        let err = store.get_u64("transport", "reliable").unwrap_err();
        assert_eq!(
            err,
            ConfigError::TypeMismatch {
                realm: "transport".to_string(),
                key: "reliable".to_string(),
                found: "bool",
                expected: "u64",
            }
        );
    }

    #[test]
    fn realms_are_independent_namespaces() {
        let mut store = ConfigStore::new();
        store.realm_mut("natfw").set("max_retries", ConfigValue::U64(3));
        store.realm_mut("qos").set("max_retries", ConfigValue::U64(5));
        assert_eq!(store.get_u64("natfw", "max_retries"), Ok(3));
        assert_eq!(store.get_u64("qos", "max_retries"), Ok(5));
    }
}
