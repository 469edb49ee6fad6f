use thiserror::Error;

/// Failure modes raised by [`crate::ConfigStore`] and its realms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No realm is registered under this name.
    #[error("unknown configuration realm {0:?}")]
    UnknownRealm(String),

    /// A key was requested with a type that doesn't match the stored value.
    #[error("key {key:?} in realm {realm:?} holds a {found} value, not a {expected}")]
    TypeMismatch {
        /// Realm the key was looked up in.
        realm: String,
        /// Key that was looked up.
        key: String,
        /// The `ConfigValue` variant name actually stored.
        found: &'static str,
        /// The variant name the caller expected.
        expected: &'static str,
    },

    /// No value is stored under this key in this realm.
    #[error("no value for key {key:?} in realm {realm:?}")]
    MissingKey {
        /// Realm the key was looked up in.
        realm: String,
        /// Key that was looked up.
        key: String,
    },

    /// `dump`/`load` round trip failed at the `serde_json` layer.
    #[error("configuration store serialisation failed: {0}")]
    Serde(String),
}
