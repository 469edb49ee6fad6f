//! Process-wide key-id -> (key bytes, hash algorithm) map.
//!
//! The reference implementation keeps this as a global keyed by key-id,
//! mutated only by an administrative API and read by every HMAC
//! verification. Here it is an explicit, cloneable handle
//! (`Arc<RwLock<...>>` underneath) that the dispatcher constructs once and
//! hands to every session, rather than a `static`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use zeroize::Zeroizing;

use crate::hmac::TransformId;

#[derive(Clone)]
struct KeyEntry {
    bytes: Zeroizing<Vec<u8>>,
    transform: TransformId,
}

/// A shared, read-mostly map from key-id to the key material and hash
/// algorithm used to compute or verify HMACs with it.
///
/// Cloning a [`KeyRegistry`] clones the handle, not the table: all clones
/// observe the same underlying map, mirroring the reference
/// implementation's single process-wide instance while letting tests build
/// private ones freely.
#[derive(Clone, Default)]
pub struct KeyRegistry {
    inner: Arc<RwLock<HashMap<u32, KeyEntry>>>,
}

impl KeyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the key material and transform for `key_id`.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned (a prior panic while the
    /// lock was held elsewhere in the process).
    #[allow(clippy::expect_used)]
    pub fn store(&self, key_id: u32, key_bytes: Vec<u8>, transform: TransformId) {
        let mut guard = self.inner.write().expect("key registry lock poisoned");
        guard.insert(key_id, KeyEntry { bytes: Zeroizing::new(key_bytes), transform });
    }

    /// Look up `key_id`, returning an owned snapshot of the key bytes and
    /// its transform. `None` means no key is provisioned under that id.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn get(&self, key_id: u32) -> Option<(Vec<u8>, TransformId)> {
        let guard = self.inner.read().expect("key registry lock poisoned");
        guard.get(&key_id).map(|entry| (entry.bytes.to_vec(), entry.transform))
    }

    /// Remove `key_id`, returning `true` if a key was actually present.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn delete(&self, key_id: u32) -> bool {
        let mut guard = self.inner.write().expect("key registry lock poisoned");
        guard.remove(&key_id).is_some()
    }

    /// Number of keys currently provisioned.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.read().expect("key registry lock poisoned").len()
    }

    /// True when no keys are provisioned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_round_trips() {
        let registry = KeyRegistry::new();
        registry.store(7, b"secret-key-material".to_vec(), TransformId::HmacSha1_96);
        let (bytes, transform) = registry.get(7).unwrap();
        assert_eq!(bytes, b"secret-key-material");
        assert_eq!(transform, TransformId::HmacSha1_96);
    }

    #[test]
    fn unknown_key_id_misses() {
        let registry = KeyRegistry::new();
        assert!(registry.get(404).is_none());
    }

    #[test]
    fn delete_removes_and_reports_presence() {
        let registry = KeyRegistry::new();
        registry.store(1, b"k".to_vec(), TransformId::HmacSha1_96);
        assert!(registry.delete(1));
        assert!(!registry.delete(1));
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn clones_share_the_same_table() {
        let registry = KeyRegistry::new();
        let handle = registry.clone();
        handle.store(9, b"shared".to_vec(), TransformId::HmacSha1_96);
        assert_eq!(registry.get(9).unwrap().0, b"shared");
    }
}
