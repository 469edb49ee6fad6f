//! A small, non-global decode registry shared by every nested codec in the
//! NSIS stack (QSPEC parameters, NSLP objects, session-auth attributes).
//!
//! The reference implementation dispatches deserialisation through a
//! process-wide `IEManager` singleton keyed by `(category, type, subtype)`.
//! Here that becomes an explicit value type: [`Registry<K, T, E>`] is built
//! on demand (it is cheap — a couple of hash-map lookups' worth of boxed
//! closures) and passed to `decode` calls instead of reached for globally.
//! Each wire family still ships a `fn default_registry() -> Registry<...>`
//! constructor that callers use unless they need a restricted or custom
//! dispatch table (as the test suite does).

#![deny(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use nsis_buf::NetBuf;

/// Signature every registered decoder implements: given the buffer
/// positioned at the start of the body and the body's declared length,
/// produce the typed value or a family-specific error.
type DecodeFn<T, E> = Arc<dyn Fn(&mut NetBuf, usize) -> Result<T, E> + Send + Sync>;

/// Fallback signature: like [`DecodeFn`] but also receives the key that
/// failed to match, so the fallback can stamp the unknown type/subtype into
/// a raw variant.
type FallbackFn<K, T, E> = Arc<dyn Fn(K, &mut NetBuf, usize) -> Result<T, E> + Send + Sync>;

/// A decode dispatch table keyed by `K` (typically a `(type_code, subtype)`
/// pair), producing values of type `T`, failing with `E`.
///
/// Registries are plain values: construct one, register decoders, hand it
/// to `decode`. There is no global mutable state and no need to `clear()`
/// anything between tests — a test that wants a restricted dispatch table
/// just builds a smaller registry instead of starting from a full one.
pub struct Registry<K, T, E> {
    decoders: HashMap<K, DecodeFn<T, E>>,
    fallback: Option<FallbackFn<K, T, E>>,
}

impl<K, T, E> fmt::Debug for Registry<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.decoders.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<K, T, E> Default for Registry<K, T, E> {
    fn default() -> Self {
        Self { decoders: HashMap::new(), fallback: None }
    }
}

impl<K: Eq + Hash, T, E> Registry<K, T, E> {
    /// An empty registry with no decoders and no fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder for an exact key. Registering the same key twice
    /// replaces the previous decoder (prototypes are owned by the registry,
    /// not shared, so there is no aliasing concern).
    #[must_use]
    pub fn register<F>(mut self, key: K, decode: F) -> Self
    where
        F: Fn(&mut NetBuf, usize) -> Result<T, E> + Send + Sync + 'static,
    {
        self.decoders.insert(key, Arc::new(decode));
        self
    }

    /// Install the category-level fallback consulted when no exact key
    /// matches. Without one, [`Self::decode`] returns `None` for unknown
    /// keys and the caller raises its own `WrongType`-shaped error.
    #[must_use]
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(K, &mut NetBuf, usize) -> Result<T, E> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Dispatch on `key`: call the exact-match decoder if registered,
    /// otherwise the fallback if one is installed. `None` means the key is
    /// unrecognised and there is no fallback to absorb it — a `WrongType`
    /// condition from the caller's point of view.
    pub fn decode(&self, key: K, buf: &mut NetBuf, body_len: usize) -> Option<Result<T, E>>
    where
        K: Copy,
    {
        if let Some(f) = self.decoders.get(&key) {
            return Some(f(buf, body_len));
        }
        self.fallback.as_ref().map(|f| f(key, buf, body_len))
    }

    /// Number of exact-match keys registered (excludes the fallback).
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// True when no exact-match decoders are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Bad,
    }

    #[derive(Debug, PartialEq, Eq)]
    enum TestValue {
        A(u32),
        Raw(u16, Vec<u8>),
    }

    fn build() -> Registry<u16, TestValue, TestError> {
        Registry::new()
            .register(1u16, |buf, _len| buf.read_u32().map(TestValue::A).map_err(|_| TestError::Bad))
            .with_fallback(|key, buf, len| {
                let bytes = buf.read_bytes(len).map_err(|_| TestError::Bad)?;
                Ok(TestValue::Raw(key, bytes))
            })
    }

    #[test]
    fn exact_match_wins_over_fallback() {
        let reg = build();
        let mut buf = NetBuf::new(4);
        buf.write_u32(7).unwrap();
        buf.set_position(0).unwrap();
        assert_eq!(reg.decode(1, &mut buf, 4), Some(Ok(TestValue::A(7))));
    }

    #[test]
    fn unknown_key_falls_back_with_raw_body() {
        let reg = build();
        let mut buf = NetBuf::new(3);
        buf.write_bytes(&[9, 9, 9]).unwrap();
        buf.set_position(0).unwrap();
        assert_eq!(reg.decode(99, &mut buf, 3), Some(Ok(TestValue::Raw(99, vec![9, 9, 9]))));
    }

    #[test]
    fn no_fallback_means_no_match() {
        let reg: Registry<u16, TestValue, TestError> =
            Registry::new().register(1u16, |buf, _| buf.read_u32().map(TestValue::A).map_err(|_| TestError::Bad));
        let mut buf = NetBuf::new(4);
        assert!(reg.decode(2, &mut buf, 4).is_none());
    }
}
