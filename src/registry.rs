//! Named lookup tables for pluggable harness components
//!
//! A [`Registry`] maps string keys to factories. Registration happens once at
//! process startup; both duplicate registration and lookup of an absent key
//! fail loudly, since either one indicates a misconfigured harness.
//!
//! Four isolated namespaces exist (engines, hooks, dataset factories,
//! evaluation methods); each is a separately typed `Registry`, assembled in
//! [`crate::api`].

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// String-keyed table of factories of one kind
pub struct Registry<V> {
    name: &'static str,
    entries: BTreeMap<String, V>,
}

impl<V> Registry<V> {
    /// Create an empty registry with a namespace name used in errors
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// Namespace name
    pub fn name(&self) -> &str {
        self.name
    }

    /// Store a mapping, rejecting duplicate keys
    pub fn register(&mut self, key: impl Into<String>, value: V) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey {
                registry: self.name.to_string(),
                key,
            });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Look up a registered value, failing loudly on an unknown key
    pub fn get(&self, key: &str) -> Result<&V> {
        self.entries.get(key).ok_or_else(|| Error::UnknownKey {
            registry: self.name.to_string(),
            key: key.to_string(),
        })
    }

    /// Whether a key is registered
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys in deterministic order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
