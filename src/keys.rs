// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object keys.
//!
//! The work queue carries keys, never object payloads. A key is
//! `"<namespace>/<name>"` for namespaced objects and bare `"<name>"` for
//! cluster-scoped ones. Workers re-read the object from the cache by key, so a
//! key enqueued for a stale event still reconciles the latest state.

use crate::errors::KeyError;
use kube::Resource;
use std::fmt;
use std::sync::Arc;

/// Stable, collision-free identity of a watched object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        match namespace {
            Some(ns) if !ns.is_empty() => Self(format!("{ns}/{name}")),
            _ => Self(name.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part, or `None` for a cluster-scoped key.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once('/').map(|(ns, _)| ns)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Final state of an object whose deletion was not observed directly.
///
/// Produced when a relist shows an object is gone but the watch never delivered
/// its delete event. The key was computed while the object was still cached.
#[derive(Debug)]
pub struct Tombstone<K> {
    pub key: ResourceKey,
    /// Last copy the cache held, if any.
    pub last_known: Option<Arc<K>>,
}

impl<K> Clone for Tombstone<K> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            last_known: self.last_known.clone(),
        }
    }
}

/// Payload of a delete notification.
#[derive(Debug)]
pub enum DeletedObject<K> {
    /// The watch delivered the delete with the object's final state.
    Known(Arc<K>),
    /// The delete was inferred during a relist.
    Tombstone(Tombstone<K>),
}

impl<K> Clone for DeletedObject<K> {
    fn clone(&self) -> Self {
        match self {
            Self::Known(obj) => Self::Known(Arc::clone(obj)),
            Self::Tombstone(t) => Self::Tombstone(t.clone()),
        }
    }
}

/// Compute the key of an object from its metadata.
///
/// # Errors
///
/// Returns [`KeyError::MissingName`] when the object has no name.
pub fn meta_namespace_key<K: Resource>(obj: &K) -> Result<ResourceKey, KeyError> {
    let meta = obj.meta();
    let name = meta
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(KeyError::MissingName)?;
    Ok(ResourceKey::new(meta.namespace.as_deref(), name))
}

/// Compute the key of a deleted object, accepting tombstones.
///
/// # Errors
///
/// Returns [`KeyError::MissingName`] when a directly observed delete carries no name.
pub fn deletion_handling_key<K: Resource>(obj: &DeletedObject<K>) -> Result<ResourceKey, KeyError> {
    match obj {
        DeletedObject::Tombstone(tombstone) => Ok(tombstone.key.clone()),
        DeletedObject::Known(obj) => meta_namespace_key(obj.as_ref()),
    }
}

/// Split a key string into its namespace and name.
///
/// # Errors
///
/// Returns [`KeyError::Malformed`] for more than two segments or an empty name.
pub fn split_meta_namespace_key(key: &str) -> Result<(Option<String>, String), KeyError> {
    let malformed = || KeyError::Malformed {
        key: key.to_string(),
    };

    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) if !name.is_empty() => Ok((None, name.to_string())),
        (Some(ns), Some(name), None) if !name.is_empty() => {
            let namespace = (!ns.is_empty()).then(|| ns.to_string());
            Ok((namespace, name.to_string()))
        }
        _ => Err(malformed()),
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod keys_tests;
