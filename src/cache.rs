// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only view of the locally cached cluster state.
//!
//! Workers never talk to the API server to find out what an object should look
//! like; they read the cache by key. Two implementations are provided:
//!
//! - [`StoreCache`] - backed by a `kube` reflector [`Store`] fed by [`crate::informer`]
//! - [`MemoryCache`] - a plain map, for embedding and tests
//!
//! [`wait_for_cache_sync`] is the startup barrier: no worker runs until the cache
//! has completed its first full listing.

use crate::constants::CACHE_SYNC_POLL_INTERVAL_MILLIS;
use crate::errors::{CacheError, ControllerError};
use crate::keys::{meta_namespace_key, ResourceKey};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::Resource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Lookup surface the reconciler relies on.
///
/// Implementations synchronize internally; callers never lock around them.
pub trait ResourceCache<K>: Send + Sync {
    /// Fetch the cached object, `Ok(None)` if it is not present.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the cache cannot answer at all.
    fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, CacheError>;

    /// Whether the initial listing has completed.
    fn has_synced(&self) -> bool;
}

/// Cache backed by a reflector store.
///
/// The synced flag is shared with the [`crate::informer::Informer`] that feeds the store.
pub struct StoreCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store: Store<K>,
    synced: Arc<AtomicBool>,
}

impl<K> StoreCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    #[must_use]
    pub fn new(store: Store<K>, synced: Arc<AtomicBool>) -> Self {
        Self { store, synced }
    }

    /// Snapshot of every cached object.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }
}

impl<K> Clone for StoreCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            synced: Arc::clone(&self.synced),
        }
    }
}

impl<K> ResourceCache<K> for StoreCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, CacheError> {
        let obj_ref = match namespace {
            Some(ns) => ObjectRef::<K>::new(name).within(ns),
            None => ObjectRef::<K>::new(name),
        };
        Ok(self.store.get(&obj_ref))
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Map-backed cache.
pub struct MemoryCache<K> {
    objects: RwLock<HashMap<ResourceKey, Arc<K>>>,
    synced: AtomicBool,
}

impl<K> Default for MemoryCache<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            synced: AtomicBool::new(false),
        }
    }
}

impl<K: Resource> MemoryCache<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object. Objects without a name are ignored.
    pub fn upsert(&self, obj: K) -> Option<ResourceKey> {
        let key = meta_namespace_key(&obj).ok()?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::new(obj));
        Some(key)
    }

    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<K>> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }
}

impl<K> ResourceCache<K> for MemoryCache<K>
where
    K: Send + Sync,
{
    fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<K>>, CacheError> {
        let key = ResourceKey::new(namespace, name);
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned())
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Block until `cache` reports synced, polling every 100ms.
///
/// # Errors
///
/// Returns [`ControllerError::CacheSyncTimeout`] if `timeout` elapses first.
pub async fn wait_for_cache_sync<K, C>(cache: &C, timeout: Duration) -> Result<(), ControllerError>
where
    C: ResourceCache<K> + ?Sized,
{
    let poll = async {
        let mut interval =
            tokio::time::interval(Duration::from_millis(CACHE_SYNC_POLL_INTERVAL_MILLIS));
        loop {
            interval.tick().await;
            if cache.has_synced() {
                return;
            }
            debug!("Waiting for caches to sync");
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(()) => {
            info!("Caches synced");
            Ok(())
        }
        Err(_) => Err(ControllerError::CacheSyncTimeout { timeout }),
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
