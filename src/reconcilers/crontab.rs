// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `CronTab` reconciliation.
//!
//! Given a key, the reconciler re-reads the object from the cache (never the event
//! payload), and brings its status in line with its spec:
//!
//! 1. Split the key into namespace and name. A malformed key is permanent.
//! 2. Look the object up in the cache. Not found means it was deleted after the
//!    key was queued: log and succeed.
//! 3. If `metadata.generation` is already recorded in `status.observedGeneration`,
//!    there is nothing to do.
//! 4. Otherwise write `observedGeneration`, `lastSyncedResourceVersion`, and a
//!    `Ready=True` condition through the [`StatusWriter`].
//!
//! Step 3 makes the reconcile idempotent: once the status write lands in the
//! cache, running again is a no-op.

use super::status::update_condition_in_memory;
use super::{should_reconcile, Reconciler};
use crate::cache::ResourceCache;
use crate::constants::{CONDITION_STATUS_TRUE, CONDITION_TYPE_READY, FIELD_MANAGER, REASON_RECONCILED};
use crate::crd::{CronTab, CronTabStatus};
use crate::errors::SyncError;
use crate::keys::{split_meta_namespace_key, ResourceKey};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Writes the status subresource of a `CronTab`.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Persist `status` for the named object.
    ///
    /// # Errors
    ///
    /// Returns the API error unchanged; the caller decides what is retryable.
    async fn patch_status(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &CronTabStatus,
    ) -> Result<(), kube::Error>;
}

#[async_trait]
impl<T: StatusWriter + ?Sized> StatusWriter for Arc<T> {
    async fn patch_status(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &CronTabStatus,
    ) -> Result<(), kube::Error> {
        self.as_ref().patch_status(namespace, name, status).await
    }
}

/// [`StatusWriter`] backed by the cluster API, using a merge patch on `/status`.
#[derive(Clone)]
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &CronTabStatus,
    ) -> Result<(), kube::Error> {
        let api: Api<CronTab> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let patch = json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Compute the status the controller wants `crontab` to carry.
///
/// Existing conditions are kept; the `Ready` condition keeps its transition time
/// when it was already `True`.
#[must_use]
pub fn desired_status(crontab: &CronTab) -> CronTabStatus {
    let mut status = crontab.status.clone().unwrap_or_default();
    let message = match crontab.metadata.generation {
        Some(generation) => format!("Observed generation {generation}"),
        None => "Observed".to_string(),
    };
    update_condition_in_memory(
        &mut status.conditions,
        CONDITION_TYPE_READY,
        CONDITION_STATUS_TRUE,
        REASON_RECONCILED,
        &message,
    );
    status.observed_generation = crontab.metadata.generation;
    status.last_synced_resource_version = crontab.resource_version();
    status
}

/// Reconciler for `CronTab` objects.
pub struct CronTabReconciler<C: ?Sized, W> {
    cache: Arc<C>,
    writer: W,
}

impl<C, W> CronTabReconciler<C, W>
where
    C: ResourceCache<CronTab> + ?Sized,
    W: StatusWriter,
{
    pub fn new(cache: Arc<C>, writer: W) -> Self {
        Self { cache, writer }
    }
}

#[async_trait]
impl<C, W> Reconciler for CronTabReconciler<C, W>
where
    C: ResourceCache<CronTab> + ?Sized + 'static,
    W: StatusWriter + 'static,
{
    async fn reconcile(&self, key: &ResourceKey) -> Result<(), SyncError> {
        let (namespace, name) =
            split_meta_namespace_key(key.as_str()).map_err(|source| SyncError::InvalidKey {
                key: key.clone(),
                source,
            })?;

        let cached = self
            .cache
            .get(namespace.as_deref(), &name)
            .map_err(|source| SyncError::Cache {
                key: key.clone(),
                source,
            })?;

        let Some(crontab) = cached else {
            info!(key = %key, "CronTab no longer exists, nothing to reconcile");
            return Ok(());
        };

        let observed = crontab.status.as_ref().and_then(|s| s.observed_generation);
        if !should_reconcile(crontab.metadata.generation, observed) {
            debug!(
                key = %key,
                generation = ?crontab.metadata.generation,
                "Generation already observed, skipping"
            );
            return Ok(());
        }

        let status = desired_status(&crontab);
        match self
            .writer
            .patch_status(namespace.as_deref(), &name, &status)
            .await
        {
            Ok(()) => {
                info!(
                    key = %key,
                    generation = ?status.observed_generation,
                    image = %crontab.spec.image,
                    "Reconciled CronTab"
                );
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                info!(key = %key, "CronTab deleted before its status could be written");
                Ok(())
            }
            Err(source) => Err(SyncError::Api {
                key: key.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[path = "crontab_tests.rs"]
mod crontab_tests;
