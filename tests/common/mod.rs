// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use crontab_controller::cache::{MemoryCache, ResourceCache};
use crontab_controller::crd::{CronTab, CronTabSpec, CronTabStatus};
use crontab_controller::errors::SyncError;
use crontab_controller::keys::ResourceKey;
use crontab_controller::reconcilers::{Reconciler, StatusWriter};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::client::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Build a namespaced `CronTab` with the given generation and resource version.
pub fn crontab(namespace: &str, name: &str, generation: i64, resource_version: &str) -> CronTab {
    let mut ct = CronTab::new(
        name,
        CronTabSpec {
            cron_spec: "*/5 * * * *".to_string(),
            image: "busybox:1.36".to_string(),
            replicas: Some(1),
        },
    );
    ct.metadata.namespace = Some(namespace.to_string());
    ct.metadata.generation = Some(generation);
    ct.metadata.resource_version = Some(resource_version.to_string());
    ct
}

/// Status writer that applies patches to a [`MemoryCache`], standing in for the API
/// server plus the watch that would echo the change back.
pub struct MemoryStatusWriter {
    cache: Arc<MemoryCache<CronTab>>,
    patches: Mutex<Vec<(ResourceKey, CronTabStatus)>>,
}

impl MemoryStatusWriter {
    pub fn new(cache: Arc<MemoryCache<CronTab>>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            patches: Mutex::new(Vec::new()),
        })
    }

    pub fn patches(&self) -> Vec<(ResourceKey, CronTabStatus)> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusWriter for MemoryStatusWriter {
    async fn patch_status(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &CronTabStatus,
    ) -> Result<(), kube::Error> {
        let key = ResourceKey::new(namespace, name);
        self.patches
            .lock()
            .unwrap()
            .push((key, status.clone()));

        let Some(current) = self.cache.get(namespace, name).unwrap() else {
            return Err(kube::Error::Api(
                kube::core::Status::failure(&format!("crontabs \"{name}\" not found"), "NotFound")
                    .with_code(404)
                    .boxed(),
            ));
        };
        let mut updated = (*current).clone();
        updated.status = Some(status.clone());
        self.cache.upsert(updated);
        Ok(())
    }
}

/// Counts calls per key. The first call for `gated_key` parks until [`GatedReconciler::open`].
pub struct GatedReconciler {
    gated_key: Option<ResourceKey>,
    calls: Mutex<HashMap<ResourceKey, usize>>,
    entered: Notify,
    gate: Notify,
}

impl GatedReconciler {
    pub fn new(gated_key: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            gated_key: gated_key.map(ResourceKey::from),
            calls: Mutex::new(HashMap::new()),
            entered: Notify::new(),
            gate: Notify::new(),
        })
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&ResourceKey::from(key))
            .copied()
            .unwrap_or(0)
    }

    /// Wait until the gated call is parked.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl Reconciler for GatedReconciler {
    async fn reconcile(&self, key: &ResourceKey) -> Result<(), SyncError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if call == 1 && self.gated_key.as_ref() == Some(key) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(())
    }
}

/// Poll `condition` every 10ms until it holds, panicking after `limit`.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => {
            println!("✓ Successfully connected to Kubernetes cluster");
            Some(client)
        }
        Err(e) => {
            eprintln!("⊘ Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let mut labels = BTreeMap::new();
    labels.insert("test".to_string(), "integration".to_string());
    labels.insert("managed-by".to_string(), "crontab-controller-test".to_string());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            println!("Deleted test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
