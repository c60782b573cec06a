// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic.
//!
//! A [`Reconciler`] is handed a [`ResourceKey`] by a worker and drives the
//! matching object toward its desired state. It must be idempotent and must
//! re-read the object from the cache rather than trusting any event payload.
//!
//! # Available Reconcilers
//!
//! - [`CronTabReconciler`] - records the observed generation and readiness of `CronTab` objects
//!
//! # Example
//!
//! ```rust,no_run
//! use crontab_controller::cache::MemoryCache;
//! use crontab_controller::crd::CronTab;
//! use crontab_controller::reconcilers::{CronTabReconciler, KubeStatusWriter, Reconciler};
//! use std::sync::Arc;
//!
//! async fn reconcile_one(client: kube::Client) -> anyhow::Result<()> {
//!     let cache = Arc::new(MemoryCache::<CronTab>::new());
//!     let reconciler = CronTabReconciler::new(cache, KubeStatusWriter::new(client));
//!     reconciler.reconcile(&"default/nightly".into()).await?;
//!     Ok(())
//! }
//! ```

pub mod crontab;
pub mod status;

pub use crontab::{desired_status, CronTabReconciler, KubeStatusWriter, StatusWriter};

use crate::errors::SyncError;
use crate::keys::ResourceKey;
use async_trait::async_trait;

/// Sync handler invoked by workers, once per dequeued key.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Bring the object named by `key` to its desired state.
    ///
    /// An object that no longer exists is a success, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the key should be retried (or dropped, per
    /// [`SyncError::is_retryable`]).
    async fn reconcile(&self, key: &ResourceKey) -> Result<(), SyncError>;
}

/// Check if a resource's spec has changed by comparing generation with `observed_generation`.
///
/// The API server bumps `metadata.generation` only when the spec changes, while the
/// controller copies it into `status.observedGeneration` after acting on it.
///
/// # Returns
///
/// * `true` - spec changed, or the object was never reconciled
/// * `false` - spec already observed, or the object has no generation at all
#[must_use]
pub fn should_reconcile(current_generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true, // First reconciliation
        _ => false,              // No generation tracking available
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
