// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the control loop.
//!
//! Errors are split by where they arise:
//! - [`KeyError`] - an object or key string could not be mapped to a [`ResourceKey`]
//! - [`CacheError`] - the local cache could not answer a lookup
//! - [`SyncError`] - a single reconcile failed; contained inside the worker loop
//! - [`ControllerError`] - lifecycle failures surfaced from `Controller::run`
//!
//! Per-key failures never terminate a worker. They are handed to an [`ErrorSink`],
//! an injected capability so tests can capture what was reported.

use crate::keys::ResourceKey;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Errors that can occur while computing or parsing a [`ResourceKey`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The object carries no `metadata.name`, so no stable key exists for it.
    #[error("object has no name")]
    MissingName,

    /// The key string does not have the `<namespace>/<name>` or `<name>` shape.
    #[error("unexpected key format: '{key}'")]
    Malformed {
        /// The offending key string
        key: String,
    },
}

/// Errors reported by a [`crate::cache::ResourceCache`] implementation.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The cache cannot serve reads right now (e.g. its backing store was torn down).
    #[error("cache unavailable: {reason}")]
    Unavailable {
        /// Why the cache could not answer
        reason: String,
    },
}

/// A failed reconcile of one key.
///
/// Every variant carries the key that was being processed. Whether the worker
/// schedules a retry is decided by [`SyncError::is_retryable`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// The queued key could not be split into namespace and name.
    #[error("invalid resource key: {source}")]
    InvalidKey {
        /// The key as it was dequeued
        key: ResourceKey,
        #[source]
        source: KeyError,
    },

    /// The cache lookup failed for a reason other than not-found.
    #[error("failed to read '{key}' from cache: {source}")]
    Cache {
        /// The key being reconciled
        key: ResourceKey,
        #[source]
        source: CacheError,
    },

    /// The cluster API rejected a write made while driving the object to its desired state.
    #[error("API call for '{key}' failed: {source}")]
    Api {
        /// The key being reconciled
        key: ResourceKey,
        #[source]
        source: kube::Error,
    },

    /// The reconcile did not finish within the configured deadline.
    #[error("reconcile of '{key}' timed out after {timeout:?}")]
    Timeout {
        /// The key being reconciled
        key: ResourceKey,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// The reconcile panicked. The worker survives and retries the key.
    #[error("reconcile of '{key}' panicked: {message}")]
    Panicked {
        /// The key being reconciled
        key: ResourceKey,
        /// Panic payload, when it was a string
        message: String,
    },

    /// The key failed more times than the configured retry cutoff and was dropped.
    #[error("giving up on '{key}' after {retries} retries: {last_error}")]
    RetriesExhausted {
        /// The key that was dropped
        key: ResourceKey,
        /// Number of rate-limited requeues already spent on the key
        retries: u32,
        /// Rendered message of the final failure
        last_error: String,
    },
}

impl SyncError {
    /// The key whose reconcile failed.
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        match self {
            Self::InvalidKey { key, .. }
            | Self::Cache { key, .. }
            | Self::Api { key, .. }
            | Self::Timeout { key, .. }
            | Self::Panicked { key, .. }
            | Self::RetriesExhausted { key, .. } => key,
        }
    }

    /// Whether the worker should put the key back with backoff.
    ///
    /// A malformed key never becomes valid, and an exhausted key has already been
    /// given up on; everything else is treated as transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidKey { .. } | Self::RetriesExhausted { .. }
        )
    }

    /// Short category used as the `error_type` metrics label.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidKey { .. } => "invalid_key",
            Self::Cache { .. } => "cache_error",
            Self::Api { .. } => "api_error",
            Self::Timeout { .. } => "timeout",
            Self::Panicked { .. } => "panic",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

/// Errors surfaced by the controller itself.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// An event payload could not be keyed; the event was dropped.
    #[error("dropping event: {0}")]
    Key(#[from] KeyError),

    /// A reconcile failed; the key was retried or dropped per [`SyncError::is_retryable`].
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The cache never reported synced within the startup deadline. Workers were not started.
    #[error("timed out after {timeout:?} waiting for caches to sync")]
    CacheSyncTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// `run` was asked to start with an unusable configuration.
    #[error("invalid controller configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is invalid
        reason: String,
    },
}

impl ControllerError {
    /// Short category used as the `error_type` metrics label.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Key(_) => "keyer_error",
            Self::Sync(err) => err.error_type(),
            Self::CacheSyncTimeout { .. } => "cache_sync_timeout",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }
}

/// Destination for non-fatal errors raised inside the control loop.
///
/// `report` must not block: it is called from the event dispatcher and from workers.
pub trait ErrorSink: Send + Sync {
    fn report(&self, err: &ControllerError);
}

/// Production sink: logs the error and counts it in the `errors_total` metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, err: &ControllerError) {
        error!(error = %err, error_type = err.error_type(), "Controller error");
        crate::metrics::record_error(crate::constants::KIND_CRONTAB, err.error_type());
    }
}

/// Sink that keeps the rendered messages of every reported error.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    reported: Mutex<Vec<String>>,
}

impl CollectingErrorSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages reported so far, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, err: &ControllerError) {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err.to_string());
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
