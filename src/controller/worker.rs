// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker loop.
//!
//! Each worker repeatedly takes a key from the [`WorkQueue`], runs the
//! [`Reconciler`] on it, and settles the key:
//!
//! | Outcome                         | Queue calls                 | Reported |
//! |---------------------------------|-----------------------------|----------|
//! | success                         | `forget`                    | no       |
//! | retryable error                 | `add_rate_limited`          | yes      |
//! | non-retryable error             | `forget`                    | yes      |
//! | retryable, retry cap reached    | `forget`                    | yes, as `RetriesExhausted` |
//!
//! `done` is always called, including when the reconcile panics or times out.
//! The worker exits once the queue is shut down.

use crate::errors::{ControllerError, ErrorSink, SyncError};
use crate::keys::ResourceKey;
use crate::metrics;
use crate::reconcilers::Reconciler;
use crate::workqueue::WorkQueue;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Calls `done` for the key it guards when dropped.
struct DoneGuard<'a> {
    queue: &'a WorkQueue,
    key: &'a ResourceKey,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One member of the worker pool.
pub struct Worker<R: ?Sized> {
    pub(crate) id: usize,
    pub(crate) kind: String,
    pub(crate) queue: Arc<WorkQueue>,
    pub(crate) reconciler: Arc<R>,
    pub(crate) sink: Arc<dyn ErrorSink>,
    pub(crate) reconcile_timeout: Option<Duration>,
    pub(crate) max_retries: Option<u32>,
}

impl<R: Reconciler + ?Sized> Worker<R> {
    /// Process keys until the queue shuts down.
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");
        while self.process_next_work_item().await {}
        debug!(worker = self.id, "Worker stopped");
    }

    /// Handle a single key. Returns `false` once the queue is shut down.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.queue,
            key: &key,
        };

        let start = Instant::now();
        match self.sync(&key).await {
            Ok(()) => {
                self.queue.forget(&key);
                metrics::record_reconciliation_success(&self.kind, start.elapsed());
                debug!(worker = self.id, key = %key, "Successfully synced");
            }
            Err(err) => {
                metrics::record_reconciliation_error(&self.kind, start.elapsed());
                self.handle_error(&key, err);
            }
        }
        true
    }

    async fn sync(&self, key: &ResourceKey) -> Result<(), SyncError> {
        let reconcile = AssertUnwindSafe(self.reconciler.reconcile(key)).catch_unwind();

        let outcome = match self.reconcile_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, reconcile).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SyncError::Timeout {
                        key: key.clone(),
                        timeout,
                    })
                }
            },
            None => reconcile.await,
        };

        outcome.unwrap_or_else(|payload| {
            Err(SyncError::Panicked {
                key: key.clone(),
                message: panic_message(payload.as_ref()),
            })
        })
    }

    fn handle_error(&self, key: &ResourceKey, err: SyncError) {
        if !err.is_retryable() {
            self.queue.forget(key);
            self.sink.report(&ControllerError::Sync(err));
            return;
        }

        // Retries already spent on this key; watch-driven adds do not count.
        let retries = self.queue.record_failure(key).saturating_sub(1);
        if self.max_retries.is_some_and(|max| retries >= max) {
            warn!(worker = self.id, key = %key, retries, "Dropping key out of the queue");
            self.queue.forget(key);
            self.sink
                .report(&ControllerError::Sync(SyncError::RetriesExhausted {
                    key: key.clone(),
                    retries,
                    last_error: err.to_string(),
                }));
            return;
        }

        metrics::record_reconciliation_requeue(&self.kind, err.error_type());
        self.queue.add_rate_limited(key.clone());
        self.sink.report(&ControllerError::Sync(err));
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod worker_tests;
