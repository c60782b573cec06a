// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event dispatcher: turns cache notifications into queued keys.
//!
//! The dispatcher only computes keys and enqueues them. It never reads the
//! cluster, and it never forwards object payloads to workers.
//!
//! - `Added(obj)` - key and rate-limited add
//! - `Updated { old, new }` - ignored when both carry the same resource version
//!   (a resync, not a change); otherwise handled as an add of `new`
//! - `Deleted(obj)` - keyed with tombstone support, then rate-limited add
//!
//! Objects that cannot be keyed are reported to the error sink and dropped.

use crate::errors::{ControllerError, ErrorSink};
use crate::informer::ResourceEvent;
use crate::keys::{deletion_handling_key, meta_namespace_key, DeletedObject, ResourceKey};
use crate::metrics;
use crate::workqueue::WorkQueue;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

/// Routes watch notifications for one resource kind into a [`WorkQueue`].
#[derive(Clone)]
pub struct EventHandler {
    kind: String,
    queue: Arc<WorkQueue>,
    sink: Arc<dyn ErrorSink>,
}

impl EventHandler {
    #[must_use]
    pub fn new(kind: impl Into<String>, queue: Arc<WorkQueue>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            kind: kind.into(),
            queue,
            sink,
        }
    }

    fn enqueue(&self, key: ResourceKey) {
        trace!(kind = %self.kind, key = %key, "Enqueueing");
        self.queue.add_rate_limited(key);
    }

    pub fn on_add<K: Resource>(&self, obj: &K) {
        match meta_namespace_key(obj) {
            Ok(key) => self.enqueue(key),
            Err(e) => self.sink.report(&ControllerError::Key(e)),
        }
    }

    pub fn on_update<K: Resource>(&self, old: &K, new: &K) {
        if old.resource_version() == new.resource_version() {
            metrics::record_event(&self.kind, "unchanged");
            return;
        }
        self.on_add(new);
    }

    pub fn on_delete<K: Resource>(&self, obj: &DeletedObject<K>) {
        match deletion_handling_key(obj) {
            Ok(key) => self.enqueue(key),
            Err(e) => self.sink.report(&ControllerError::Key(e)),
        }
    }

    pub fn handle<K: Resource>(&self, event: &ResourceEvent<K>) {
        match event {
            ResourceEvent::Added(obj) => {
                metrics::record_event(&self.kind, "added");
                self.on_add(obj.as_ref());
            }
            ResourceEvent::Updated { old, new } => {
                metrics::record_event(&self.kind, "updated");
                self.on_update(old.as_ref(), new.as_ref());
            }
            ResourceEvent::Deleted(obj) => {
                metrics::record_event(&self.kind, "deleted");
                self.on_delete(obj);
            }
        }
    }

    /// Consume events until the sending side is dropped.
    pub async fn run<K: Resource>(self, mut events: UnboundedReceiver<ResourceEvent<K>>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        debug!(kind = %self.kind, "Event stream closed, dispatcher exiting");
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod dispatcher_tests;
