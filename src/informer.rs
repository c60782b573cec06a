// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch-backed cache and change notifications.
//!
//! The [`Informer`] runs a `kube` watcher, keeps a reflector [`Store`] current, and
//! turns raw watch events into [`ResourceEvent`]s delivered over an unbounded
//! channel. Sending never blocks, so a slow dispatcher cannot stall the watch.
//!
//! # Event Translation
//!
//! | Watch event            | Emitted                                             |
//! |------------------------|-----------------------------------------------------|
//! | `Apply`                | `Added` if not cached yet, else `Updated { old, new }` |
//! | `Delete`               | `Deleted(Known)`                                    |
//! | `InitApply`            | nothing yet, the object is buffered                 |
//! | `InitDone`             | `Added`/`Updated` per buffered object, then `Deleted(Tombstone)` for objects missing from the relist |
//! | resync tick            | `Updated` with identical old/new for every cached object |
//!
//! Relist notifications go out only after the store holds the relisted state, so
//! a worker woken by one always reads at least that version from the cache.
//! The store is marked synced after the first `InitDone`.

use crate::cache::StoreCache;
use crate::keys::{meta_namespace_key, DeletedObject, Tombstone};
use futures::{Stream, StreamExt};
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::watcher::{self, watcher};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// A change observed in the cache.
#[derive(Debug)]
pub enum ResourceEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(DeletedObject<K>),
}

/// Applies watch events to the store and emits the matching [`ResourceEvent`]s.
pub struct WatchTranslator<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    writer: Writer<K>,
    reader: Store<K>,
    events: UnboundedSender<ResourceEvent<K>>,
    synced: Arc<AtomicBool>,
    /// Objects of the relist in progress, in arrival order.
    relist: Option<Vec<K>>,
}

impl<K> WatchTranslator<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        writer: Writer<K>,
        events: UnboundedSender<ResourceEvent<K>>,
        synced: Arc<AtomicBool>,
    ) -> Self {
        let reader = writer.as_reader();
        Self {
            writer,
            reader,
            events,
            synced,
            relist: None,
        }
    }

    fn emit(&self, event: ResourceEvent<K>) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped, discarding notification");
        }
    }

    fn emit_applied(&self, previous: Option<Arc<K>>, obj: K) {
        let new = Arc::new(obj);
        match previous {
            Some(old) => self.emit(ResourceEvent::Updated { old, new }),
            None => self.emit(ResourceEvent::Added(new)),
        }
    }

    /// Apply one watch event.
    pub fn apply(&mut self, event: watcher::Event<K>) {
        match event {
            watcher::Event::Apply(obj) => {
                let previous = self.reader.get(&ObjectRef::from_obj(&obj));
                self.writer
                    .apply_watcher_event(&watcher::Event::Apply(obj.clone()));
                self.emit_applied(previous, obj);
            }
            watcher::Event::Delete(obj) => {
                self.writer
                    .apply_watcher_event(&watcher::Event::Delete(obj.clone()));
                self.emit(ResourceEvent::Deleted(DeletedObject::Known(Arc::new(obj))));
            }
            watcher::Event::Init => {
                debug!("Relist started");
                self.writer.apply_watcher_event(&watcher::Event::Init);
                self.relist = Some(Vec::new());
            }
            watcher::Event::InitApply(obj) => {
                self.writer
                    .apply_watcher_event(&watcher::Event::InitApply(obj.clone()));
                self.relist.get_or_insert_with(Vec::new).push(obj);
            }
            watcher::Event::InitDone => self.finish_relist(),
        }
    }

    /// Swap the relisted state into the store, then announce the differences.
    fn finish_relist(&mut self) {
        let relisted = self.relist.take().unwrap_or_default();
        let mut previous: HashMap<ObjectRef<K>, Arc<K>> = self
            .reader
            .state()
            .into_iter()
            .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
            .collect();

        self.writer.apply_watcher_event(&watcher::Event::InitDone);

        for obj in relisted {
            let prior = previous.remove(&ObjectRef::from_obj(&obj));
            self.emit_applied(prior, obj);
        }
        for stale in previous.into_values() {
            match meta_namespace_key(stale.as_ref()) {
                Ok(key) => {
                    debug!(key = %key, "Object vanished during relist");
                    self.emit(ResourceEvent::Deleted(DeletedObject::Tombstone(Tombstone {
                        key,
                        last_known: Some(stale),
                    })));
                }
                Err(e) => warn!(error = %e, "Cannot key vanished object"),
            }
        }

        if !self.synced.swap(true, Ordering::AcqRel) {
            info!(objects = self.reader.state().len(), "Initial list complete, cache synced");
        }
    }

    /// Re-announce every cached object with identical old and new payloads.
    pub fn resync(&self) {
        let objects = self.reader.state();
        debug!(objects = objects.len(), "Resyncing cache");
        for obj in objects {
            self.emit(ResourceEvent::Updated {
                old: Arc::clone(&obj),
                new: obj,
            });
        }
    }
}

/// Watches one resource type and keeps a local cache of it.
pub struct Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    api: Api<K>,
    config: watcher::Config,
    resync_period: Option<Duration>,
    translator: WatchTranslator<K>,
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    /// Create the informer, its cache, and the event stream consumed by the controller.
    ///
    /// A `resync_period` of `None` disables periodic resync.
    #[must_use]
    pub fn new(
        api: Api<K>,
        config: watcher::Config,
        resync_period: Option<Duration>,
    ) -> (Self, StoreCache<K>, UnboundedReceiver<ResourceEvent<K>>) {
        let (store, writer) = reflector::store::<K>();
        let synced = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let informer = Self {
            api,
            config,
            resync_period,
            translator: WatchTranslator::new(writer, tx, Arc::clone(&synced)),
        };
        (informer, StoreCache::new(store, synced), rx)
    }

    /// Run the watch loop. Returns when the watch stream ends.
    pub async fn run(self) {
        let stream = watcher(self.api, self.config).default_backoff();
        drive(stream, self.translator, self.resync_period).await;
    }
}

async fn drive<K, S>(stream: S, mut translator: WatchTranslator<K>, resync_period: Option<Duration>)
where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
{
    futures::pin_mut!(stream);
    let mut resync = resync_period.filter(|p| !p.is_zero()).map(|period| {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    loop {
        let tick = async {
            match resync.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(event)) => translator.apply(event),
                Some(Err(e)) => warn!(error = %e, "Watch stream error, retrying with backoff"),
                None => {
                    warn!("Watch stream ended");
                    return;
                }
            },
            () = tick => translator.resync(),
        }
    }
}

#[cfg(test)]
#[path = "informer_tests.rs"]
mod informer_tests;
