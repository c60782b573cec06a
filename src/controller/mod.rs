// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller lifecycle.
//!
//! The [`Controller`] wires the event stream into a [`WorkQueue`] through an
//! [`EventHandler`], waits for the cache to finish its initial listing, runs a
//! pool of [`worker::Worker`]s, and tears everything down on the stop signal.
//!
//! # States
//!
//! ```text
//! Created --run--> Syncing --cache synced--> Running --stop signal--> Draining --> Stopped
//!                     |
//!                     +-- sync timeout (error) or stop signal --> Stopped
//! ```
//!
//! Workers are never started against a cache that has not synced. On stop, event
//! handling ends and the workers keep going until every queued key has been
//! processed, bounded by [`ControllerConfig::drain_timeout`]. Keys still in
//! backoff are left behind. Then the queue is shut down and `run` joins every
//! worker before returning.
//!
//! # Example
//!
//! ```rust,no_run
//! use crontab_controller::config::ControllerConfig;
//! use crontab_controller::controller::Controller;
//! use crontab_controller::crd::CronTab;
//! use crontab_controller::informer::Informer;
//! use crontab_controller::reconcilers::{CronTabReconciler, KubeStatusWriter};
//! use kube::{runtime::watcher, Api, Client};
//! use std::sync::Arc;
//!
//! async fn run(client: Client) -> anyhow::Result<()> {
//!     let config = ControllerConfig::default();
//!     let (informer, cache, events) =
//!         Informer::new(Api::<CronTab>::all(client.clone()), watcher::Config::default(), config.resync_period);
//!     tokio::spawn(informer.run());
//!
//!     let cache = Arc::new(cache);
//!     let reconciler = CronTabReconciler::new(Arc::clone(&cache), KubeStatusWriter::new(client));
//!     let controller = Controller::new(cache, events, Arc::new(reconciler), config.clone());
//!     let stop = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     controller.run(config.workers, stop).await?;
//!     Ok(())
//! }
//! ```

pub mod worker;

use crate::cache::{wait_for_cache_sync, ResourceCache};
use crate::config::ControllerConfig;
use crate::dispatcher::EventHandler;
use crate::errors::{ControllerError, ErrorSink, TracingErrorSink};
use crate::informer::ResourceEvent;
use crate::reconcilers::Reconciler;
use crate::workqueue::WorkQueue;
use kube::Resource;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use worker::Worker;

/// Lifecycle phase of a [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Built, `run` not called yet.
    Created,
    /// Event handling is running; waiting for the cache to sync.
    Syncing,
    /// Workers are processing keys.
    Running,
    /// Stop requested; workers finish queued and in-flight keys.
    Draining,
    /// Queue shut down and all workers joined.
    Stopped,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Syncing => "Syncing",
            Self::Running => "Running",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Control loop for one resource kind.
pub struct Controller<K, C: ?Sized, R: ?Sized> {
    kind: String,
    cache: Arc<C>,
    events: UnboundedReceiver<ResourceEvent<K>>,
    reconciler: Arc<R>,
    queue: Arc<WorkQueue>,
    sink: Arc<dyn ErrorSink>,
    config: ControllerConfig,
    state: watch::Sender<ControllerState>,
    _resource: PhantomData<fn() -> K>,
}

impl<K, C, R> Controller<K, C, R>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
    C: ResourceCache<K> + ?Sized + 'static,
    R: Reconciler + ?Sized,
{
    /// Build a controller reading `events` and reconciling with `reconciler`.
    ///
    /// Errors are logged through [`TracingErrorSink`] unless replaced with
    /// [`Controller::with_error_sink`].
    pub fn new(
        cache: Arc<C>,
        events: UnboundedReceiver<ResourceEvent<K>>,
        reconciler: Arc<R>,
        config: ControllerConfig,
    ) -> Self {
        let kind = K::kind(&()).into_owned();
        let queue = WorkQueue::new(kind.to_lowercase());
        let (state, _) = watch::channel(ControllerState::Created);
        Self {
            kind,
            cache,
            events,
            reconciler,
            queue,
            sink: Arc::new(TracingErrorSink),
            config,
            state,
            _resource: PhantomData,
        }
    }

    /// Report per-key errors to `sink` instead of the log.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use `queue` instead of the default one, e.g. to change rate limiting.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<WorkQueue>) -> Self {
        self.queue = queue;
        self
    }

    /// The queue shared by the dispatcher and the workers.
    #[must_use]
    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::InvalidConfig`] if `workers` is zero
    /// - [`ControllerError::CacheSyncTimeout`] if the cache does not sync in time;
    ///   no worker is started in that case
    pub async fn run<F>(self, workers: usize, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()> + Send,
    {
        let config = ControllerConfig {
            workers,
            ..self.config.clone()
        };
        config.validate()?;

        let Self {
            kind,
            cache,
            events,
            reconciler,
            queue,
            sink,
            state,
            ..
        } = self;
        let set_state = |next: ControllerState| {
            debug!(kind = %kind, state = %next, "Controller state change");
            state.send_replace(next);
        };
        tokio::pin!(shutdown);

        info!(kind = %kind, workers, "Starting controller");
        let handler = EventHandler::new(kind.clone(), Arc::clone(&queue), Arc::clone(&sink));
        let dispatcher = tokio::spawn(handler.run(events));
        set_state(ControllerState::Syncing);

        let synced = tokio::select! {
            result = wait_for_cache_sync::<K, C>(cache.as_ref(), config.cache_sync_timeout) => Some(result),
            () = &mut shutdown => None,
        };
        match synced {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!(kind = %kind, error = %e, "Cache never synced, not starting workers");
                dispatcher.abort();
                queue.shut_down();
                set_state(ControllerState::Stopped);
                return Err(e);
            }
            None => {
                info!(kind = %kind, "Stop requested before cache synced");
                dispatcher.abort();
                queue.shut_down();
                set_state(ControllerState::Stopped);
                return Ok(());
            }
        }

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    kind: kind.clone(),
                    queue: Arc::clone(&queue),
                    reconciler: Arc::clone(&reconciler),
                    sink: Arc::clone(&sink),
                    reconcile_timeout: config.reconcile_timeout,
                    max_retries: config.max_retries,
                };
                tokio::spawn(worker.run())
            })
            .collect();
        set_state(ControllerState::Running);
        info!(kind = %kind, workers, "Workers started");

        shutdown.await;

        set_state(ControllerState::Draining);
        dispatcher.abort();
        info!(
            kind = %kind,
            queued = queue.len(),
            in_flight = queue.in_flight(),
            "Draining work queue"
        );
        let drained = match config.drain_timeout {
            Some(limit) => tokio::time::timeout(limit, queue.wait_idle()).await.is_ok(),
            None => {
                queue.wait_idle().await;
                true
            }
        };
        if !drained {
            warn!(
                kind = %kind,
                abandoned = queue.len(),
                "Drain timed out, abandoning queued keys"
            );
        }

        info!(kind = %kind, in_flight = queue.in_flight(), "Shutting down workers");
        queue.shut_down();

        for (id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(kind = %kind, worker = id, error = %e, "Worker task did not exit cleanly");
            }
        }

        set_state(ControllerState::Stopped);
        info!(kind = %kind, "Controller stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
