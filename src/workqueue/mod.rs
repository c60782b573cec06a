// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deduplicating, rate-limited work queue of [`ResourceKey`]s.
//!
//! # Item States
//!
//! ```text
//! absent --add--> queued --get--> processing --done--> absent
//!                                     |   ^
//!                                add  |   | done (re-queued once)
//!                                     v   |
//!                                   processing+dirty
//!
//! absent --add_rate_limited--> backoff --(delay)--> queued
//! ```
//!
//! - A key is never handed to two workers at once: while it is `processing`,
//!   `add` only marks it dirty.
//! - Any number of adds while processing coalesce into a single re-queue on `done`.
//! - A key already `queued` is not queued twice.
//!
//! `get` waits on a [`tokio::sync::Notify`] rather than polling. After
//! [`WorkQueue::shut_down`], every pending and future `get` returns `None` and
//! all adds are ignored. Callers that want queued keys processed first wait on
//! [`WorkQueue::wait_idle`] before shutting down.

pub mod rate_limiter;

use crate::keys::ResourceKey;
use crate::metrics::{
    WORKQUEUE_ADDS_TOTAL, WORKQUEUE_DEPTH, WORKQUEUE_QUEUE_DURATION_SECONDS,
    WORKQUEUE_RETRIES_TOTAL, WORKQUEUE_WORK_DURATION_SECONDS,
};
use rate_limiter::{default_controller_rate_limiter, RateLimiter};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Where a key currently sits in the queue's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Not tracked by the queue.
    Absent,
    /// Waiting in the FIFO.
    Queued,
    /// Handed out by `get`, not yet released by `done`.
    Processing,
    /// Processing, and re-added since; will be re-queued on `done`.
    ProcessingDirty,
    /// Scheduled by a delayed add that has not fired yet.
    Backoff,
}

#[derive(Default)]
struct QueueState {
    fifo: VecDeque<ResourceKey>,
    queued: HashSet<ResourceKey>,
    processing: HashSet<ResourceKey>,
    dirty: HashSet<ResourceKey>,
    /// Earliest pending delayed add per key.
    waiting: HashMap<ResourceKey, Instant>,
    enqueued_at: HashMap<ResourceKey, Instant>,
    started_at: HashMap<ResourceKey, Instant>,
    /// Consecutive reconcile failures per key, independent of event-driven requeues.
    failures: HashMap<ResourceKey, u32>,
    shutting_down: bool,
}

impl QueueState {
    fn enqueue(&mut self, key: ResourceKey) {
        self.enqueued_at.entry(key.clone()).or_insert_with(Instant::now);
        self.queued.insert(key.clone());
        self.fifo.push_back(key);
    }
}

/// Work queue shared between the event dispatcher and the worker pool.
pub struct WorkQueue {
    name: String,
    state: Mutex<QueueState>,
    available: Notify,
    idle: Notify,
    rate_limiter: Box<dyn RateLimiter>,
}

impl WorkQueue {
    /// Create a queue using the standard controller rate limiter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_rate_limiter(name, Box::new(default_controller_rate_limiter()))
    }

    #[must_use]
    pub fn with_rate_limiter(
        name: impl Into<String>,
        rate_limiter: Box<dyn RateLimiter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            idle: Notify::new(),
            rate_limiter,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_add(&self) {
        WORKQUEUE_ADDS_TOTAL
            .with_label_values(&[self.name.as_str()])
            .inc();
    }

    fn publish_depth(&self, state: &QueueState) {
        #[allow(clippy::cast_precision_loss)]
        WORKQUEUE_DEPTH
            .with_label_values(&[self.name.as_str()])
            .set(state.fifo.len() as f64);
    }

    /// Mark `key` as needing processing.
    ///
    /// - processing: marked dirty, re-queued once when the current pass calls `done`
    /// - already queued: no-op
    /// - otherwise: appended to the FIFO
    pub fn add(&self, key: ResourceKey) {
        let mut state = self.lock();
        if state.shutting_down {
            trace!(queue = %self.name, key = %key, "Ignoring add on shut down queue");
            return;
        }
        if state.processing.contains(&key) {
            trace!(queue = %self.name, key = %key, "Key in flight, marking dirty");
            if state.dirty.insert(key) {
                self.count_add();
            }
            return;
        }
        if state.queued.contains(&key) {
            return;
        }

        self.count_add();
        state.enqueue(key);
        self.publish_depth(&state);
        drop(state);
        self.available.notify_one();
    }

    /// Add `key` once `delay` has elapsed, without blocking the caller.
    ///
    /// If an earlier delayed add for the same key is already pending, this is a no-op.
    /// A shorter delay supersedes a pending later one.
    pub fn add_after(self: &Arc<Self>, key: ResourceKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            match state.waiting.get(&key) {
                Some(existing) if *existing <= ready_at => return,
                _ => {
                    state.waiting.insert(key.clone(), ready_at);
                }
            }
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            let current = {
                let mut state = queue.lock();
                if state.waiting.get(&key) == Some(&ready_at) {
                    state.waiting.remove(&key);
                    true
                } else {
                    false
                }
            };
            // Superseded by an earlier deadline, or dropped by shutdown.
            if current {
                queue.add(key);
            }
        });
    }

    /// Add `key` after the delay the rate limiter assigns to it.
    pub fn add_rate_limited(self: &Arc<Self>, key: ResourceKey) {
        let delay = self.rate_limiter.when(&key);
        WORKQUEUE_RETRIES_TOTAL
            .with_label_values(&[self.name.as_str()])
            .inc();
        debug!(queue = %self.name, key = %key, delay = ?delay, "Rate-limited requeue");
        self.add_after(key, delay);
    }

    /// Wait for the next key and mark it processing.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ResourceKey> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before inspecting state so a concurrent add or
            // shutdown between the check and the await is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.fifo.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());

                    let now = Instant::now();
                    if let Some(enqueued) = state.enqueued_at.remove(&key) {
                        WORKQUEUE_QUEUE_DURATION_SECONDS
                            .with_label_values(&[self.name.as_str()])
                            .observe(now.duration_since(enqueued).as_secs_f64());
                    }
                    state.started_at.insert(key.clone(), now);
                    self.publish_depth(&state);

                    let more = !state.fifo.is_empty();
                    drop(state);
                    if more {
                        self.available.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release `key` after processing. Re-queues it once if it was re-added meanwhile.
    pub fn done(&self, key: &ResourceKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if let Some(started) = state.started_at.remove(key) {
            WORKQUEUE_WORK_DURATION_SECONDS
                .with_label_values(&[self.name.as_str()])
                .observe(started.elapsed().as_secs_f64());
        }

        if state.dirty.remove(key) && !state.shutting_down {
            state.enqueue(key.clone());
            self.publish_depth(&state);
            drop(state);
            self.available.notify_one();
            return;
        }

        if state.fifo.is_empty() && state.processing.is_empty() {
            drop(state);
            self.idle.notify_waiters();
        }
    }

    /// Wait until no key is queued or in flight, or the queue is shut down.
    ///
    /// Keys still waiting out a delayed add do not count.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.shutting_down || (state.fifo.is_empty() && state.processing.is_empty()) {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Reset the rate limiter's backoff and the failure count for `key`.
    pub fn forget(&self, key: &ResourceKey) {
        self.rate_limiter.forget(key);
        self.lock().failures.remove(key);
    }

    /// Count a failed reconcile of `key`. Returns the failures since the last `forget`,
    /// including this one.
    pub fn record_failure(&self, key: &ResourceKey) -> u32 {
        let mut state = self.lock();
        let failures = state.failures.entry(key.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        *failures
    }

    /// Failed reconciles of `key` since the last `forget`.
    #[must_use]
    pub fn num_failures(&self, key: &ResourceKey) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Number of rate-limited adds recorded for `key` since the last `forget`.
    ///
    /// Event-driven adds count too; see [`WorkQueue::num_failures`] for reconcile failures only.
    #[must_use]
    pub fn num_requeues(&self, key: &ResourceKey) -> u32 {
        self.rate_limiter.num_requeues(key)
    }

    /// Close the queue. Waiting and future `get` calls return `None`.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        state.waiting.clear();
        drop(state);
        debug!(queue = %self.name, "Work queue shut down");
        self.available.notify_waiters();
        self.idle.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting in the FIFO.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().fifo.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys currently handed out to workers.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().processing.len()
    }

    #[must_use]
    pub fn item_state(&self, key: &ResourceKey) -> ItemState {
        let state = self.lock();
        if state.processing.contains(key) {
            if state.dirty.contains(key) {
                ItemState::ProcessingDirty
            } else {
                ItemState::Processing
            }
        } else if state.queued.contains(key) {
            ItemState::Queued
        } else if state.waiting.contains_key(key) {
            ItemState::Backoff
        } else {
            ItemState::Absent
        }
    }
}
