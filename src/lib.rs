// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # crontab-controller - Level-triggered controller for `CronTab` resources
//!
//! A Kubernetes controller built around an explicit control loop: a watch-backed
//! cache, key-only event dispatch, a deduplicating rate-limited work queue, and a
//! pool of workers running an idempotent reconciler.
//!
//! ## Data Flow
//!
//! ```text
//! watch -> Informer -> ResourceEvent -> EventHandler -> WorkQueue -> Worker -> Reconciler
//!            |                                                                   |
//!            +----------------------- StoreCache <-------- get(ns, name) ---------+
//! ```
//!
//! Only keys travel through the queue. A worker always re-reads the object from
//! the cache, so it acts on the latest state rather than an event snapshot.
//!
//! ## Modules
//!
//! - [`crd`] - the `CronTab` custom resource
//! - [`keys`] - resource keys and tombstones
//! - [`informer`] - watch loop feeding the cache and the event stream
//! - [`cache`] - read-only cache surface and the sync barrier
//! - [`dispatcher`] - event to key translation
//! - [`workqueue`] - deduplicating, rate-limited queue
//! - [`reconcilers`] - the sync handler
//! - [`controller`] - lifecycle and worker pool
//! - [`config`], [`signals`], [`metrics`] - process plumbing
//!
//! ## Example
//!
//! ```rust,no_run
//! use crontab_controller::workqueue::WorkQueue;
//!
//! # async fn demo() {
//! let queue = WorkQueue::new("crontab");
//! queue.add("default/nightly".into());
//! if let Some(key) = queue.get().await {
//!     // ... reconcile ...
//!     queue.forget(&key);
//!     queue.done(&key);
//! }
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod dispatcher;
pub mod errors;
pub mod informer;
pub mod keys;
pub mod metrics;
pub mod reconcilers;
pub mod signals;
pub mod workqueue;
