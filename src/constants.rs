// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the `CronTab` controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `CronTab` CRD
pub const API_GROUP: &str = "stable.example.com";

/// API version for the `CronTab` CRD
pub const API_VERSION: &str = "v1beta1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "stable.example.com/v1beta1";

/// Kind name for `CronTab` resource
pub const KIND_CRONTAB: &str = "CronTab";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "crontab-controller";

// ============================================================================
// Status Condition Constants
// ============================================================================

/// Condition type reporting whether the controller has observed the latest spec
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Condition status value for a satisfied condition
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Reason set once the current generation has been reconciled
pub const REASON_RECONCILED: &str = "Reconciled";

// ============================================================================
// Work Queue Constants
// ============================================================================

/// Per-item exponential backoff base delay (5 milliseconds)
pub const DEFAULT_ITEM_BASE_DELAY_MILLIS: u64 = 5;

/// Per-item exponential backoff ceiling (1000 seconds)
pub const DEFAULT_ITEM_MAX_DELAY_SECS: u64 = 1000;

/// Overall token bucket refill rate (queries per second)
pub const DEFAULT_BUCKET_QPS: f64 = 10.0;

/// Overall token bucket burst size
pub const DEFAULT_BUCKET_BURST: u32 = 100;

// ============================================================================
// Controller Lifecycle Constants
// ============================================================================

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// How long `run` waits for the cache to finish its initial listing (60 seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// How often the cache sync barrier re-checks readiness (100 milliseconds)
pub const CACHE_SYNC_POLL_INTERVAL_MILLIS: u64 = 100;

/// Default informer resync period (30 seconds)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;

/// Default bound on draining queued keys after a stop signal (30 seconds)
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Thread name prefix for the Tokio runtime
pub const TOKIO_THREAD_NAME: &str = "crontab-controller";

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
