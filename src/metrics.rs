// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the `CronTab` controller.
//!
//! All metrics share the `crontab_controller_` prefix.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcomes and duration of reconcile calls
//! - **Event Metrics** - Watch notifications seen by the event dispatcher
//! - **Work Queue Metrics** - Depth, adds, retries and latency of the work queue
//! - **Error Metrics** - Errors reported to the error sink
//!
//! # Example
//!
//! ```rust,no_run
//! use crontab_controller::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("CronTab", std::time::Duration::from_millis(12));
//! ```

use crate::constants::METRICS_SERVER_PATH;
use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info};

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "crontab_controller";

const REGISTER_FAILED: &str = "metric names are unique within the registry";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let opts = Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    let counter = CounterVec::new(opts, labels).expect(REGISTER_FAILED);
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect(REGISTER_FAILED);
    counter
}

fn histogram_vec(name: &str, help: &str, labels: &[&str], buckets: Vec<f64>) -> HistogramVec {
    let opts = HistogramOpts::new(format!("{METRICS_NAMESPACE}_{name}"), help).buckets(buckets);
    let histogram = HistogramVec::new(opts, labels).expect(REGISTER_FAILED);
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect(REGISTER_FAILED);
    histogram
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (e.g., `CronTab`)
/// - `status`: Outcome (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "reconciliations_total",
        "Total number of reconciliations by resource type and status",
        &["resource_type", "status"],
    )
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `resource_type`: Kind of resource
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram_vec(
        "reconciliation_duration_seconds",
        "Duration of reconciliations in seconds by resource type",
        &["resource_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0],
    )
});

/// Total number of requeue operations
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `reason`: Reason for requeue (`error`, `timeout`, `panic`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "requeues_total",
        "Total number of requeue operations by resource type and reason",
        &["resource_type", "reason"],
    )
});

// ============================================================================
// Event Metrics
// ============================================================================

/// Total number of watch events handled by the dispatcher
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `event`: `added`, `updated`, `deleted`, or `unchanged` (update with same resource version)
pub static EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "events_total",
        "Total number of watch events by resource type and event kind",
        &["resource_type", "event"],
    )
});

// ============================================================================
// Work Queue Metrics
// ============================================================================

/// Total number of keys handed to the queue (including coalesced ones)
pub static WORKQUEUE_ADDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "workqueue_adds_total",
        "Total number of adds handled by the work queue",
        &["name"],
    )
});

/// Current number of keys waiting in the FIFO
pub static WORKQUEUE_DEPTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_workqueue_depth"),
        "Current depth of the work queue",
    );
    let gauge = GaugeVec::new(opts, &["name"]).expect(REGISTER_FAILED);
    METRICS_REGISTRY
        .register(Box::new(gauge.clone()))
        .expect(REGISTER_FAILED);
    gauge
});

/// Total number of rate-limited re-adds
pub static WORKQUEUE_RETRIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "workqueue_retries_total",
        "Total number of rate-limited retries handled by the work queue",
        &["name"],
    )
});

/// Time a key spends queued before a worker picks it up
pub static WORKQUEUE_QUEUE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram_vec(
        "workqueue_queue_duration_seconds",
        "How long a key stays in the work queue before being requested",
        &["name"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0],
    )
});

/// Time between a worker taking a key and releasing it
pub static WORKQUEUE_WORK_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram_vec(
        "workqueue_work_duration_seconds",
        "How long processing a key from the work queue takes",
        &["name"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0],
    )
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by resource type and error category
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `error_type`: Category of error (`keyer_error`, `api_error`, `cache_error`, `timeout`, ...)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "errors_total",
        "Total number of errors by resource type and error category",
        &["resource_type", "error_type"],
    )
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled (e.g., `CronTab`)
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `reason` - Reason for requeue (e.g., `api_error`, `timeout`)
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record a watch event seen by the dispatcher
pub fn record_event(resource_type: &str, event: &str) {
    EVENTS_TOTAL.with_label_values(&[resource_type, event]).inc();
}

/// Record an error
///
/// # Arguments
/// * `resource_type` - The kind of resource where error occurred
/// * `error_type` - Category of error
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Router exposing the registry at `/metrics`.
pub fn metrics_router() -> Router {
    Router::new().route(METRICS_SERVER_PATH, get(metrics_handler))
}

/// Serve the metrics endpoint until the task is dropped.
///
/// # Errors
/// Returns error if the address cannot be bound or the server fails.
pub async fn serve_metrics(addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, path = METRICS_SERVER_PATH, "Serving Prometheus metrics");
    axum::serve(listener, metrics_router()).await?;
    Ok(())
}
