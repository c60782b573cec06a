// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for the `CronTab` resource.
//!
//! The controller only observes `CronTab` objects and records which generation it
//! has reconciled; executing the schedule is left to downstream consumers.
//!
//! # Example
//!
//! ```rust,no_run
//! use crontab_controller::crd::CronTabSpec;
//!
//! let spec = CronTabSpec {
//!     cron_spec: "*/5 * * * *".to_string(),
//!     image: "busybox:1.36".to_string(),
//!     replicas: Some(1),
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Common types include: Ready, Progressing, Degraded.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// `CronTab` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CronTabStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// The `metadata.generation` most recently reconciled by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// The `metadata.resourceVersion` of the object the last reconcile acted on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_resource_version: Option<String>,
}

/// `CronTab` declares a container image to run on a cron schedule.
///
/// # Example
///
/// ```yaml
/// apiVersion: stable.example.com/v1beta1
/// kind: CronTab
/// metadata:
///   name: nightly-report
///   namespace: default
/// spec:
///   cronSpec: "0 2 * * *"
///   image: reports:latest
///   replicas: 1
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "stable.example.com",
    version = "v1beta1",
    kind = "CronTab",
    plural = "crontabs",
    shortname = "ct",
    namespaced,
    doc = "CronTab runs a container image on a cron schedule."
)]
#[kube(status = "CronTabStatus")]
#[kube(printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.cronSpec"}"#)]
#[kube(printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#)]
#[serde(rename_all = "camelCase")]
pub struct CronTabSpec {
    /// Standard five-field cron expression (e.g., "*/5 * * * *").
    pub cron_spec: String,

    /// Container image to run on each tick.
    pub image: String,

    /// Number of parallel copies per tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 1000))]
    pub replicas: Option<i32>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
