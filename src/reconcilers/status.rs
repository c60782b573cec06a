// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers.
//!
//! Conditions follow the usual Kubernetes layout:
//! - `type`: the aspect being reported (e.g. "Ready")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: a `CamelCase` identifier
//! - `message`: human-readable detail
//! - `lastTransitionTime`: RFC3339 timestamp of the last status flip
//!
//! All helpers work in memory; persisting is the job of a
//! [`StatusWriter`](super::crontab::StatusWriter).

use crate::crd::Condition;
use chrono::Utc;

/// Create a new condition stamped with the current time.
///
/// # Example
///
/// ```rust
/// # use crontab_controller::reconcilers::status::create_condition;
/// let condition = create_condition("Ready", "True", "Reconciled", "Generation 3 observed");
/// assert_eq!(condition.r#type, "Ready");
/// assert_eq!(condition.status, "True");
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Update or add a condition in place.
///
/// `lastTransitionTime` is kept when the status value does not change, and reset
/// to now when it does.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) else {
        conditions.push(create_condition(condition_type, status, reason, message));
        return;
    };

    let last_transition_time = if existing.status == status {
        existing
            .last_transition_time
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339())
    } else {
        Utc::now().to_rfc3339()
    };

    existing.status = status.to_string();
    existing.reason = Some(reason.to_string());
    existing.message = Some(message.to_string());
    existing.last_transition_time = Some(last_transition_time);
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
