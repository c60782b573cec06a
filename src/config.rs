// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime configuration.
//!
//! [`Cli`] is the command-line surface of the `crontab-controller` binary. Every
//! flag can also be set through a `CRONTAB_*` environment variable, which is how
//! the controller is normally configured when deployed.
//!
//! [`ControllerConfig`] is what the library consumes; the binary converts the
//! parsed [`Cli`] into it.

use crate::constants::{
    DEFAULT_CACHE_SYNC_TIMEOUT_SECS, DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_RESYNC_PERIOD_SECS,
    DEFAULT_WORKER_COUNT, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PORT,
};
use crate::errors::ControllerError;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Reconcile `CronTab` resources.
#[derive(Parser, Debug, Clone)]
#[command(name = "crontab-controller")]
#[command(version)]
#[command(about = "Level-triggered controller for CronTab custom resources")]
pub struct Cli {
    /// Number of concurrent reconcile workers
    #[arg(long, env = "CRONTAB_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,

    /// Only watch this namespace (default: all namespaces)
    #[arg(long, env = "CRONTAB_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds between cache resyncs, 0 disables resync
    #[arg(long, env = "CRONTAB_RESYNC_PERIOD_SECS", default_value_t = DEFAULT_RESYNC_PERIOD_SECS)]
    pub resync_period_secs: u64,

    /// Seconds to wait for the initial listing before giving up
    #[arg(
        long,
        env = "CRONTAB_CACHE_SYNC_TIMEOUT_SECS",
        default_value_t = DEFAULT_CACHE_SYNC_TIMEOUT_SECS
    )]
    pub cache_sync_timeout_secs: u64,

    /// Per-reconcile deadline in seconds, 0 means no deadline
    #[arg(long, env = "CRONTAB_RECONCILE_TIMEOUT_SECS", default_value_t = 0)]
    pub reconcile_timeout_secs: u64,

    /// Seconds to keep processing queued keys after a stop signal, 0 waits until the queue is empty
    #[arg(long, env = "CRONTAB_DRAIN_TIMEOUT_SECS", default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout_secs: u64,

    /// Drop a key after this many failed retries (default: retry forever)
    #[arg(long, env = "CRONTAB_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Address the metrics server binds to
    #[arg(long, env = "CRONTAB_METRICS_BIND_ADDRESS", default_value = METRICS_SERVER_BIND_ADDRESS)]
    pub metrics_bind_address: IpAddr,

    /// Port the metrics server listens on
    #[arg(long, env = "CRONTAB_METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    /// Do not start the metrics server
    #[arg(long, env = "CRONTAB_DISABLE_METRICS", default_value_t = false)]
    pub disable_metrics: bool,
}

impl Cli {
    /// Socket address for the metrics server, `None` when metrics are disabled.
    #[must_use]
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (!self.disable_metrics).then(|| SocketAddr::new(self.metrics_bind_address, self.metrics_port))
    }
}

/// Settings for [`crate::controller::Controller`] and the informer feeding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub workers: usize,
    pub namespace: Option<String>,
    /// `None` disables periodic resync.
    pub resync_period: Option<Duration>,
    pub cache_sync_timeout: Duration,
    /// `None` lets a reconcile run as long as it needs.
    pub reconcile_timeout: Option<Duration>,
    /// `None` retries failed keys forever.
    pub max_retries: Option<u32>,
    /// How long draining may take before queued keys are abandoned. `None` waits for an empty queue.
    pub drain_timeout: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            namespace: None,
            resync_period: Some(Duration::from_secs(DEFAULT_RESYNC_PERIOD_SECS)),
            cache_sync_timeout: Duration::from_secs(DEFAULT_CACHE_SYNC_TIMEOUT_SECS),
            reconcile_timeout: None,
            max_retries: None,
            drain_timeout: Some(Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS)),
        }
    }
}

impl ControllerConfig {
    /// Reject settings the controller cannot start with.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidConfig`] for zero workers or a zero sync timeout.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.workers == 0 {
            return Err(ControllerError::InvalidConfig {
                reason: "worker count must be at least 1".to_string(),
            });
        }
        if self.cache_sync_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig {
                reason: "cache sync timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl From<&Cli> for ControllerConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            workers: cli.workers,
            namespace: cli.namespace.clone(),
            resync_period: non_zero_secs(cli.resync_period_secs),
            cache_sync_timeout: Duration::from_secs(cli.cache_sync_timeout_secs),
            reconcile_timeout: non_zero_secs(cli.reconcile_timeout_secs),
            max_retries: cli.max_retries,
            drain_timeout: non_zero_secs(cli.drain_timeout_secs),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
