// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use crontab_controller::{
    config::{Cli, ControllerConfig},
    constants::{TOKIO_THREAD_NAME, TOKIO_WORKER_THREADS},
    controller::Controller,
    crd::CronTab,
    informer::Informer,
    metrics,
    reconcilers::{CronTabReconciler, KubeStatusWriter},
    signals,
};
use kube::{runtime::watcher, Api, Client};
use std::sync::Arc;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let cli = Cli::parse();
    build_runtime()?.block_on(async_main(cli))
}

/// Build Tokio runtime with custom thread names
fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(TOKIO_THREAD_NAME)
        .enable_all()
        .build()
}

/// Whether `RUST_LOG_FORMAT` asks for JSON output.
fn use_json_logs(log_format: Option<&str>) -> bool {
    log_format.is_some_and(|format| format.eq_ignore_ascii_case("json"))
}

// Format: timestamp file:line LEVEL message
// Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT=json.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").ok();

    if use_json_logs(log_format.as_deref()) {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .with_ansi(true)
            .compact()
            .init();
    }
}

fn crontab_api(client: Client, namespace: Option<&str>) -> Api<CronTab> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();
    info!("Starting CronTab controller");

    let config = ControllerConfig::from(&cli);
    config.validate()?;
    debug!(?config, "Configuration loaded");

    let shutdown = signals::shutdown_signal()?;

    if let Some(addr) = cli.metrics_addr() {
        tokio::spawn(async move {
            if let Err(e) = metrics::serve_metrics(addr).await {
                error!("Metrics server failed: {e:#}");
            }
        });
    }

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let api = crontab_api(client.clone(), config.namespace.as_deref());
    let (informer, cache, events) =
        Informer::new(api, watcher::Config::default(), config.resync_period);
    let cache = Arc::new(cache);
    let reconciler = Arc::new(CronTabReconciler::new(
        Arc::clone(&cache),
        KubeStatusWriter::new(client),
    ));
    let controller = Controller::new(cache, events, reconciler, config.clone());

    let informer_task = tokio::spawn(informer.run());
    let result = controller.run(config.workers, shutdown).await;
    informer_task.abort();

    match result {
        Ok(()) => {
            info!("Graceful shutdown completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("CRITICAL: CronTab controller failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
