// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Two-stage process signal handling.
//!
//! The first SIGTERM or SIGINT starts a graceful drain: the controller stops
//! handing out keys, lets in-flight reconciles finish, and returns. A second
//! signal while draining exits the process immediately with status 1.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::future::Future;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// How [`relay_signals`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal source closed before any signal arrived.
    NoSignal,
    /// One signal arrived and graceful shutdown was requested.
    Graceful,
    /// A second signal arrived; the caller should exit now.
    Forced,
}

/// Forward the first signal from `signals` to `graceful`, then wait for a second one.
pub async fn relay_signals<S>(mut signals: S, graceful: oneshot::Sender<()>) -> SignalOutcome
where
    S: Stream<Item = &'static str> + Unpin,
{
    let Some(first) = signals.next().await else {
        return SignalOutcome::NoSignal;
    };
    info!(
        signal = first,
        "Received signal, initiating graceful shutdown (send again to force exit)"
    );
    if graceful.send(()).is_err() {
        warn!("Shutdown receiver already dropped");
    }

    match signals.next().await {
        Some(second) => {
            warn!(signal = second, "Received second signal during shutdown");
            SignalOutcome::Forced
        }
        None => SignalOutcome::Graceful,
    }
}

#[cfg(unix)]
fn os_signals() -> std::io::Result<BoxStream<'static, &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate())?;
    let sigint = signal(SignalKind::interrupt())?;
    Ok(futures::stream::unfold((sigterm, sigint), |(mut term, mut int)| async move {
        let name = tokio::select! {
            received = term.recv() => received.map(|()| "SIGTERM"),
            received = int.recv() => received.map(|()| "SIGINT"),
        }?;
        Some((name, (term, int)))
    })
    .boxed())
}

#[cfg(not(unix))]
fn os_signals() -> std::io::Result<BoxStream<'static, &'static str>> {
    Ok(futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok()?;
        Some(("ctrl-c", ()))
    })
    .boxed())
}

/// Install OS signal handlers.
///
/// The returned future resolves on the first signal. A second signal terminates
/// the process with exit status 1.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be registered.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    let signals = os_signals()?;
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        if relay_signals(signals, tx).await == SignalOutcome::Forced {
            error!("Forcing exit");
            std::process::exit(1);
        }
    });

    Ok(async move {
        if rx.await.is_err() {
            // Signal source closed without a signal; never trigger shutdown.
            std::future::pending::<()>().await;
        }
    })
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod signals_tests;
