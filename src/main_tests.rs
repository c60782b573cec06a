// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - runtime, logging, and signal setup

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    #[test]
    fn test_runtime_builds_with_named_threads() {
        let runtime = build_runtime().expect("runtime should build");
        let name = runtime.block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_string) })
                .await
                .unwrap()
        });
        assert_eq!(name.as_deref(), Some(TOKIO_THREAD_NAME));
    }

    #[test]
    fn test_log_format_selection() {
        assert!(use_json_logs(Some("json")));
        assert!(use_json_logs(Some("JSON")));
        assert!(!use_json_logs(Some("text")));
        assert!(!use_json_logs(None));
    }

    #[test]
    fn test_cli_converts_to_valid_config() {
        let cli = Cli::try_parse_from(["crontab-controller", "--workers", "3"]).unwrap();
        let config = ControllerConfig::from(&cli);
        assert_eq!(config.workers, 3);
        assert!(config.validate().is_ok());
    }

    /// Test that SIGTERM signal handler can be created on Unix platforms
    #[tokio::test]
    #[cfg(unix)]
    async fn test_sigterm_signal_handler_creation() {
        use tokio::signal::unix::{signal, SignalKind};

        let result = signal(SignalKind::terminate());
        assert!(
            result.is_ok(),
            "Should be able to create SIGTERM signal handler"
        );
    }

    /// The shutdown future must not resolve until a signal arrives
    #[tokio::test]
    async fn test_shutdown_signal_stays_pending() {
        let shutdown = signals::shutdown_signal().expect("signal handlers should register");

        let result = timeout(StdDuration::from_millis(100), shutdown).await;

        assert!(
            result.is_err(),
            "shutdown future should time out when no signal is sent"
        );
    }
}

// Integration test documentation
// ================================
// Signal handling should also be checked manually:
//
// 1. Deploy the controller to a Kubernetes cluster
// 2. Watch logs: kubectl logs -f <pod-name>
// 3. Delete the pod: kubectl delete pod <pod-name>
// 4. Verify logs show:
//    - "Received signal, initiating graceful shutdown (send again to force exit)"
//    - "Shutting down workers"
//    - "Graceful shutdown completed successfully"
//
// For Ctrl+C testing (local development):
// 1. Run: cargo run
// 2. Press Ctrl+C once and verify the graceful shutdown messages
// 3. Run again, press Ctrl+C twice quickly and verify the process exits with status 1
