// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `controller/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cache::MemoryCache;
    use crate::crd::{CronTab, CronTabSpec};
    use crate::errors::{CollectingErrorSink, SyncError};
    use crate::keys::ResourceKey;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot, Notify};
    use tokio::time::timeout;

    /// Records every key; optionally parks inside the first reconcile until released.
    #[derive(Default)]
    struct RecordingReconciler {
        seen: Mutex<Vec<ResourceKey>>,
        hold_first: bool,
        entered: Notify,
        release: Notify,
    }

    impl RecordingReconciler {
        fn seen(&self) -> Vec<ResourceKey> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Reconciler for RecordingReconciler {
        async fn reconcile(&self, key: &ResourceKey) -> Result<(), SyncError> {
            let first = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(key.clone());
                seen.len() == 1
            };
            if self.hold_first && first {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(())
        }
    }

    fn crontab(name: &str) -> CronTab {
        let mut ct = CronTab::new(
            name,
            CronTabSpec {
                cron_spec: "0 0 * * *".to_string(),
                image: "busybox".to_string(),
                replicas: None,
            },
        );
        ct.metadata.namespace = Some("ns".to_string());
        ct.metadata.resource_version = Some("1".to_string());
        ct
    }

    type TestController = Controller<CronTab, MemoryCache<CronTab>, RecordingReconciler>;

    fn controller(
        synced: bool,
        reconciler: RecordingReconciler,
    ) -> (
        TestController,
        mpsc::UnboundedSender<ResourceEvent<CronTab>>,
        Arc<RecordingReconciler>,
        Arc<CollectingErrorSink>,
    ) {
        let cache = Arc::new(MemoryCache::new());
        if synced {
            cache.mark_synced();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = Arc::new(reconciler);
        let sink = Arc::new(CollectingErrorSink::new());
        let config = ControllerConfig {
            cache_sync_timeout: Duration::from_secs(2),
            ..ControllerConfig::default()
        };
        let controller = Controller::new(cache, rx, Arc::clone(&reconciler), config)
            .with_error_sink(sink.clone());
        (controller, tx, reconciler, sink)
    }

    async fn wait_for_seen(reconciler: &RecordingReconciler, count: usize) {
        timeout(Duration::from_secs(10), async {
            while reconciler.seen().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reconciler was not called in time");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ControllerState::Draining.to_string(), "Draining");
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        let (controller, _tx, _reconciler, _sink) = controller(true, RecordingReconciler::default());
        assert_eq!(controller.state(), ControllerState::Created);

        let result = controller.run(0, std::future::pending()).await;

        assert!(matches!(result, Err(ControllerError::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_timeout_fails_without_starting_workers() {
        let (controller, tx, reconciler, _sink) = controller(false, RecordingReconciler::default());
        let states = controller.subscribe_state();
        let queue = controller.queue();
        tx.send(ResourceEvent::Added(Arc::new(crontab("early"))))
            .unwrap();

        let result = controller.run(2, std::future::pending()).await;

        assert!(matches!(
            result,
            Err(ControllerError::CacheSyncTimeout { timeout }) if timeout == Duration::from_secs(2)
        ));
        assert!(reconciler.seen().is_empty());
        assert_eq!(*states.borrow(), ControllerState::Stopped);
        assert!(queue.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_sync_returns_ok() {
        let (controller, _tx, reconciler, _sink) = controller(false, RecordingReconciler::default());
        let states = controller.subscribe_state();

        let result = controller
            .run(2, tokio::time::sleep(Duration::from_millis(500)))
            .await;

        assert!(result.is_ok());
        assert!(reconciler.seen().is_empty());
        assert_eq!(*states.borrow(), ControllerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_reconciled_then_stopped() {
        let (controller, tx, reconciler, sink) = controller(true, RecordingReconciler::default());
        let mut states = controller.subscribe_state();
        let queue = controller.queue();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let run = tokio::spawn(controller.run(2, async {
            let _ = stop_rx.await;
        }));

        timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ControllerState::Running),
        )
        .await
        .unwrap()
        .unwrap();

        tx.send(ResourceEvent::Added(Arc::new(crontab("a")))).unwrap();
        tx.send(ResourceEvent::Added(Arc::new(crontab("b")))).unwrap();
        wait_for_seen(&reconciler, 2).await;

        stop_tx.send(()).unwrap();
        let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

        assert!(result.is_ok());
        let mut seen: Vec<String> = reconciler.seen().iter().map(ToString::to_string).collect();
        seen.sort();
        assert_eq!(seen, vec!["ns/a".to_string(), "ns/b".to_string()]);
        assert!(sink.is_empty());
        assert!(queue.is_shutting_down());
        assert_eq!(*states.borrow(), ControllerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_for_in_flight_reconcile() {
        let (controller, tx, reconciler, _sink) = controller(
            true,
            RecordingReconciler {
                hold_first: true,
                ..RecordingReconciler::default()
            },
        );
        let mut states = controller.subscribe_state();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(controller.run(1, async {
            let _ = stop_rx.await;
        }));

        tx.send(ResourceEvent::Added(Arc::new(crontab("slow"))))
            .unwrap();
        timeout(Duration::from_secs(5), reconciler.entered.notified())
            .await
            .expect("reconcile should have started");

        stop_tx.send(()).unwrap();
        timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ControllerState::Draining),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!run.is_finished(), "run must wait for the busy worker");

        reconciler.release.notify_one();
        let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(*states.borrow(), ControllerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draining_processes_queued_keys() {
        let (controller, tx, reconciler, sink) = controller(
            true,
            RecordingReconciler {
                hold_first: true,
                ..RecordingReconciler::default()
            },
        );
        let mut states = controller.subscribe_state();
        let queue = controller.queue();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(controller.run(1, async {
            let _ = stop_rx.await;
        }));

        tx.send(ResourceEvent::Added(Arc::new(crontab("slow"))))
            .unwrap();
        timeout(Duration::from_secs(5), reconciler.entered.notified())
            .await
            .expect("reconcile should have started");
        queue.add(ResourceKey::from("ns/queued"));

        stop_tx.send(()).unwrap();
        timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ControllerState::Draining),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!queue.is_shutting_down(), "queue stays open while draining");

        reconciler.release.notify_one();
        let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

        assert!(result.is_ok());
        assert_eq!(
            reconciler.seen(),
            vec![ResourceKey::from("ns/slow"), ResourceKey::from("ns/queued")]
        );
        assert!(sink.is_empty());
        assert!(queue.is_shutting_down());
        assert_eq!(*states.borrow(), ControllerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout_abandons_queued_keys() {
        let (mut controller, tx, reconciler, _sink) = controller(
            true,
            RecordingReconciler {
                hold_first: true,
                ..RecordingReconciler::default()
            },
        );
        controller.config.drain_timeout = Some(Duration::from_secs(1));
        let mut states = controller.subscribe_state();
        let queue = controller.queue();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(controller.run(1, async {
            let _ = stop_rx.await;
        }));

        tx.send(ResourceEvent::Added(Arc::new(crontab("slow"))))
            .unwrap();
        timeout(Duration::from_secs(5), reconciler.entered.notified())
            .await
            .expect("reconcile should have started");
        queue.add(ResourceKey::from("ns/queued"));

        stop_tx.send(()).unwrap();
        timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ControllerState::Draining),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(queue.is_shutting_down());

        reconciler.release.notify_one();
        let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

        assert!(result.is_ok());
        assert_eq!(reconciler.seen(), vec![ResourceKey::from("ns/slow")]);
    }
}
