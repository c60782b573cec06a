// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for reconciler helper functions.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_should_reconcile_when_generations_equal() {
        assert!(
            !should_reconcile(Some(5), Some(5)),
            "Should not reconcile when generations match"
        );
    }

    #[test]
    fn test_should_reconcile_when_generations_differ() {
        assert!(should_reconcile(Some(7), Some(5)));
        // A recreated object starts over at generation 1
        assert!(should_reconcile(Some(1), Some(4)));
    }

    #[test]
    fn test_should_reconcile_first_reconciliation() {
        assert!(
            should_reconcile(Some(1), None),
            "Should reconcile on first reconciliation (observed=None)"
        );
    }

    #[test]
    fn test_should_reconcile_without_generation() {
        assert!(!should_reconcile(None, Some(5)));
        assert!(!should_reconcile(None, None));
    }

    struct CountingReconciler(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl Reconciler for CountingReconciler {
        async fn reconcile(&self, _key: &ResourceKey) -> Result<(), SyncError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reconciler_is_object_safe() {
        let reconciler: Box<dyn Reconciler> =
            Box::new(CountingReconciler(std::sync::atomic::AtomicUsize::new(0)));
        reconciler.reconcile(&ResourceKey::from("ns/a")).await.unwrap();
        reconciler.reconcile(&ResourceKey::from("ns/b")).await.unwrap();
    }
}
