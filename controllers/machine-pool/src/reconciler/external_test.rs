//! Unit tests for the shared external object reconciliation routine

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::external::ExternalOutcome;
    use crate::reconciler::EXTERNAL_READY_WAIT;
    use crate::test_utils::*;
    use crds::{CLUSTER_NAME_LABEL, PAUSED_ANNOTATION};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_object_requeues() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store, registrar.clone());
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();

        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        match outcome {
            ExternalOutcome::Missing(requeue) => {
                assert_eq!(requeue.after, EXTERNAL_READY_WAIT);
                assert!(requeue.reason.contains("could not find"), "reason: {}", requeue.reason);
                assert!(requeue.reason.contains("ProxmoxMachinePool"), "reason: {}", requeue.reason);
            }
            _ => panic!("expected Missing for an absent object"),
        }
        assert!(registrar.watched().is_empty(), "no watch should be added for a missing object");
    }

    #[tokio::test]
    async fn test_resolved_object_is_adopted_labeled_and_watched() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar.clone());
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );

        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        assert!(matches!(outcome, ExternalOutcome::Resolved(_)));
        let patched = store.patched();
        assert_eq!(patched.len(), 1);
        let owner_refs = patched[0].metadata.owner_references.as_ref().unwrap();
        assert_eq!(owner_refs.len(), 1);
        assert_eq!(owner_refs[0].uid, "11111111-2222-3333-4444-555555555555");
        assert_eq!(owner_refs[0].kind, "MachinePool");
        assert_eq!(owner_refs[0].controller, Some(true));
        let labels = patched[0].metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(CLUSTER_NAME_LABEL).map(String::as_str), Some("test-cluster"));
        assert_eq!(
            registrar.watched(),
            vec!["infrastructure.fleetops.microscaler.io/ProxmoxMachinePool".to_string()]
        );
    }

    #[tokio::test]
    async fn test_repeat_reconcile_is_idempotent() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar.clone());
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );

        externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();
        externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        // The watch is registered once per api version and kind.
        assert_eq!(registrar.watched().len(), 1);
        // The second pass sees the already-adopted object and keeps a single
        // owner reference.
        let patched = store.patched();
        assert_eq!(patched.len(), 2);
        assert_eq!(patched[1].metadata.owner_references.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_failure_releases_claim_for_retry() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar.clone());
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );

        registrar.set_fail(true);
        let result = externals.reconcile(&cluster, &mut pool, &reference).await;
        assert!(matches!(result, Err(ControllerError::Watch(_))));

        registrar.set_fail(false);
        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();
        assert!(matches!(outcome, ExternalOutcome::Resolved(_)));
        assert_eq!(registrar.watched().len(), 1);
    }

    #[tokio::test]
    async fn test_paused_object_is_skipped() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar.clone());
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        let mut object = create_test_external_object(&reference, "default", json!({}));
        object
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
        store.add_object(&reference, "default", object);

        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        assert!(matches!(outcome, ExternalOutcome::Paused));
        assert!(store.patched().is_empty(), "a paused object must not be mutated");
        assert!(registrar.watched().is_empty());
    }

    #[tokio::test]
    async fn test_paused_cluster_skips_object() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar.clone());
        let mut cluster = create_test_cluster("test-cluster", "default");
        cluster.spec.paused = true;
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );

        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        assert!(matches!(outcome, ExternalOutcome::Paused));
        assert!(store.patched().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_mirrored_into_pool_status() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar);
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(
                &reference,
                "default",
                json!({
                    "status": { "failureReason": "InfraError", "failureMessage": "boom" }
                }),
            ),
        );

        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        assert!(matches!(outcome, ExternalOutcome::Resolved(_)));
        let status = pool.status.as_ref().unwrap();
        // The reason is copied verbatim, the message is wrapped with context.
        assert_eq!(status.failure_reason.as_deref(), Some("InfraError"));
        let message = status.failure_message.as_deref().unwrap();
        assert!(message.contains("Failure detected from referenced resource"), "message: {}", message);
        assert!(message.contains("boom"), "message: {}", message);
    }

    #[tokio::test]
    async fn test_foreign_controller_owner_is_rejected() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar);
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        let mut object = create_test_external_object(&reference, "default", json!({}));
        object.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "fleetops.microscaler.io/v1alpha1".to_string(),
            kind: "MachineSet".to_string(),
            name: "other-owner".to_string(),
            uid: "99999999-8888-7777-6666-555555555555".to_string(),
            controller: Some(true),
            ..Default::default()
        }]);
        store.add_object(&reference, "default", object);

        let result = externals.reconcile(&cluster, &mut pool, &reference).await;

        match result {
            Err(ControllerError::Ownership(message)) => {
                // The conflict names the contested object and its current owner.
                assert!(message.contains("test-infra"), "message: {}", message);
                assert!(message.contains("MachineSet"), "message: {}", message);
                assert!(message.contains("other-owner"), "message: {}", message);
            }
            _ => panic!("expected an ownership conflict"),
        }
        assert!(store.patched().is_empty());
    }

    #[tokio::test]
    async fn test_pool_without_uid_is_rejected() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar);
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        pool.metadata.uid = None;
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );

        let result = externals.reconcile(&cluster, &mut pool, &reference).await;

        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_pool_without_namespace_is_rejected() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar);
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        pool.metadata.namespace = None;
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );

        let result = externals.reconcile(&cluster, &mut pool, &reference).await;

        // Malformed metadata surfaces as an error rather than falling back to
        // the default namespace.
        match result {
            Err(ControllerError::InvalidConfig(message)) => {
                assert!(message.contains("has no namespace"), "message: {}", message);
            }
            _ => panic!("expected an invalid config error"),
        }
        assert!(store.patched().is_empty());
    }

    #[tokio::test]
    async fn test_get_failure_propagates() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar);
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );
        store.set_fail_get(true);

        let result = externals.reconcile(&cluster, &mut pool, &reference).await;

        // An API failure is not the same as an absent object.
        assert!(matches!(result, Err(ControllerError::Store(_))));
    }

    #[tokio::test]
    async fn test_patch_failure_propagates() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar.clone());
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let reference = create_test_infrastructure_ref();
        store.add_object(
            &reference,
            "default",
            create_test_external_object(&reference, "default", json!({})),
        );
        store.set_fail_patch(true);

        let result = externals.reconcile(&cluster, &mut pool, &reference).await;

        assert!(matches!(result, Err(ControllerError::Store(_))));
        assert!(registrar.watched().is_empty(), "no watch before the object is adopted");
    }

    #[tokio::test]
    async fn test_reference_namespace_overrides_pool_namespace() {
        let store = Arc::new(FakeExternalStore::new());
        let registrar = Arc::new(FakeWatchRegistrar::new());
        let externals = create_test_externals(store.clone(), registrar);
        let cluster = create_test_cluster("test-cluster", "default");
        let mut pool = create_test_machine_pool("pool-a", "default");
        let mut reference = create_test_infrastructure_ref();
        reference.namespace = Some("infra-system".to_string());
        store.add_object(
            &reference,
            "infra-system",
            create_test_external_object(&reference, "infra-system", json!({})),
        );

        let outcome = externals.reconcile(&cluster, &mut pool, &reference).await.unwrap();

        assert!(matches!(outcome, ExternalOutcome::Resolved(_)));
    }
}
