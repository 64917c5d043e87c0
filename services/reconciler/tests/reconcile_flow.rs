//! End-to-end reconcile flows over the in-memory stores.
//!
//! Covers idempotence, shared impersonator ownership across tenants, the
//! orphan gate, deletion cleanup and stage short-circuiting.
mod common;

use async_trait::async_trait;
use common::{Harness, tenant};
use reconciler::error::Stage;
use reconciler::model::{ORPHAN_FINALIZER, RELEASE_GRANTS_FINALIZER};
use reconciler::reconcile::{ReconcileOutcome, Reconciler};
use reconciler::store::memory::InMemoryObjectStore;
use reconciler::store::{DerivedObjectStore, SpecStore, StoreResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tenancy_rbac::{LabelSelector, ObjectKey, ObjectKind, RbacClass, RbacObject, Subject};

fn impersonator_role(identity: &str) -> ObjectKey {
    ObjectKey::cluster(
        ObjectKind::ClusterRole,
        tenancy_rbac::impersonator_name(identity),
    )
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let h = Harness::new();
    h.specs.put(tenant("payments", &["root@example.com"])).await;

    let outcome = h.reconciler.reconcile("payments").await.expect("first");
    assert_eq!(outcome, ReconcileOutcome::Applied);
    let writes = h.total_writes();
    assert!(writes > 0);

    let outcome = h.reconciler.reconcile("payments").await.expect("second");
    assert_eq!(outcome, ReconcileOutcome::Applied);
    assert_eq!(h.total_writes(), writes);
}

#[tokio::test]
async fn derived_object_names_are_deterministic() {
    let h = Harness::new();
    h.specs
        .put(tenant("payments", &["jane.doe@example.com"]))
        .await;
    h.reconciler.reconcile("payments").await.expect("apply");

    let mut keys: Vec<String> = h
        .objects
        .snapshot()
        .await
        .into_iter()
        .map(|object| object.key.to_string())
        .collect();
    keys.sort();
    let mut expected = vec![
        "ClusterRole/jane-doe-example-com-impersonator".to_string(),
        "ClusterRoleBinding/jane-doe-example-com-impersonator".to_string(),
        "ClusterRole/payments-sudoers".to_string(),
        "ClusterRoleBinding/payments-sudoers".to_string(),
        "ClusterRoleBinding/payments-sudoeditor".to_string(),
        "RoleBinding/payments/payments-sudoers".to_string(),
        "RoleBinding/payments/developer".to_string(),
        "ClusterRole/payments-editor".to_string(),
        "ClusterRoleBinding/payments-manager".to_string(),
    ];
    expected.sort();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn shared_impersonator_survives_until_last_owner_leaves() {
    let h = Harness::new();
    let a = tenant("tenant-a", &["shared@example.com", "a-only@example.com"]);
    let b = tenant("tenant-b", &["shared@example.com"]);
    let (a_uid, b_uid) = (a.uid, b.uid);
    h.specs.put(a).await;
    h.specs.put(b).await;
    h.reconciler.reconcile("tenant-a").await.expect("a");
    h.reconciler.reconcile("tenant-b").await.expect("b");

    let shared = h
        .objects
        .snapshot()
        .await
        .into_iter()
        .find(|object| object.key == impersonator_role("shared@example.com"))
        .expect("shared role");
    assert_eq!(shared.owners.valid_owners().count(), 2);
    assert_eq!(shared.class(), Some(RbacClass::SelfImpersonator));

    // tenant-a drops the shared sudoer
    let mut a = h.specs.get("tenant-a").await.expect("a");
    a.spec.sudoers = vec![Subject::user("a-only@example.com")];
    h.specs.put(a).await;
    h.reconciler.reconcile("tenant-a").await.expect("a shrink");

    assert!(h.objects.collect_orphans().await.is_empty());
    let shared = h
        .objects
        .snapshot()
        .await
        .into_iter()
        .find(|object| object.key == impersonator_role("shared@example.com"))
        .expect("shared role kept");
    assert!(!shared.owners.find(a_uid).expect("a entry").valid);
    assert!(shared.owners.find(b_uid).expect("b entry").valid);

    // tenant-b drops it too; nothing holds it anymore
    let mut b = h.specs.get("tenant-b").await.expect("b");
    b.spec.sudoers.clear();
    h.specs.put(b).await;
    h.reconciler.reconcile("tenant-b").await.expect("b shrink");

    let mut collected = h.objects.collect_orphans().await;
    collected.sort();
    let mut expected = vec![
        impersonator_role("shared@example.com"),
        ObjectKey::cluster(
            ObjectKind::ClusterRoleBinding,
            tenancy_rbac::impersonator_name("shared@example.com"),
        ),
    ];
    expected.sort();
    assert_eq!(collected, expected);
}

#[tokio::test]
async fn orphan_gate_makes_no_store_calls() {
    let h = Harness::new();
    h.specs.put(tenant("payments", &["root@example.com"])).await;
    h.reconciler.reconcile("payments").await.expect("apply");

    let mut state = h.specs.get("payments").await.expect("spec");
    state.finalizers.push(ORPHAN_FINALIZER.to_string());
    state.spec.sudoers.clear();
    h.specs.put(state).await;

    let before = h.total_calls();
    let outcome = h.reconciler.reconcile("payments").await.expect("orphan");
    assert_eq!(outcome, ReconcileOutcome::Orphaned);
    // the spec fetch is the only call
    assert_eq!(h.total_calls(), before + 1);
    assert!(
        h.objects
            .snapshot()
            .await
            .iter()
            .all(|object| object.owners.has_valid_owner())
    );
}

#[tokio::test]
async fn deletion_releases_only_the_deleted_tenant() {
    let h = Harness::new();
    let a = tenant("tenant-a", &["shared@example.com"]);
    let b = tenant("tenant-b", &["shared@example.com"]);
    let (a_uid, b_uid) = (a.uid, b.uid);
    h.specs.put(a).await;
    h.specs.put(b).await;
    h.reconciler.reconcile("tenant-a").await.expect("a");
    h.reconciler.reconcile("tenant-b").await.expect("b");
    let stored = h.specs.get("tenant-a").await.expect("a");
    assert!(stored.has_finalizer(RELEASE_GRANTS_FINALIZER));

    h.specs.request_deletion("tenant-a").await;
    let outcome = h.reconciler.reconcile("tenant-a").await.expect("finalize");
    assert_eq!(outcome, ReconcileOutcome::Finalized);
    assert!(!h.specs.contains("tenant-a").await);

    let shared = h
        .objects
        .snapshot()
        .await
        .into_iter()
        .find(|object| object.key == impersonator_role("shared@example.com"))
        .expect("shared role");
    assert!(!shared.owners.find(a_uid).expect("a entry").valid);
    assert!(shared.owners.find(b_uid).expect("b entry").valid);

    assert_eq!(
        h.reconciler.reconcile("tenant-a").await.expect("gone"),
        ReconcileOutcome::Gone
    );
}

#[tokio::test]
async fn rbac_failure_short_circuits_after_billing() {
    let h = Harness::new();
    h.specs.put(tenant("payments", &["root@example.com"])).await;
    h.objects.set_unavailable(true);

    let err = h
        .reconciler
        .reconcile("payments")
        .await
        .expect_err("objects offline");
    assert_eq!(err.stage, Stage::SelfImpersonators);
    assert!(err.is_retryable());
    // earlier stages committed, later ones never ran
    assert_eq!(h.namespaces.writes(), 1);
    assert_eq!(h.ledger.rows_for("payments").await.len(), 2);
    assert_eq!(h.objects.calls(), 1);

    h.objects.set_unavailable(false);
    let outcome = h.reconciler.reconcile("payments").await.expect("retry");
    assert_eq!(outcome, ReconcileOutcome::Applied);
    assert_eq!(h.objects.snapshot().await.len(), 9);
}

#[tokio::test]
async fn billing_changes_flow_to_ledger() {
    let h = Harness::new();
    h.specs.put(tenant("payments", &[])).await;
    h.reconciler.reconcile("payments").await.expect("apply");

    let mut state = h.specs.get("payments").await.expect("spec");
    state.spec.billing.remove("budget");
    state
        .spec
        .billing
        .insert("cost-center".to_string(), "cc-2".to_string());
    h.specs.put(state).await;
    h.reconciler.reconcile("payments").await.expect("update");

    let rows = h.ledger.rows_for("payments").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.get("cost-center").map(String::as_str), Some("cc-2"));

    let queries = h.ledger.queries().await;
    let (sql, bound) = queries.last().expect("delete issued");
    assert!(sql.starts_with("DELETE billing.namespace_labels T WHERE EXISTS"));
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].name, "budget");
}

/// Lets another writer touch the target object right before the next patch.
struct RacingObjects {
    inner: Arc<InMemoryObjectStore>,
    race_next_patch: AtomicBool,
}

#[async_trait]
impl DerivedObjectStore for RacingObjects {
    async fn get(&self, key: &ObjectKey) -> StoreResult<RbacObject> {
        self.inner.get(key).await
    }

    async fn create(&self, object: RbacObject) -> StoreResult<RbacObject> {
        self.inner.create(object).await
    }

    async fn patch(&self, object: RbacObject) -> StoreResult<RbacObject> {
        if self.race_next_patch.swap(false, Ordering::SeqCst) {
            let current = self.inner.get(&object.key).await?;
            self.inner.patch(current).await?;
        }
        self.inner.patch(object).await
    }

    async fn list(
        &self,
        kind: ObjectKind,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<RbacObject>> {
        self.inner.list(kind, selector).await
    }
}

#[tokio::test]
async fn concurrent_write_on_shared_grant_is_retryable_and_converges() {
    let h = Harness::new();
    let racing = Arc::new(RacingObjects {
        inner: h.objects.clone(),
        race_next_patch: AtomicBool::new(false),
    });
    let reconciler = Reconciler::new(
        h.specs.clone(),
        h.namespaces.clone(),
        h.ledger.clone(),
        racing.clone(),
    );

    let a = tenant("tenant-a", &["shared@example.com", "a-only@example.com"]);
    let b = tenant("tenant-b", &["shared@example.com"]);
    let (a_uid, b_uid) = (a.uid, b.uid);
    h.specs.put(a).await;
    h.specs.put(b).await;
    reconciler.reconcile("tenant-a").await.expect("a");
    reconciler.reconcile("tenant-b").await.expect("b");

    let mut a = h.specs.get("tenant-a").await.expect("a");
    a.spec.sudoers = vec![Subject::user("a-only@example.com")];
    h.specs.put(a).await;

    // the only patch of this pass is the release of the shared grant
    racing.race_next_patch.store(true, Ordering::SeqCst);
    let err = reconciler
        .reconcile("tenant-a")
        .await
        .expect_err("stale write rejected");
    assert_eq!(err.stage, Stage::SelfImpersonators);
    assert!(err.is_retryable());

    let outcome = reconciler.reconcile("tenant-a").await.expect("retry");
    assert_eq!(outcome, ReconcileOutcome::Applied);
    for key in [
        impersonator_role("shared@example.com"),
        ObjectKey::cluster(
            ObjectKind::ClusterRoleBinding,
            tenancy_rbac::impersonator_name("shared@example.com"),
        ),
    ] {
        let shared = h.objects.get(&key).await.expect("shared grant");
        assert!(!shared.owners.find(a_uid).expect("a entry").valid);
        assert!(shared.owners.find(b_uid).expect("b entry").valid);
    }
}
