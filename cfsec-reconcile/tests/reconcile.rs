//! Reconciliation pass tests against the in-memory store.

mod common;

use std::time::Duration;

use cfsec_reconcile::{
    CancellationToken, Diff, Operation, Ownership, ReconcileError, RelationKind,
    RelationReconciler, RelationSet, StoreCall, StoreError, diff,
};
use common::{rel, set, store};

// =============================================================================
// Diff examples
// =============================================================================

#[test]
fn test_diff_adds_missing_binding() {
    let d = diff(&set(&[("g1", "s1"), ("g1", "s2")]), &set(&[("g1", "s1")]));
    assert_eq!(d.to_add, vec![rel("g1", "s2")]);
    assert!(d.to_remove.is_empty());
}

#[test]
fn test_diff_empty_desired_removes_all_observed() {
    let d = diff(&RelationSet::new(), &set(&[("g1", "s1"), ("g2", "s3")]));
    assert!(d.to_add.is_empty());
    assert_eq!(d.to_remove, vec![rel("g1", "s1"), rel("g2", "s3")]);
}

#[test]
fn test_diff_removes_undeclared_binding() {
    let d = diff(&set(&[("g1", "s1")]), &set(&[("g1", "s1"), ("g1", "s2")]));
    assert!(d.to_add.is_empty());
    assert_eq!(d.to_remove, vec![rel("g1", "s2")]);
}

// =============================================================================
// Apply
// =============================================================================

#[tokio::test]
async fn test_apply_removes_before_adding() {
    let reconciler = RelationReconciler::new(
        store(false, &[("g1", &["s1"]), ("g2", &[])]),
        RelationKind::SpaceBinding,
    );
    let d = Diff {
        to_add: vec![rel("g2", "s1")],
        to_remove: vec![rel("g1", "s1")],
    };

    let report = reconciler
        .apply(&d, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(
        reconciler.store().calls().await,
        vec![
            StoreCall::Unbind("g1".into(), "s1".into()),
            StoreCall::Bind("g2".into(), "s1".into()),
        ]
    );
}

#[tokio::test]
async fn test_apply_removing_absent_relation_succeeds() {
    let reconciler =
        RelationReconciler::new(store(false, &[("g1", &[])]), RelationKind::SpaceBinding);
    let d = Diff {
        to_add: vec![],
        to_remove: vec![rel("g1", "s1"), rel("g7", "s7")],
    };

    let report = reconciler
        .apply(&d, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(report.already_absent, 2);
}

#[tokio::test]
async fn test_apply_partial_failure_keeps_earlier_additions() {
    let s = store(false, &[("g1", &[])]);
    s.inject_failure("g1", "s2", StoreError::Remote("500 internal".into()))
        .await;
    let reconciler = RelationReconciler::new(s, RelationKind::SpaceBinding);
    let d = Diff {
        to_add: vec![rel("g1", "s1"), rel("g1", "s2")],
        to_remove: vec![],
    };

    let err = reconciler
        .apply(&d, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ReconcileError::Store {
            op,
            relation,
            source,
        } => {
            assert_eq!(*op, Operation::Bind);
            assert_eq!(*relation, rel("g1", "s2"));
            assert!(matches!(source, StoreError::Remote(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("(g1, s2)"));
    // no rollback
    assert!(reconciler.store().contains("g1", "s1").await);
}

#[tokio::test]
async fn test_apply_already_bound_is_fatal() {
    let reconciler = RelationReconciler::new(
        store(false, &[("g1", &["s1"])]),
        RelationKind::SpaceBinding,
    );
    let d = Diff {
        to_add: vec![rel("g1", "s1"), rel("g1", "s2")],
        to_remove: vec![],
    };

    let err = reconciler
        .apply(&d, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err.store_error(),
        Some(StoreError::AlreadyBound { .. })
    ));
    // aborted before the second addition
    assert!(!reconciler.store().contains("g1", "s2").await);
}

#[tokio::test]
async fn test_apply_removal_remote_error_aborts_pass() {
    let s = store(false, &[("g1", &["s1"])]);
    s.inject_failure("g1", "s1", StoreError::Remote("401 unauthorized".into()))
        .await;
    let reconciler = RelationReconciler::new(s, RelationKind::OrgEntitlement);
    let d = Diff {
        to_add: vec![rel("g1", "o2")],
        to_remove: vec![rel("g1", "s1")],
    };

    let err = reconciler
        .apply(&d, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Store {
            op: Operation::Revoke,
            ..
        }
    ));
    assert_eq!(reconciler.store().calls().await.len(), 1);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_apply_with_cancelled_token_issues_nothing() {
    let reconciler =
        RelationReconciler::new(store(false, &[("g1", &[])]), RelationKind::SpaceBinding);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = reconciler
        .apply(
            &Diff {
                to_add: vec![rel("g1", "s1")],
                to_remove: vec![],
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(reconciler.store().calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_inflight_bind_stops_pass() {
    let s = store(false, &[("g1", &[])]).with_latency(Duration::from_secs(10));
    let reconciler = RelationReconciler::new(s, RelationKind::SpaceBinding);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = reconciler
        .apply(
            &Diff {
                to_add: vec![rel("g1", "s1"), rel("g1", "s2")],
                to_remove: vec![],
            },
            &cancel,
        )
        .await
        .unwrap_err();

    match err {
        ReconcileError::Cancelled { op, relation } => {
            assert_eq!(op, Operation::Bind);
            assert_eq!(relation, rel("g1", "s1"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(reconciler.store().calls().await.is_empty());
}

// =============================================================================
// Full passes
// =============================================================================

#[tokio::test]
async fn test_reconcile_exclusive_converges() {
    let reconciler = RelationReconciler::new(
        store(false, &[("g1", &["s1", "s3"]), ("g2", &[])]),
        RelationKind::SpaceBinding,
    );
    let declared = set(&[("g1", "s1"), ("g2", "s2")]);

    let outcome = reconciler
        .reconcile(&declared, &Ownership::Exclusive, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.report.added, 1);
    assert_eq!(outcome.report.removed, 1);
    assert_eq!(reconciler.observe().await.unwrap(), declared);

    // second pass is a no-op
    let again = reconciler
        .reconcile(&declared, &Ownership::Exclusive, false, &CancellationToken::new())
        .await
        .unwrap();
    assert!(again.diff.is_empty());
}

#[tokio::test]
async fn test_reconcile_adopt_all_with_admin_changes_nothing() {
    let reconciler = RelationReconciler::new(
        store(true, &[("g1", &["s1"])]),
        RelationKind::SpaceBinding,
    );

    let outcome = reconciler
        .reconcile(
            &set(&[("g9", "s9")]),
            &Ownership::Exclusive,
            true,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.desired.adopted);
    assert_eq!(outcome.desired.relations, set(&[("g1", "s1")]));
    assert!(outcome.diff.is_empty());
    assert!(reconciler.store().calls().await.is_empty());
}

#[tokio::test]
async fn test_reconcile_adopt_all_without_admin_falls_back() {
    let reconciler = RelationReconciler::new(
        store(false, &[("g1", &["s1"])]),
        RelationKind::SpaceBinding,
    );

    let outcome = reconciler
        .reconcile(
            &RelationSet::new(),
            &Ownership::Exclusive,
            true,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!outcome.desired.adopted);
    assert_eq!(outcome.diff.to_remove, vec![rel("g1", "s1")]);
    assert!(!reconciler.store().contains("g1", "s1").await);
}

#[tokio::test]
async fn test_reconcile_tracked_leaves_foreign_bindings() {
    let reconciler = RelationReconciler::new(
        store(false, &[("g1", &["s1", "foreign"])]),
        RelationKind::SpaceBinding,
    );

    let outcome = reconciler
        .reconcile(
            &RelationSet::new(),
            &Ownership::Tracked(set(&[("g1", "s1")])),
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.diff.to_remove, vec![rel("g1", "s1")]);
    assert!(outcome.converged);
    assert!(reconciler.store().contains("g1", "foreign").await);
}
