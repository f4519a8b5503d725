//! Reconciliation runs against a real SQLite store.
//!
//! Covers repeated runs, per-item failure isolation through an injecting
//! store wrapper, and the service-level sync with instance notification.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{FailingStore, RecordingNotifier, synced_group};
use mvirt_secgroup::sync::compare_sets;
use mvirt_secgroup::{
    GroupStore, InstanceRole, JsonSnapshotProvider, LoggingNotifier, ProviderCredentials,
    RemoteSecurityGroup, SecGroupError, SecGroupService, SecurityGroupData,
    SecurityGroupReconciler, StaticProvider, Storage, SyncStatus,
};

fn remote(ids: &[&str]) -> Vec<RemoteSecurityGroup> {
    ids.iter()
        .map(|id| RemoteSecurityGroup::new(id, &format!("name-{id}"), None))
        .collect()
}

// ============================================================================
// Repeated runs
// ============================================================================

#[test]
fn test_second_run_only_updates() {
    let storage = Storage::in_memory().expect("Failed to open storage");
    synced_group(&storage, "sg-1", "old");

    let listing = remote(&["sg-1", "sg-2", "sg-3"]);
    let reconciler = SecurityGroupReconciler::new(&storage, "p1");

    let first = reconciler.sync(&listing).expect("First run failed");
    assert_eq!(first.result.added, 2);
    assert_eq!(first.result.updated, 1);

    let second = reconciler.sync(&listing).expect("Second run failed");
    assert_eq!(second.result.added, 0);
    assert_eq!(second.result.updated, 3);
    assert_eq!(second.result.error_count(), 0);
    assert!(second.changed.is_empty(), "Nothing changed on the second run");
    assert_eq!(storage.list_security_groups().unwrap().len(), 3);
}

#[test]
fn test_outputs_aligned_with_provider_identity() {
    let storage = Storage::in_memory().expect("Failed to open storage");
    synced_group(&storage, "sg-b", "b");
    synced_group(&storage, "sg-a", "a");

    let listing = remote(&["sg-a", "sg-c", "sg-b"]);
    let outcome = SecurityGroupReconciler::new(&storage, "p1")
        .sync(&listing)
        .expect("Sync failed");

    assert_eq!(outcome.local.len(), outcome.remote.len());
    for (local, ext) in outcome.local.iter().zip(&outcome.remote) {
        assert_eq!(local.external_id.as_deref(), Some(ext.global_id.as_str()));
        assert_eq!(local.name, ext.name);
    }

    // Matched pairs come first in provider order, then additions
    let order: Vec<_> = outcome.remote.iter().map(|r| r.global_id.as_str()).collect();
    assert_eq!(order, vec!["sg-a", "sg-b", "sg-c"]);
}

#[test]
fn test_partition_covers_every_identity() {
    let snapshots: [(&[&str], &[&str]); 4] = [
        (&[], &["x"]),
        (&["x"], &[]),
        (&["a", "b", "c"], &["c", "d", "a"]),
        (&["a", "b"], &["a", "b"]),
    ];

    for (local_ids, remote_ids) in snapshots {
        let local: Vec<_> = local_ids
            .iter()
            .map(|id| {
                SecurityGroupData::from_remote(id.to_string(), id.to_string(), None, "p1".into())
            })
            .collect();
        let listing = remote(remote_ids);
        let p = compare_sets(&local, &listing).expect("Partition failed");

        assert_eq!(p.removed.len() + p.common_local.len(), local.len());
        assert_eq!(p.common_remote.len() + p.added.len(), listing.len());
        assert_eq!(p.common_local.len(), p.common_remote.len());

        let remote_set: HashSet<_> = remote_ids.iter().copied().collect();
        for sg in &p.removed {
            assert!(!remote_set.contains(sg.external_id.as_deref().unwrap()));
        }
    }
}

#[test]
fn test_duplicate_remote_identity_aborts() {
    let storage = Storage::in_memory().expect("Failed to open storage");
    let mut listing = remote(&["sg-1", "sg-2"]);
    listing.push(RemoteSecurityGroup::new("sg-1", "dup", None));

    let err = SecurityGroupReconciler::new(&storage, "p1")
        .sync(&listing)
        .unwrap_err();

    assert!(matches!(err, SecGroupError::IdentityConflict { .. }));
    assert!(storage.list_security_groups().unwrap().is_empty());
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_failed_additions_do_not_stop_the_run() {
    let mut store = FailingStore::new(Storage::in_memory().expect("Failed to open storage"));
    store.fail_create.insert("sg-2".to_string());
    store.fail_create.insert("sg-4".to_string());

    let listing = remote(&["sg-1", "sg-2", "sg-3", "sg-4", "sg-5"]);
    let outcome = SecurityGroupReconciler::new(&store, "p1")
        .sync(&listing)
        .expect("Sync failed");

    assert_eq!(outcome.result.added, 3);
    assert_eq!(outcome.result.add_errors, 2);
    assert_eq!(outcome.result.status(), SyncStatus::Degraded);
    assert_eq!(
        *store.create_attempts.lock().unwrap(),
        vec!["sg-1", "sg-2", "sg-3", "sg-4", "sg-5"]
    );

    let failed: Vec<_> = outcome
        .result
        .failures
        .iter()
        .map(|f| f.external_id.as_str())
        .collect();
    assert_eq!(failed, vec!["sg-2", "sg-4"]);

    assert!(store.find_by_external_id("sg-5").unwrap().is_some());
    assert!(store.find_by_external_id("sg-4").unwrap().is_none());
    assert_eq!(outcome.local.len(), 3);
}

#[test]
fn test_failed_update_is_isolated() {
    let storage = Storage::in_memory().expect("Failed to open storage");
    let stuck = synced_group(&storage, "sg-1", "one");
    let fine = synced_group(&storage, "sg-2", "two");

    let mut store = FailingStore::new(storage);
    store.fail_update.insert(stuck.id);

    let listing = vec![
        RemoteSecurityGroup::new("sg-1", "one-renamed", None),
        RemoteSecurityGroup::new("sg-2", "two-renamed", None),
        RemoteSecurityGroup::new("sg-3", "three", None),
    ];
    let outcome = SecurityGroupReconciler::new(&store, "p1")
        .sync(&listing)
        .expect("Sync failed");

    assert_eq!(outcome.result.updated, 1);
    assert_eq!(outcome.result.update_errors, 1);
    assert_eq!(outcome.result.added, 1);
    assert_eq!(outcome.changed, vec![fine.id]);

    let untouched = store.get_security_group_by_id(&stuck.id).unwrap().unwrap();
    assert_eq!(untouched.name, "one");
    let renamed = store.get_security_group_by_id(&fine.id).unwrap().unwrap();
    assert_eq!(renamed.name, "two-renamed");
}

// ============================================================================
// Service-level sync
// ============================================================================

#[tokio::test]
async fn test_sync_scope_notifies_changed_groups() {
    let storage = Arc::new(Storage::in_memory().expect("Failed to open storage"));
    let web = synced_group(storage.as_ref(), "sg-web", "web");
    let db = synced_group(storage.as_ref(), "sg-db", "db");
    storage
        .attach_instance("vm-1", &web.id, InstanceRole::Primary)
        .unwrap();
    storage
        .attach_instance("vm-2", &db.id, InstanceRole::Primary)
        .unwrap();

    let provider = Arc::new(StaticProvider::new(vec![
        RemoteSecurityGroup::new("sg-web", "web-v2", None),
        RemoteSecurityGroup::new("sg-db", "db", None),
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = SecGroupService::new(storage.clone(), provider.clone(), notifier.clone());

    let outcome = service
        .sync_scope("p1", &ProviderCredentials::new("acct"))
        .await
        .expect("Sync failed");

    assert_eq!(outcome.result.status(), SyncStatus::Synced);
    assert_eq!(outcome.changed, vec![web.id]);
    assert_eq!(
        *notifier.calls.lock().unwrap(),
        vec![("vm-1".to_string(), web.id)]
    );
    assert!(service.get_security_group(&web.id).unwrap().is_dirty);
    assert!(!service.get_security_group(&db.id).unwrap().is_dirty);
}

#[tokio::test]
async fn test_sync_scope_provider_failure_is_fatal() {
    let storage = Arc::new(Storage::in_memory().expect("Failed to open storage"));
    synced_group(storage.as_ref(), "sg-web", "web");

    let service = SecGroupService::new(
        storage.clone(),
        Arc::new(JsonSnapshotProvider::new("/nonexistent/snapshot.json")),
        Arc::new(LoggingNotifier),
    );

    let err = service
        .sync_scope("p1", &ProviderCredentials::new("acct"))
        .await
        .unwrap_err();
    assert!(matches!(err, SecGroupError::Provider(_)));

    // Nothing was touched
    let groups = storage.list_security_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "web");
}

#[tokio::test]
async fn test_concurrent_scope_syncs_do_not_duplicate() {
    let storage = Arc::new(Storage::in_memory().expect("Failed to open storage"));
    let provider = Arc::new(StaticProvider::new(remote(&["sg-1", "sg-2", "sg-3"])));
    let service = Arc::new(SecGroupService::new(
        storage.clone(),
        provider,
        Arc::new(LoggingNotifier),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .sync_scope("p1", &ProviderCredentials::new("acct"))
                .await
        }));
    }

    let mut added = 0;
    for handle in handles {
        let outcome = handle.await.expect("Task panicked").expect("Sync failed");
        added += outcome.result.added;
    }

    assert_eq!(added, 3, "Each provider group is added exactly once");
    assert_eq!(storage.list_security_groups().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_syncs_for_two_projects() {
    let ids: Vec<String> = (0..100).map(|i| format!("sg-{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let storage = Arc::new(Storage::in_memory().expect("Failed to open storage"));
    let service = Arc::new(SecGroupService::new(
        storage.clone(),
        Arc::new(StaticProvider::new(remote(&id_refs))),
        Arc::new(LoggingNotifier),
    ));

    let handles: Vec<_> = ["p1", "p2"]
        .into_iter()
        .map(|project| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .sync_scope(project, &ProviderCredentials::new("acct"))
                    .await
            })
        })
        .collect();

    let mut synced = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("Task panicked") {
            Ok(outcome) => {
                assert_eq!(outcome.result.status(), SyncStatus::Synced);
                assert_eq!(outcome.result.added, 100);
                assert!(outcome.result.removed.is_empty());
                synced += 1;
            }
            Err(SecGroupError::IdentityConflict { .. }) => conflicts += 1,
            Err(e) => panic!("Unexpected sync error: {e}"),
        }
    }

    // The first run owns every identity; the second is rejected whole
    assert_eq!((synced, conflicts), (1, 1));
    let groups = storage.list_security_groups().unwrap();
    assert_eq!(groups.len(), 100);
    assert!(groups.iter().all(|g| g.project_id == groups[0].project_id));
}

#[tokio::test]
async fn test_sync_scope_ignores_other_projects_groups() {
    let storage = Arc::new(Storage::in_memory().expect("Failed to open storage"));
    let kept = synced_group(storage.as_ref(), "sg-web", "web");

    let service = SecGroupService::new(
        storage.clone(),
        Arc::new(StaticProvider::default()),
        Arc::new(LoggingNotifier),
    );

    let outcome = service
        .sync_scope("p2", &ProviderCredentials::new("acct"))
        .await
        .expect("Sync failed");

    assert!(outcome.result.removed.is_empty());
    assert!(storage.get_security_group_by_id(&kept.id).unwrap().is_some());
}

#[tokio::test]
async fn test_mark_for_sync_notifies_when_flag_write_fails() {
    let storage = Storage::in_memory().expect("Failed to open storage");
    let web = synced_group(&storage, "sg-web", "web");
    storage
        .attach_instance("vm-1", &web.id, InstanceRole::Primary)
        .unwrap();
    storage
        .attach_instance("vm-2", &web.id, InstanceRole::Admin)
        .unwrap();

    let mut store = FailingStore::new(storage);
    store.fail_update.insert(web.id);
    let notifier = Arc::new(RecordingNotifier::default());
    let service = SecGroupService::new(
        Arc::new(store),
        Arc::new(StaticProvider::default()),
        notifier.clone(),
    );

    let notified = service
        .mark_for_sync(&web.id)
        .await
        .expect("Marking for sync failed");

    assert_eq!(notified, 2);
    assert_eq!(notifier.calls.lock().unwrap().len(), 2);
    assert!(!service.get_security_group(&web.id).unwrap().is_dirty);
}
