//! Integration tests for the sync orchestrator.
//!
//! These drive a `TaskRegistry` end to end with a scripted fetcher and an
//! in-memory store, and guard against hangs with explicit timeouts.
//!
//! Key scenarios tested:
//! - Work list sizes for full, incremental and group syncs
//! - Unit failures and timeouts are counted without failing the task
//! - Enumeration failures fail the task before any unit runs
//! - Cancellation freezes the counters
//! - The last customer sync time is written only by incremental syncs

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crmsync::platform::{
    self, CustomerDetail, EntityFetcher, EntityId, EntityRecord, ExternalContact, FetchError,
    GroupDetail, Owner,
};
use crmsync::repository::{self, EntityStore, UpsertOutcome};
use crmsync::sync::{SyncKind, SyncOptions, SyncStatus, TaskRegistry, TaskSnapshot};

/// Maximum time any sync should take in tests.
/// If exceeded, there's likely a hang/deadlock.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

const POLL: Duration = Duration::from_millis(5);

// ─── Scripted fetcher ────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedFetcher {
    owners: Vec<Owner>,
    ids_by_owner: HashMap<String, Vec<EntityId>>,
    owners_error: Option<i64>,
    owners_delay: Duration,
    owners_calls: AtomicUsize,
    failing: HashSet<EntityId>,
    hanging: HashSet<EntityId>,
    groups: Vec<EntityId>,
    detail_delay: Duration,
    detail_calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_owners(owners: &[(&str, &[&str])]) -> Self {
        let mut fetcher = Self::default();
        for (userid, ids) in owners {
            fetcher.owners.push(Owner::new(*userid, userid.to_uppercase()));
            fetcher.ids_by_owner.insert(
                userid.to_string(),
                ids.iter().map(|id| id.to_string()).collect(),
            );
        }
        fetcher
    }
}

#[async_trait]
impl EntityFetcher for ScriptedFetcher {
    async fn list_owners(&self) -> platform::Result<Vec<Owner>> {
        self.owners_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.owners_delay).await;
        match self.owners_error {
            Some(code) => Err(FetchError::api(code, "no privilege to access")),
            None => Ok(self.owners.clone()),
        }
    }

    async fn list_entity_ids_for_owner(&self, owner: &Owner) -> platform::Result<Vec<EntityId>> {
        Ok(self
            .ids_by_owner
            .get(&owner.userid)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_customer_detail(&self, id: &EntityId) -> platform::Result<CustomerDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(id) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.detail_delay).await;
        if self.failing.contains(id) {
            return Err(FetchError::api(40096, "invalid external userid"));
        }
        Ok(CustomerDetail {
            external_contact: ExternalContact {
                external_userid: id.clone(),
                name: format!("customer {id}"),
                contact_type: 1,
                ..Default::default()
            },
            follow_user: Vec::new(),
        })
    }

    async fn list_group_ids(&self) -> platform::Result<Vec<EntityId>> {
        Ok(self.groups.clone())
    }

    async fn fetch_group_detail(&self, id: &EntityId) -> platform::Result<GroupDetail> {
        Ok(GroupDetail {
            chat_id: id.clone(),
            name: format!("group {id}"),
            owner: Some("zhangsan".to_string()),
            ..Default::default()
        })
    }
}

// ─── In-memory store ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStore {
    customers: Mutex<HashMap<EntityId, DateTime<Utc>>>,
    groups: Mutex<HashSet<EntityId>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_sync_writes: AtomicUsize,
}

impl MemoryStore {
    fn seeded(rows: &[(&str, DateTime<Utc>)]) -> Self {
        let store = Self::default();
        {
            let mut customers = store
                .customers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for (id, at) in rows {
                customers.insert(id.to_string(), *at);
            }
        }
        store
    }

    fn customer_ids(&self) -> HashSet<EntityId> {
        self.customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn exists(&self, id: &EntityId) -> repository::Result<bool> {
        Ok(self
            .customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id))
    }

    async fn known_ids(&self) -> repository::Result<HashSet<EntityId>> {
        Ok(self.customer_ids())
    }

    async fn upsert(&self, record: &EntityRecord) -> repository::Result<UpsertOutcome> {
        let fresh = match record {
            EntityRecord::Customer(c) => self
                .customers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(c.id.clone(), Utc::now())
                .is_none(),
            EntityRecord::Group(g) => self
                .groups
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(g.chat_id.clone()),
        };
        Ok(if fresh {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn stale_ids(&self, threshold: DateTime<Utc>) -> repository::Result<HashSet<EntityId>> {
        Ok(self
            .customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, at)| **at < threshold)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn last_sync_time(&self) -> repository::Result<Option<DateTime<Utc>>> {
        Ok(*self.last_sync.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> repository::Result<()> {
        self.last_sync_writes.fetch_add(1, Ordering::SeqCst);
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(at);
        Ok(())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn registry(
    fetcher: Arc<ScriptedFetcher>,
    store: Arc<MemoryStore>,
    options: SyncOptions,
) -> TaskRegistry {
    TaskRegistry::builder()
        .fetcher(fetcher)
        .store(store)
        .options(options)
        .build()
        .expect("registry should build")
}

async fn run_to_end(registry: &TaskRegistry, kind: SyncKind) -> TaskSnapshot {
    let id = registry.create(kind).expect("task should queue");
    tokio::time::timeout(SYNC_TIMEOUT, registry.wait_for_terminal(id, POLL))
        .await
        .expect("sync should finish within timeout")
        .expect("task should exist")
}

fn assert_counter_identity(snapshot: &TaskSnapshot) {
    assert_eq!(
        snapshot.processed_count,
        snapshot.added_count + snapshot.updated_count + snapshot.failed_count,
        "processed must equal added + updated + failed: {snapshot:?}"
    );
    assert!(snapshot.processed_count <= snapshot.total_count);
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_sync_counts_every_owner_pair() {
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[
        ("zhangsan", &["wm_1", "wm_2"]),
        ("lisi", &["wm_3", "wm_4", "wm_5", "wm_6", "wm_7"]),
        ("wangwu", &[]),
    ]));
    let store = Arc::new(MemoryStore::default());
    let registry = registry(fetcher, Arc::clone(&store), SyncOptions::default());

    let snapshot = run_to_end(&registry, SyncKind::Full).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.total_count, 7);
    assert_eq!(snapshot.processed_count, 7);
    assert_eq!(snapshot.added_count, 7);
    assert_eq!(snapshot.progress_percent, 100);
    assert!(snapshot.error_message.is_none());
    assert_eq!(store.customer_ids().len(), 7);
}

#[tokio::test]
async fn shared_customer_is_added_once_and_updated_once() {
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[
        ("zhangsan", &["wm_shared"]),
        ("lisi", &["wm_shared"]),
    ]));
    let options = SyncOptions {
        worker_count: 1,
        ..SyncOptions::default()
    };
    let registry = registry(fetcher, Arc::new(MemoryStore::default()), options);

    let snapshot = run_to_end(&registry, SyncKind::Full).await;

    assert_eq!(snapshot.total_count, 2);
    assert_eq!(snapshot.added_count, 1);
    assert_eq!(snapshot.updated_count, 1);
    assert_counter_identity(&snapshot);
}

#[tokio::test]
async fn incremental_on_empty_store_takes_everything() {
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[(
        "zhangsan",
        &["wm_1", "wm_2", "wm_3"],
    )]));
    let registry = registry(fetcher, Arc::new(MemoryStore::default()), SyncOptions::default());

    let snapshot = run_to_end(&registry, SyncKind::Incremental).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.total_count, 3);
    assert_eq!(snapshot.added_count, 3);
}

#[tokio::test]
async fn incremental_skips_fresh_customers() {
    let now = Utc::now();
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[(
        "zhangsan",
        &["wm_a", "wm_b", "wm_c"],
    )]));
    let store = Arc::new(MemoryStore::seeded(&[
        ("wm_a", now - chrono::Duration::hours(7)),
        ("wm_b", now - chrono::Duration::hours(1)),
    ]));
    let registry = registry(
        Arc::clone(&fetcher),
        Arc::clone(&store),
        SyncOptions::default(),
    );

    let snapshot = run_to_end(&registry, SyncKind::Incremental).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.total_count, 2, "only the stale and the new customer");
    assert_eq!(snapshot.added_count, 1);
    assert_eq!(snapshot.updated_count, 1);
    assert_eq!(fetcher.detail_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unit_timeout_is_counted_as_failure() {
    let mut fetcher = ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1", "wm_slow", "wm_3"])]);
    fetcher.hanging.insert("wm_slow".to_string());
    let options = SyncOptions {
        unit_timeout: Duration::from_millis(50),
        ..SyncOptions::default()
    };
    let registry = registry(Arc::new(fetcher), Arc::new(MemoryStore::default()), options);

    let snapshot = run_to_end(&registry, SyncKind::Full).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.total_count, 3);
    assert_eq!(snapshot.processed_count, 3);
    assert_eq!(snapshot.failed_count, 1);
    assert_eq!(snapshot.added_count, 2);
    assert_eq!(snapshot.recent_failures.len(), 1);
    assert_eq!(snapshot.recent_failures[0].entity_id, "wm_slow");
    assert!(snapshot.recent_failures[0].error.contains("Timed out"));
}

#[tokio::test]
async fn unit_failures_keep_the_task_completed() {
    let mut fetcher =
        ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1", "wm_2", "wm_3", "wm_4"])]);
    fetcher.failing.insert("wm_2".to_string());
    fetcher.failing.insert("wm_4".to_string());
    let registry = registry(
        Arc::new(fetcher),
        Arc::new(MemoryStore::default()),
        SyncOptions::default(),
    );

    let snapshot = run_to_end(&registry, SyncKind::Full).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.failed_count, 2);
    assert_eq!(snapshot.added_count, 2);
    assert_counter_identity(&snapshot);
    assert!(snapshot.error_message.is_none());
}

#[tokio::test]
async fn enumeration_failure_fails_the_task() {
    let mut fetcher = ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1"])]);
    fetcher.owners_error = Some(60011);
    let fetcher = Arc::new(fetcher);
    let registry = registry(
        Arc::clone(&fetcher),
        Arc::new(MemoryStore::default()),
        SyncOptions::default(),
    );

    let snapshot = run_to_end(&registry, SyncKind::Full).await;

    assert_eq!(snapshot.status, SyncStatus::Failed);
    assert_eq!(snapshot.total_count, 0);
    assert_eq!(snapshot.processed_count, 0);
    let message = snapshot.error_message.expect("failed task carries a message");
    assert!(message.contains("60011"), "unexpected message: {message}");
    assert_eq!(fetcher.detail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_during_enumeration_ends_cancelled_not_failed() {
    let mut fetcher = ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1"])]);
    fetcher.owners_error = Some(60011);
    fetcher.owners_delay = Duration::from_millis(200);
    let fetcher = Arc::new(fetcher);
    let registry = registry(
        Arc::clone(&fetcher),
        Arc::new(MemoryStore::default()),
        SyncOptions::default(),
    );

    let running = registry.create(SyncKind::Full).expect("task should queue");
    let queued = registry.create(SyncKind::Full).expect("task should queue");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(registry.cancel(running));
    assert!(registry.cancel(queued));

    for id in [running, queued] {
        let snapshot = tokio::time::timeout(SYNC_TIMEOUT, registry.wait_for_terminal(id, POLL))
            .await
            .expect("cancelled task should settle")
            .expect("task exists");
        assert_eq!(snapshot.status, SyncStatus::Cancelled);
        assert!(snapshot.error_message.is_none(), "{snapshot:?}");
        assert_eq!(snapshot.processed_count, 0);
    }
    assert_eq!(
        fetcher.owners_calls.load(Ordering::SeqCst),
        1,
        "the queued task must not enumerate after its cancel"
    );
    assert_eq!(fetcher.detail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_work_list_completes_at_full_progress() {
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[]));
    let registry = registry(fetcher, Arc::new(MemoryStore::default()), SyncOptions::default());

    let snapshot = run_to_end(&registry, SyncKind::Full).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.total_count, 0);
    assert_eq!(snapshot.progress_percent, 100);
}

#[tokio::test]
async fn cancel_freezes_progress() {
    let ids: Vec<String> = (0..40).map(|i| format!("wm_{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let mut fetcher = ScriptedFetcher::with_owners(&[("zhangsan", id_refs.as_slice())]);
    fetcher.detail_delay = Duration::from_millis(20);
    let options = SyncOptions {
        worker_count: 2,
        ..SyncOptions::default()
    };
    let registry = registry(Arc::new(fetcher), Arc::new(MemoryStore::default()), options);

    let id = registry.create(SyncKind::Full).expect("task should queue");
    tokio::time::timeout(SYNC_TIMEOUT, async {
        loop {
            if let Some(snap) = registry.get(id)
                && snap.processed_count >= 2
            {
                break;
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("some units should finish");

    assert!(registry.cancel(id));
    let at_cancel = registry.get(id).expect("task exists").processed_count;

    let snapshot = tokio::time::timeout(SYNC_TIMEOUT, registry.wait_for_terminal(id, POLL))
        .await
        .expect("cancelled task should settle")
        .expect("task exists");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let later = registry.get(id).expect("task exists");

    assert_eq!(snapshot.status, SyncStatus::Cancelled);
    assert!(snapshot.error_message.is_none());
    assert_eq!(later.processed_count, at_cancel);
    assert!(later.processed_count < 40);
    assert_counter_identity(&later);
    assert!(!registry.cancel(id), "terminal tasks cannot be cancelled");
}

#[tokio::test]
async fn group_sync_upserts_every_group() {
    let mut fetcher = ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1"])]);
    fetcher.groups = vec!["wr_1".to_string(), "wr_2".to_string(), "wr_3".to_string()];
    let fetcher = Arc::new(fetcher);
    let store = Arc::new(MemoryStore::default());
    let registry = registry(
        Arc::clone(&fetcher),
        Arc::clone(&store),
        SyncOptions::default(),
    );

    let snapshot = run_to_end(&registry, SyncKind::GroupSync).await;

    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(snapshot.total_count, 3);
    assert_eq!(snapshot.added_count, 3);
    assert_eq!(fetcher.detail_calls.load(Ordering::SeqCst), 0);
    assert!(store.customer_ids().is_empty());
    assert_eq!(store.last_sync_writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn only_incremental_records_last_sync_time() {
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1"])]));
    let store = Arc::new(MemoryStore::default());
    let registry = registry(fetcher, Arc::clone(&store), SyncOptions::default());

    run_to_end(&registry, SyncKind::Full).await;
    assert_eq!(store.last_sync_writes.load(Ordering::SeqCst), 0);

    let before = Utc::now();
    let snapshot = run_to_end(&registry, SyncKind::Incremental).await;
    assert_eq!(snapshot.status, SyncStatus::Completed);
    assert_eq!(store.last_sync_writes.load(Ordering::SeqCst), 1);
    let recorded = store
        .last_sync_time()
        .await
        .expect("read")
        .expect("incremental stores its start time");
    assert!(recorded >= before - chrono::Duration::seconds(1));
    assert!(recorded <= snapshot.ended_at.expect("terminal tasks have an end"));
}

#[tokio::test]
async fn tasks_run_one_at_a_time_in_creation_order() {
    let mut fetcher = ScriptedFetcher::with_owners(&[("zhangsan", &["wm_1", "wm_2"])]);
    fetcher.detail_delay = Duration::from_millis(10);
    let registry = registry(
        Arc::new(fetcher),
        Arc::new(MemoryStore::default()),
        SyncOptions::default(),
    );

    let first = registry.create(SyncKind::Full).expect("queued");
    let second = registry.create(SyncKind::Incremental).expect("queued");
    assert!(registry.has_active(SyncKind::Incremental));

    let second_done = tokio::time::timeout(SYNC_TIMEOUT, registry.wait_for_terminal(second, POLL))
        .await
        .expect("finishes")
        .expect("exists");
    let first_done = registry.get(first).expect("exists");

    assert_eq!(first_done.status, SyncStatus::Completed);
    let first_end = first_done.ended_at.expect("first ended");
    let second_start = second_done.started_at.expect("second started");
    assert!(first_end <= second_start);

    let listed: Vec<_> = registry.list().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![first, second]);
    assert!(!registry.has_active(SyncKind::Incremental));
}

#[cfg(all(feature = "sqlite", feature = "migrate"))]
#[tokio::test]
async fn full_then_incremental_against_sqlite() {
    use crmsync::{DbStore, connect_and_migrate};

    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("test db should migrate");
    let store = Arc::new(DbStore::new(db));
    let fetcher = Arc::new(ScriptedFetcher::with_owners(&[
        ("zhangsan", &["wm_1", "wm_2"]),
        ("lisi", &["wm_3"]),
    ]));
    let registry = TaskRegistry::builder()
        .fetcher(fetcher)
        .store(Arc::clone(&store) as Arc<dyn EntityStore>)
        .build()
        .expect("registry should build");

    let full = run_to_end(&registry, SyncKind::Full).await;
    assert_eq!(full.status, SyncStatus::Completed);
    assert_eq!(full.added_count, 3);

    // Everything was just written, so nothing is stale or new.
    let incremental = run_to_end(&registry, SyncKind::Incremental).await;
    assert_eq!(incremental.status, SyncStatus::Completed);
    assert_eq!(incremental.total_count, 0);
    assert!(store.last_sync_time().await.expect("read").is_some());
}
