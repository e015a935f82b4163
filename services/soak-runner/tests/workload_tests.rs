//! Workload behavior tests against the in-process store.

use std::sync::Arc;
use std::time::Duration;

use store_client::{MemoryStore, StoreOps};

use soak_runner::config::{LockConfig, SoakConfig};
use soak_runner::keyspace::{KeySpace, BUCKET_SIZE};
use soak_runner::metrics::MetricsHandle;
use soak_runner::workload::{self, WorkloadSuite};

fn test_config(key_count: usize, use_buckets: bool) -> SoakConfig {
    SoakConfig {
        key_count,
        thread_groups: 1,
        use_buckets,
        warmup_fanout: 8,
        bucket_fanout: 4,
        lock: LockConfig {
            lease_ms: 50,
            max_wait_ms: 20,
            retry_ms: 5,
            hold_ms: 5,
        },
        ..SoakConfig::default()
    }
}

fn suite_with(
    key_count: usize,
    use_buckets: bool,
) -> (Arc<MemoryStore>, MetricsHandle, Arc<WorkloadSuite<MemoryStore>>) {
    let store = Arc::new(MemoryStore::new());
    let metrics = MetricsHandle::new();
    let config = test_config(key_count, use_buckets);
    let keyspace = KeySpace::generate(config.key_count);
    let suite = Arc::new(WorkloadSuite::new(
        store.clone(),
        keyspace,
        config,
        metrics.clone(),
    ));
    (store, metrics, suite)
}

fn expected_bucket(bucket: usize) -> Vec<String> {
    (bucket * BUCKET_SIZE..(bucket + 1) * BUCKET_SIZE)
        .map(|i| format!("value_{}", i + 1))
        .collect()
}

#[tokio::test]
async fn warm_up_writes_every_key() {
    let (store, _, suite) = suite_with(2500, false);
    suite.warm_up().await.unwrap();

    for i in 0..2500 {
        let key = format!("value_{}", i + 1);
        assert!(
            store.get(&key).await.unwrap().is_some(),
            "{} missing after warm-up",
            key
        );
    }
}

#[tokio::test]
async fn flat_add_unions_whole_space_into_one_collection() {
    let (store, metrics, suite) = suite_with(1500, false);
    suite.add_flat_once().await;
    // Idempotent under repetition.
    suite.add_flat_once().await;

    let mut members = store.set_members("value").await.unwrap();
    members.sort();
    let mut expected: Vec<String> = (0..1500).map(|i| format!("value_{}", i + 1)).collect();
    expected.sort();
    assert_eq!(members, expected);

    suite.find_flat_once().await;

    let snapshot = metrics.snapshot().await;
    let find = snapshot.ops.iter().find(|o| o.op == "FindKeys").unwrap();
    assert_eq!(find.count, 1);
    assert_eq!(find.items, 1500, "membership read missed entries");
    let get = snapshot.ops.iter().find(|o| o.op == "GetKeys").unwrap();
    assert_eq!(get.count, 1);
    assert_eq!(get.items, 1500, "batch read did not cover the key space");
}

#[tokio::test]
async fn find_pass_batch_reads_full_space_even_with_empty_membership() {
    // The batch-read phase always covers the whole key space, not the
    // members the collection returned.
    let (_, metrics, suite) = suite_with(1200, false);
    suite.find_flat_once().await;

    let snapshot = metrics.snapshot().await;
    let find = snapshot.ops.iter().find(|o| o.op == "FindKeys").unwrap();
    assert_eq!(find.items, 0);
    let get = snapshot.ops.iter().find(|o| o.op == "GetKeys").unwrap();
    assert_eq!(get.items, 1200);
}

#[tokio::test]
async fn bucketed_add_fills_one_collection_per_complete_bucket() {
    let (store, _, suite) = suite_with(5000, true);
    suite.add_buckets_once().await;

    for bucket in 0..5 {
        let collection = format!("keys_{}", bucket);
        let mut members = store.set_members(&collection).await.unwrap();
        members.sort();
        let mut expected = expected_bucket(bucket);
        expected.sort();
        assert_eq!(members.len(), BUCKET_SIZE, "{} wrong size", collection);
        assert_eq!(members, expected, "{} holds foreign labels", collection);
    }

    suite.find_buckets_once().await;
}

#[tokio::test]
async fn partial_tail_bucket_is_never_materialized() {
    let (store, _, suite) = suite_with(5500, true);
    suite.add_buckets_once().await;

    // Five complete buckets, nothing for the 500-label tail.
    assert_eq!(store.set_members("keys_4").await.unwrap().len(), BUCKET_SIZE);
    assert!(store.set_members("keys_5").await.unwrap().is_empty());

    for bucket in 0..5 {
        let members = store
            .set_members(&format!("keys_{}", bucket))
            .await
            .unwrap();
        assert!(!members.contains(&"value_5001".to_string()));
        assert!(!members.contains(&"value_5500".to_string()));
    }
}

#[tokio::test]
async fn space_smaller_than_bucket_yields_no_collections() {
    let (store, _, suite) = suite_with(500, true);
    suite.add_buckets_once().await;
    suite.find_buckets_once().await;
    assert!(store.set_members("keys_0").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loops_drain_at_iteration_boundary_on_shutdown() {
    let (_, metrics, suite) = suite_with(200, false);
    suite.warm_up().await.unwrap();

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let handles = suite.spawn_loops(&shutdown_tx);
    assert_eq!(handles.len(), 7);

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown_tx.send(()).unwrap();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;
    assert!(drained.is_ok(), "loops did not drain after shutdown");

    let snapshot = metrics.snapshot().await;
    let set = snapshot.ops.iter().find(|o| o.op == "SetKey");
    assert!(set.is_some_and(|o| o.count > 0), "no writes recorded");
    let lock = snapshot.ops.iter().find(|o| o.op == "Lock");
    assert!(lock.is_some_and(|o| o.count > 0), "no lock rounds recorded");
}

#[tokio::test]
async fn drain_outlives_a_panicked_task() {
    let good = tokio::spawn(async {});
    let bad = tokio::spawn(async { panic!("loop gave out") });

    // Must finish despite the panic instead of propagating it.
    workload::drain_loops(vec![good, bad]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contention_rounds_record_timeouts_while_lock_is_held() {
    let (store, metrics, suite) = suite_with(50, false);
    suite.warm_up().await.unwrap();

    // Pin every contended name for longer than the whole test runs.
    for name in ["lock_1", "lock_2", "lock_3"] {
        store
            .acquire_lock(name, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let handles = suite.spawn_loops(&shutdown_tx);

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;
    assert!(drained.is_ok(), "loops did not drain after shutdown");

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.lock_acquired, 0);
    assert!(snapshot.lock_timed_out > 0, "no timed-out rounds recorded");
}
