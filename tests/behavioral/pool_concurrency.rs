// ABOUTME: Behavioral tests for many tokio tasks sharing one state pool
// Verifies at-most-once creation and refcount balance under contention

use std::sync::Arc;
use std::time::Duration;

use statepool::state_pool::Session;

use super::fixtures::new_pool;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_sessions() {
    let pool = Arc::new(new_pool());
    let models = ["model-a", "model-b", "model-c", "model-d"];

    let mut handles = Vec::new();
    for i in 0..64 {
        let pool = Arc::clone(&pool);
        let key = models[i % models.len()];
        handles.push(tokio::spawn(async move {
            let session = pool.get(key).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            let id = session.instance_id();
            pool.put(key).await.unwrap();
            (key, id)
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap());
    }

    assert_eq!(pool.factory().calls(), models.len());
    for key in models {
        let ids: Vec<_> = seen.iter().filter(|(k, _)| *k == key).map(|(_, id)| *id).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "{key} should map to one session");
    }

    let report = pool.report().await;
    assert_eq!(report.entries.len(), models.len());
    assert!(report.entries.iter().all(|e| e.ref_count == 0));
    assert_eq!(report.metrics.total_gets, 64);
    assert_eq!(report.metrics.total_puts, 64);

    pool.close().await.unwrap();
    pool.system_state().close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remove_while_callers_hold_references() {
    let pool = Arc::new(new_pool());

    let session = pool.get("model-a").await.unwrap();
    for _ in 0..15 {
        pool.get("model-a").await.unwrap();
    }

    pool.remove("model-a").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move { pool.put("model-a").await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(session.is_closed());
    assert!(session.workers_dead().await);
    assert!(pool.is_empty().await);
    assert_eq!(pool.metrics().snapshot().sessions_closed, 1);

    pool.system_state().close().await.unwrap();
}
