// ABOUTME: Behavioral tests for state pool get/put/remove/close semantics
// Verifies sharing, reference counting, deferred teardown and the system exemption

use std::sync::Arc;

use statepool::state_pool::{PoolError, Session};

use super::fixtures::{new_pool, SYSTEM_MODEL};

// ============================================================================
// Sharing
// ============================================================================

#[tokio::test]
async fn test_get_shares_one_session_per_model() {
    let pool = new_pool();

    let a1 = pool.get("model-a").await.unwrap();
    let b1 = pool.get("model-b").await.unwrap();
    let a2 = pool.get("model-a").await.unwrap();
    let b2 = pool.get("model-b").await.unwrap();

    assert!(Arc::ptr_eq(&a1, &a2), "same model should share a session");
    assert!(Arc::ptr_eq(&b1, &b2), "same model should share a session");
    assert_ne!(a1.instance_id(), b1.instance_id());
    assert_eq!(a1.key(), "model-a");
    assert_eq!(pool.factory().calls(), 2);

    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_system_model_is_exempt() {
    let pool = new_pool();

    let system = pool.get(SYSTEM_MODEL).await.unwrap();
    assert!(Arc::ptr_eq(&system, pool.system_state()));
    assert_eq!(pool.factory().calls(), 0, "system session is never built by the factory");

    // Put and remove of the system model are no-ops
    pool.put(SYSTEM_MODEL).await.unwrap();
    pool.put(SYSTEM_MODEL).await.unwrap();
    pool.remove(SYSTEM_MODEL).await.unwrap();
    assert!(pool.is_empty().await);

    // Pool shutdown leaves the system session running
    pool.close().await.unwrap();
    assert!(!system.is_closed());
    assert!(system.workers_alive().await);

    system.close().await.unwrap();
}

// ============================================================================
// Reference counting
// ============================================================================

#[tokio::test]
async fn test_balanced_get_put_creates_once() {
    let pool = new_pool();

    for _ in 0..10 {
        pool.get("model-a").await.unwrap();
        pool.put("model-a").await.unwrap();
    }

    assert_eq!(pool.factory().calls(), 1);
    let info = pool.entry_info("model-a").await.expect("model-a should stay pooled");
    assert_eq!(info.ref_count, 0);
    assert!(!info.removed);

    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_too_many_puts() {
    let pool = new_pool();

    pool.get("model-a").await.unwrap();
    pool.put("model-a").await.unwrap();

    let err = pool.put("model-a").await.unwrap_err();
    assert_eq!(err.to_string(), "state pool refcount for model model-a is already 0");

    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_put_unknown_model() {
    let pool = new_pool();

    let err = pool.put("deadbeef").await.unwrap_err();
    assert!(matches!(err, PoolError::UnknownModel(ref key) if key == "deadbeef"));
}

// ============================================================================
// Removal
// ============================================================================

#[tokio::test]
async fn test_remove_with_references_defers_close() {
    let pool = new_pool();

    let session = pool.get("model-a").await.unwrap();
    pool.get("model-a").await.unwrap();

    pool.remove("model-a").await.unwrap();
    assert!(session.workers_alive().await, "close must wait for outstanding references");

    let err = pool.get("model-a").await.unwrap_err();
    assert_eq!(err.to_string(), "model model-a has been removed");

    pool.put("model-a").await.unwrap();
    assert!(session.workers_alive().await);

    pool.put("model-a").await.unwrap();
    assert!(session.is_closed());
    assert!(session.workers_dead().await);
    assert!(pool.entry_info("model-a").await.is_none());
}

#[tokio::test]
async fn test_remove_without_references_closes_immediately() {
    let pool = new_pool();

    let session = pool.get("model-a").await.unwrap();
    pool.put("model-a").await.unwrap();

    pool.remove("model-a").await.unwrap();

    assert!(session.is_closed());
    assert!(session.workers_dead().await);

    // A later get builds a brand new session
    let fresh = pool.get("model-a").await.unwrap();
    assert_ne!(fresh.instance_id(), session.instance_id());
    assert_eq!(pool.factory().calls(), 2);

    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_remove_unknown_model_is_ok() {
    let pool = new_pool();
    pool.remove("abaddad").await.unwrap();
    assert_eq!(pool.factory().calls(), 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_close_tears_down_all_sessions() {
    let pool = new_pool();

    let held = pool.get("model-a").await.unwrap();
    let idle = pool.get("model-b").await.unwrap();
    pool.put("model-b").await.unwrap();
    let draining = pool.get("model-c").await.unwrap();
    pool.remove("model-c").await.unwrap();

    pool.close().await.unwrap();

    for session in [&held, &idle, &draining] {
        assert!(session.is_closed(), "{} should be closed", session.key());
        assert!(session.workers_dead().await);
    }
    assert!(pool.is_empty().await);
    assert!(pool.system_state().workers_alive().await);

    // Subsequent gets create fresh sessions
    let fresh = pool.get("model-a").await.unwrap();
    assert_ne!(fresh.instance_id(), held.instance_id());
    assert!(fresh.workers_alive().await);

    pool.close().await.unwrap();
    pool.system_state().close().await.unwrap();
}

#[tokio::test]
async fn test_close_empty_pool() {
    let pool = new_pool();
    pool.close().await.unwrap();
    pool.system_state().close().await.unwrap();
}

// ============================================================================
// Factory failures
// ============================================================================

#[tokio::test]
async fn test_invalid_key_leaves_no_entry_and_retries_factory() {
    let pool = new_pool();

    let err = pool.get("bad key").await.unwrap_err();
    assert!(matches!(err, PoolError::CreateFailed { ref key, .. } if key == "bad key"));
    assert!(pool.is_empty().await);

    assert!(pool.get("bad key").await.is_err());
    assert_eq!(pool.factory().calls(), 2, "a failed create is not cached");
    assert_eq!(pool.metrics().snapshot().create_errors, 2);
}

// ============================================================================
// Forced worker termination
// ============================================================================

#[tokio::test]
async fn test_kill_workers_keeps_bookkeeping() {
    let pool = new_pool();

    let a = pool.get("model-a").await.unwrap();
    let b = pool.get("model-b").await.unwrap();
    pool.put("model-b").await.unwrap();

    pool.kill_workers(false).await;

    assert!(a.workers_dead().await);
    assert!(b.workers_dead().await);
    assert!(!a.is_closed(), "killing workers does not close the session");
    assert!(pool.system_state().workers_alive().await);

    assert_eq!(pool.entry_info("model-a").await.map(|i| i.ref_count), Some(1));
    assert_eq!(pool.entry_info("model-b").await.map(|i| i.ref_count), Some(0));

    pool.kill_workers(true).await;
    assert!(pool.system_state().workers_dead().await);

    // Sessions with killed workers still close cleanly
    pool.close().await.unwrap();
    assert!(a.is_closed());
}
