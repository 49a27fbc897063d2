//! Broadcast semantics: one eager fetch, N identical deliveries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use kanso_fetch::{fan_out, spawn_fetch};

#[tokio::test]
async fn three_consumers_observe_the_same_list() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let [mut a, mut b, mut c] = fan_out(async move {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["api-0".to_string(), "api-1".to_string()])
    });

    let la = a.list().await.expect("list delivered");
    let lb = b.list().await.expect("list delivered");
    let lc = c.list().await.expect("list delivered");
    assert!(Arc::ptr_eq(&la, &lb) && Arc::ptr_eq(&lb, &lc));
    assert_eq!(la.len(), 2);
    assert_eq!(la[0], "api-0");
    assert!(a.error().await.is_none());
    assert!(b.error().await.is_none());
    assert!(c.error().await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn an_error_replicates_to_every_consumer() {
    let [mut a, mut b, mut c] =
        fan_out::<3, Vec<String>, _>(async { Err(anyhow!("connection refused")) });
    assert!(a.list().await.is_none());
    assert!(b.list().await.is_none());
    assert!(c.list().await.is_none());
    for h in [&mut a, &mut b, &mut c] {
        let err = h.error().await.expect("error delivered");
        assert!(err.to_string().contains("connection refused"));
    }
}

#[tokio::test]
async fn fetch_starts_before_any_consumer_reads() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let [mut handle] = fan_out(async move {
        let _ = tx.send(());
        Ok(1u32)
    });
    // No read has happened yet; the spawned fetch must already be running.
    rx.await.expect("fetch task started on its own");
    assert_eq!(handle.list().await.as_deref(), Some(&1));
}

#[tokio::test]
async fn rereads_return_the_memoized_outcome() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let [mut h] = fan_out(async move {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(7u32)
    });
    let first = h.list().await.expect("list delivered");
    let second = h.list().await.expect("list delivered");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unread_and_dropped_handles_are_harmless() {
    let [mut keep, other] = fan_out(async { Ok(vec![1, 2, 3]) });
    drop(other);
    let list = keep.list().await.expect("list delivered");
    assert_eq!(list.len(), 3);
    // keep.error() is deliberately never read
}

#[tokio::test]
async fn single_consumer_shortcut() {
    let mut h = spawn_fetch(async { Ok("ready".to_string()) });
    assert_eq!(h.list().await.unwrap().as_str(), "ready");
    assert!(h.error().await.is_none());
}
