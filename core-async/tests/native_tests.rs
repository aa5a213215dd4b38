//! Integration tests for the core-async facade.

use core_async::{sync, task, time};
use std::sync::Arc;

#[tokio::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[tokio::test]
async fn test_task_spawn_blocking() {
    let handle = task::spawn_blocking(|| {
        std::thread::sleep(std::time::Duration::from_millis(10));
        100
    });
    assert_eq!(handle.await.unwrap(), 100);
}

#[tokio::test]
async fn test_join_set_collects_results() {
    let mut set = task::JoinSet::new();
    for i in 0..4u32 {
        set.spawn(async move { i * 2 });
    }

    let mut results = Vec::new();
    while let Some(res) = set.join_next().await {
        results.push(res.unwrap());
    }
    results.sort();
    assert_eq!(results, vec![0, 2, 4, 6]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_sleep_or_cancel_elapses() {
    let token = sync::CancellationToken::new();
    let start = time::Instant::now();

    assert!(time::sleep_or_cancel(time::Duration::from_secs(60), &token).await);
    assert!(start.elapsed() >= time::Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_sleep_or_cancel_interrupted() {
    let token = sync::CancellationToken::new();
    let child = token.clone();
    task::spawn(async move {
        time::sleep(time::Duration::from_secs(1)).await;
        child.cancel();
    });

    let start = time::Instant::now();
    assert!(!time::sleep_or_cancel(time::Duration::from_secs(60), &token).await);
    assert!(start.elapsed() < time::Duration::from_secs(60));
}

#[tokio::test]
async fn test_semaphore_limits_permits() {
    let semaphore = Arc::new(sync::Semaphore::new(2));
    let a = semaphore.clone().acquire_owned().await.unwrap();
    let _b = semaphore.clone().acquire_owned().await.unwrap();
    assert_eq!(semaphore.available_permits(), 0);
    assert!(semaphore.try_acquire().is_err());

    drop(a);
    assert_eq!(semaphore.available_permits(), 1);
}

#[tokio::test]
async fn test_rwlock_concurrent_reads() {
    let lock = Arc::new(sync::RwLock::new(vec![1, 2, 3]));
    let r1 = lock.read().await;
    let r2 = lock.read().await;
    assert_eq!(r1.len() + r2.len(), 6);
}
